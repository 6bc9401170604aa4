//! Accessibility hierarchy parsing.
//!
//! Turns a `uiautomator` dump into the indexed element list. Malformed markup
//! is an empty screen, not an error; degenerate bounds are skipped.

use crate::config::Timeouts;
use crate::device::DeviceChannel;
use crate::element::{Element, ElementSource};
use crate::error::Result;
use crate::geometry::parse_bounds;
use tracing::debug;

/// Parses a hierarchy dump into elements, indexed in document order.
///
/// With `clickable_only`, a node survives when it is clickable, or when
/// `include_all_with_text` is set and it carries text, a description or a
/// resource id. Without it, any node with an identifier or a click handler
/// survives.
pub fn parse_elements(dump: &str, clickable_only: bool, include_all_with_text: bool) -> Vec<Element> {
    let doc = match roxmltree::Document::parse(dump) {
        Ok(doc) => doc,
        Err(e) => {
            debug!(error = %e, "hierarchy dump did not parse, treating as empty");
            return Vec::new();
        }
    };

    let mut elements = Vec::new();
    for node in doc.descendants().filter(|n| n.has_tag_name("node")) {
        let attr = |name: &str| node.attribute(name).unwrap_or("").to_string();
        let flag = |name: &str, default: bool| {
            node.attribute(name).map_or(default, |v| v == "true")
        };

        let bounds = parse_bounds(node.attribute("bounds").unwrap_or(""));
        if bounds.is_degenerate() {
            continue;
        }

        let text = attr("text");
        let content_desc = attr("content-desc");
        let resource_id = attr("resource-id");
        let clickable = flag("clickable", false);
        let has_identifier =
            !(text.is_empty() && content_desc.is_empty() && resource_id.is_empty());

        let keep = if clickable_only {
            clickable || (include_all_with_text && has_identifier)
        } else {
            has_identifier || clickable
        };
        if !keep {
            continue;
        }

        elements.push(Element {
            index: elements.len(),
            text,
            content_desc,
            resource_id,
            class_tag: attr("class"),
            bounds,
            clickable,
            enabled: flag("enabled", true),
            focused: flag("focused", false),
            selected: flag("selected", false),
            source: ElementSource::Tree,
        });
    }
    elements
}

/// Dumps the current hierarchy through the device channel.
pub fn capture_dump(
    channel: &dyn DeviceChannel,
    device: Option<&str>,
    timeouts: &Timeouts,
) -> Result<String> {
    channel.dump_tree(device, timeouts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, Rect};

    fn dump(nodes: &str) -> String {
        format!(
            "<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>\
             <hierarchy rotation=\"0\">{nodes}</hierarchy>"
        )
    }

    const MIXED: &str = r#"
        <node index="0" text="" resource-id="" class="android.widget.FrameLayout" content-desc="" clickable="false" bounds="[0,0][1080,2400]">
          <node index="0" text="Title" resource-id="" class="android.widget.TextView" content-desc="" clickable="false" bounds="[40,100][600,160]" />
          <node index="1" text="" resource-id="" class="android.widget.ImageButton" content-desc="" clickable="true" bounds="[900,100][1040,200]" />
          <node index="2" text="" resource-id="com.app:id/search" class="android.widget.EditText" content-desc="" clickable="false" bounds="[40,220][1040,300]" />
          <node index="3" text="Hidden" resource-id="" class="android.widget.TextView" content-desc="" clickable="true" bounds="[0,0][0,0]" />
          <node index="4" text="" resource-id="" class="android.view.View" content-desc="Menu" clickable="false" focused="true" bounds="[0,2300][200,2400]" />
        </node>"#;

    #[test]
    fn default_mode_keeps_identified_or_clickable() {
        let elements = parse_elements(&dump(MIXED), false, true);
        let labels: Vec<_> = elements.iter().map(|e| e.label().to_string()).collect();
        assert_eq!(
            labels,
            ["Title", "android.widget.ImageButton", "com.app:id/search", "Menu"]
        );
        assert!(elements[3].focused);
        assert!(elements.iter().all(|e| e.enabled));
    }

    #[test]
    fn clickable_only_without_text_keeps_only_clickable() {
        let elements = parse_elements(&dump(MIXED), true, false);
        assert_eq!(elements.len(), 1);
        assert!(elements.iter().all(|e| e.clickable));
        assert_eq!(elements[0].index, 0);
    }

    #[test]
    fn clickable_only_with_text_also_keeps_identified() {
        let elements = parse_elements(&dump(MIXED), true, true);
        assert_eq!(elements.len(), 4);
    }

    #[test]
    fn indices_are_dense_after_filtering() {
        let elements = parse_elements(&dump(MIXED), false, true);
        let indices: Vec<_> = elements.iter().map(|e| e.index).collect();
        assert_eq!(indices, (0..elements.len()).collect::<Vec<_>>());
        assert!(elements.iter().all(|e| !e.bounds.is_degenerate()));
    }

    #[test]
    fn text_only_node_kept_and_blank_node_dropped() {
        let xml = dump(
            r#"<node text="OK" clickable="false" bounds="[0,0][10,10]" />
               <node text="" clickable="false" bounds="[0,0][10,10]" />"#,
        );
        let elements = parse_elements(&xml, false, true);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].text, "OK");
    }

    #[test]
    fn missing_or_malformed_bounds_are_dropped() {
        let xml = dump(
            r#"<node text="a" clickable="true" />
               <node text="b" clickable="true" bounds="garbage" />
               <node text="c" clickable="true" bounds="[5,5][15,25]" />"#,
        );
        let elements = parse_elements(&xml, false, true);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].text, "c");
        assert_eq!(elements[0].bounds, Rect::new(5, 5, 15, 25));
    }

    #[test]
    fn malformed_markup_is_empty() {
        assert!(parse_elements("<hierarchy><node", false, true).is_empty());
        assert!(parse_elements("", false, true).is_empty());
        assert!(parse_elements("ERROR: null root node returned by UiTestAutomationBridge.", false, true).is_empty());
    }

    #[test]
    fn submit_button_center() {
        let xml = dump(r#"<node text="Submit" clickable="true" bounds="[10,20][110,70]" />"#);
        let elements = parse_elements(&xml, true, true);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].center(), Point::new(60, 45));
        assert_eq!(elements[0].source, ElementSource::Tree);
    }

    #[test]
    fn bounds_at_the_integer_limit_still_have_a_center() {
        let xml = dump(r#"<node text="Big" clickable="true" bounds="[1,1][2147483647,2147483647]" />"#);
        let elements = parse_elements(&xml, false, true);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].center(), Point::new(1_073_741_824, 1_073_741_824));
    }
}
