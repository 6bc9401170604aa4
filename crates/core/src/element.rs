//! The addressable unit of a screen and its caller-facing renderings.

use crate::geometry::{Point, Rect};
use serde::Serialize;

/// Default cap on elements listed in [`format_elements`].
pub const DEFAULT_MAX_LISTED: usize = 50;

/// Which pipeline produced an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementSource {
    Tree,
    Optical,
}

/// One interactive or identifiable element on screen.
///
/// Elements are only built by the detectors, which drop degenerate bounds, so
/// `bounds` always has positive width and height.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub index: usize,
    pub text: String,
    pub content_desc: String,
    pub resource_id: String,
    pub class_tag: String,
    pub bounds: Rect,
    pub clickable: bool,
    pub enabled: bool,
    pub focused: bool,
    pub selected: bool,
    pub source: ElementSource,
}

impl Element {
    pub fn center(&self) -> Point {
        self.bounds.center()
    }

    /// Best human label: text, then description, id, class.
    pub fn label(&self) -> &str {
        [
            &self.text,
            &self.content_desc,
            &self.resource_id,
            &self.class_tag,
        ]
        .into_iter()
        .find(|s| !s.is_empty())
        .map(String::as_str)
        .unwrap_or("")
    }

    /// `com.app:id/submit` -> `submit`.
    pub fn short_resource_id(&self) -> &str {
        last_segment(&self.resource_id, '/')
    }

    /// `android.widget.Button` -> `Button`.
    pub fn short_class(&self) -> &str {
        last_segment(&self.class_tag, '.')
    }

    pub fn view(&self) -> ElementView<'_> {
        ElementView {
            index: self.index,
            text: &self.text,
            content_desc: &self.content_desc,
            resource_id: self.short_resource_id(),
            class: self.short_class(),
            bounds: self.bounds,
            center: self.center(),
            clickable: self.clickable,
            source: self.source,
        }
    }
}

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = self.center();
        write!(f, "[{}] {} @ ({}, {})", self.index, self.label(), c.x, c.y)
    }
}

fn last_segment(s: &str, sep: char) -> &str {
    s.rsplit(sep).next().unwrap_or(s)
}

/// Serialized shape of an element in discovery responses.
#[derive(Debug, Serialize)]
pub struct ElementView<'a> {
    pub index: usize,
    pub text: &'a str,
    pub content_desc: &'a str,
    pub resource_id: &'a str,
    pub class: &'a str,
    pub bounds: Rect,
    pub center: Point,
    pub clickable: bool,
    pub source: ElementSource,
}

/// Renders a compact listing for agents, capped at `max_elements` lines.
pub fn format_elements(elements: &[Element], max_elements: usize) -> String {
    if elements.is_empty() {
        return "No interactive elements found on screen.".to_string();
    }

    let rule = "=".repeat(50);
    let mut lines = vec!["Interactive elements on screen:".to_string(), rule.clone()];

    for element in elements.iter().take(max_elements) {
        let mut parts = Vec::new();
        if !element.text.is_empty() {
            parts.push(format!("text=\"{}\"", element.text));
        }
        if !element.content_desc.is_empty() {
            parts.push(format!("desc=\"{}\"", element.content_desc));
        }
        if !element.resource_id.is_empty() {
            parts.push(format!("id=\"{}\"", element.short_resource_id()));
        }
        if !element.class_tag.is_empty() {
            parts.push(format!("({})", element.short_class()));
        }
        if element.clickable {
            parts.push("[clickable]".to_string());
        }
        lines.push(format!("[{}] {}", element.index, parts.join(" ")));
    }

    if elements.len() > max_elements {
        lines.push(format!(
            "... and {} more elements",
            elements.len() - max_elements
        ));
    }

    lines.push(rule);
    lines.push("Use tap_element with index=N or text='...' to interact.".to_string());
    lines.join("\n")
}
