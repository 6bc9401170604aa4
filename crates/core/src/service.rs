//! Caller-facing operations.
//!
//! [`ElementService`] ties the detector, cache, matcher and overlay renderer
//! to a device channel. Each operation has a typed form used by the CLI and a
//! JSON form used by the request loop; the JSON form always answers with an
//! envelope carrying `"status": "success"` or `"status": "error"`, so one bad
//! request never takes the loop down.

use crate::cache::{Clock, DetectionSnapshot, ElementCache, SystemClock};
use crate::config::{Config, Timeouts};
use crate::device::DeviceChannel;
use crate::element::{Element, format_elements};
use crate::error::{AppError, Result};
use crate::image_processing::ImageProcessor;
use crate::matcher::{self, TargetOutcome, TargetQuery};
use crate::mode::{DetectionMode, ElementDetector};
use crate::optical::OpticalEngine;
use crate::overlay;
use crate::settings::Settings;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Arguments of `get_ui_elements`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GetUiElementsArgs {
    pub device_id: Option<String>,
    pub clickable_only: bool,
    pub mode: Option<DetectionMode>,
    /// Reuse a fresh cached snapshot instead of detecting again.
    pub use_cache: bool,
}

/// Arguments of `tap_element`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TapElementArgs {
    pub index: Option<usize>,
    pub text: Option<String>,
    pub resource_id: Option<String>,
    /// Whole-text match instead of substring.
    pub exact: bool,
    /// Whole resource id instead of substring.
    pub exact_id: bool,
    pub device_id: Option<String>,
    pub mode: Option<DetectionMode>,
    pub refresh: bool,
}

/// Arguments of `get_screenshot`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GetScreenshotArgs {
    pub device_id: Option<String>,
    pub annotated: Option<bool>,
}

/// Arguments of `tap`.
#[derive(Debug, Clone, Deserialize)]
pub struct TapArgs {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// Arguments of `invalidate_cache`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InvalidateArgs {
    pub device_id: Option<String>,
    /// Drop every device's snapshot.
    pub all: bool,
}

/// One line of the request protocol.
#[derive(Debug, Deserialize)]
pub struct ServiceRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

/// Outcome of a `tap_element` call.
#[derive(Debug, Clone, PartialEq)]
pub struct TapReport {
    pub outcome: TargetOutcome,
    pub search_method: String,
    pub mode: DetectionMode,
}

/// Discovery, targeting and screenshots for one or more devices.
pub struct ElementService {
    channel: Arc<dyn DeviceChannel>,
    cache: ElementCache,
    timeouts: Timeouts,
    default_device: Option<String>,
    settings: Settings,
}

impl ElementService {
    pub fn new(
        channel: Arc<dyn DeviceChannel>,
        optical: Arc<OpticalEngine>,
        config: &Config,
        settings: Settings,
    ) -> Self {
        Self::with_clock(channel, optical, config, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        channel: Arc<dyn DeviceChannel>,
        optical: Arc<OpticalEngine>,
        config: &Config,
        settings: Settings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let detector = Arc::new(ElementDetector::new(channel.clone(), optical, config));
        Self {
            channel,
            cache: ElementCache::with_clock(detector, clock),
            timeouts: config.timeouts.clone(),
            default_device: config.default_device.clone(),
            settings,
        }
    }

    pub fn cache(&self) -> &ElementCache {
        &self.cache
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn device<'a>(&'a self, requested: Option<&'a str>) -> Option<&'a str> {
        requested.or(self.default_device.as_deref())
    }

    /// Detects (or reuses, unless `force_refresh`) the element list.
    pub fn discover(
        &self,
        device: Option<&str>,
        mode: Option<DetectionMode>,
        clickable_only: bool,
        force_refresh: bool,
    ) -> Result<Arc<DetectionSnapshot>> {
        let mode = mode.unwrap_or(self.settings.default_mode);
        self.cache
            .get(self.device(device), mode, clickable_only, force_refresh)
    }

    /// Resolves `query`, taps the match and invalidates the device's cache.
    ///
    /// Without an explicit mode, the mode and filter of the device's current
    /// snapshot are reused so indices stay the ones the caller listed.
    pub fn tap_element(
        &self,
        device: Option<&str>,
        query: &TargetQuery,
        mode: Option<DetectionMode>,
        refresh: bool,
    ) -> Result<TapReport> {
        let device = self.device(device);
        let current = self.cache.peek(device);
        let mode = mode
            .or(current.as_ref().map(|s| s.mode))
            .unwrap_or(self.settings.default_mode);
        let clickable_only = current
            .as_ref()
            .is_some_and(|s| s.mode == mode && s.clickable_only);

        let outcome = matcher::resolve(&self.cache, device, mode, clickable_only, query, refresh)?;
        if let TargetOutcome::Found { element, x, y } = &outcome {
            info!(index = element.index, x, y, label = element.label(), "tapping element");
            self.channel.send_tap(device, *x, *y)?;
            self.cache.invalidate(device);
        }
        Ok(TapReport {
            outcome,
            search_method: query.describe(),
            mode,
        })
    }

    /// Captures a screenshot as JPEG, annotated with element indices if asked.
    pub fn screenshot(&self, device: Option<&str>, annotated: bool) -> Result<Vec<u8>> {
        let device = self.device(device);
        let png = self
            .channel
            .capture_screenshot(device, self.timeouts.screenshot)?;
        if !annotated {
            return ImageProcessor::compress_screenshot(&png);
        }

        // A fresh snapshot keeps the indices the caller already saw.
        let snapshot = match self.cache.peek(device) {
            Some(snapshot) => snapshot,
            None => self
                .cache
                .get(device, self.settings.default_mode, false, false)?,
        };
        overlay::render_annotated(&png, &snapshot.elements)
    }

    /// Taps raw coordinates. The screen is assumed to change.
    pub fn tap(&self, device: Option<&str>, x: i32, y: i32) -> Result<()> {
        let device = self.device(device);
        self.channel.send_tap(device, x, y)?;
        self.cache.invalidate(device);
        Ok(())
    }

    // ------------------------------------------------------------------
    // JSON tool surface
    // ------------------------------------------------------------------

    /// Handles one raw request line and returns the response envelope.
    pub fn handle_line(&self, line: &str) -> Value {
        match serde_json::from_str::<ServiceRequest>(line) {
            Ok(request) => self.handle(request),
            Err(e) => error_envelope(None, &AppError::from(e)),
        }
    }

    /// Dispatches a parsed request.
    pub fn handle(&self, request: ServiceRequest) -> Value {
        let ServiceRequest { id, tool, args } = request;
        let args = if args.is_null() { json!({}) } else { args };

        let result = match tool.as_str() {
            "get_ui_elements" => parse(args).and_then(|a| self.get_ui_elements_json(a)),
            "tap_element" => parse(args).and_then(|a| self.tap_element_json(a)),
            "get_screenshot" => parse(args).and_then(|a| self.get_screenshot_json(a)),
            "tap" => parse(args).and_then(|a| self.tap_json(a)),
            "invalidate_cache" => parse(args).map(|a: InvalidateArgs| {
                if a.all {
                    self.cache.invalidate_all();
                } else {
                    self.cache.invalidate(self.device(a.device_id.as_deref()));
                }
                json!({ "status": "success", "action": "invalidate_cache" })
            }),
            other => Err(AppError::UnknownTool(other.to_string())),
        };

        match result {
            Ok(mut value) => {
                attach_id(&mut value, id);
                value
            }
            Err(e) => {
                if e.is_channel_failure() {
                    warn!(tool = %tool, error = %e, "device channel failed");
                } else {
                    debug!(tool = %tool, error = %e, "request rejected");
                }
                error_envelope(id, &e)
            }
        }
    }

    pub fn get_ui_elements_json(&self, args: GetUiElementsArgs) -> Result<Value> {
        let snapshot = self.discover(
            args.device_id.as_deref(),
            args.mode,
            args.clickable_only,
            !args.use_cache,
        )?;
        Ok(discovery_response(&snapshot, self.settings.max_listed_elements))
    }

    pub fn tap_element_json(&self, args: TapElementArgs) -> Result<Value> {
        let query = TargetQuery::from_keys(
            args.index,
            args.text,
            args.resource_id,
            args.exact,
            !args.exact_id,
        )?;
        let report = self.tap_element(args.device_id.as_deref(), &query, args.mode, args.refresh)?;
        Ok(tap_response(&report))
    }

    pub fn get_screenshot_json(&self, args: GetScreenshotArgs) -> Result<Value> {
        let annotated = args.annotated.unwrap_or(self.settings.annotate_by_default);
        let jpeg = self.screenshot(args.device_id.as_deref(), annotated)?;
        Ok(json!({
            "status": "success",
            "format": "jpeg",
            "annotated": annotated,
            "data": ImageProcessor::to_base64(&jpeg),
        }))
    }

    pub fn tap_json(&self, args: TapArgs) -> Result<Value> {
        self.tap(args.device_id.as_deref(), args.x, args.y)?;
        Ok(json!({ "status": "success", "action": "tap", "x": args.x, "y": args.y }))
    }
}

fn parse<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    Ok(serde_json::from_value(args)?)
}

/// Discovery payload: element views plus the formatted listing.
pub fn discovery_response(snapshot: &DetectionSnapshot, max_listed: usize) -> Value {
    let elements: Vec<_> = snapshot.elements.iter().map(Element::view).collect();
    json!({
        "status": "success",
        "mode": snapshot.mode,
        "source": snapshot.source,
        "elements": elements,
        "count": snapshot.elements.len(),
        "formatted": format_elements(&snapshot.elements, max_listed),
        "hint": "Use tap_element(index=N) or tap_element(text='...') to click an element",
    })
}

/// Targeting payload; a miss is an error envelope carrying the element count.
pub fn tap_response(report: &TapReport) -> Value {
    match &report.outcome {
        TargetOutcome::Found { element, x, y } => json!({
            "status": "success",
            "action": "tap_element",
            "element": {
                "index": element.index,
                "text": element.text,
                "content_desc": element.content_desc,
                "resource_id": element.resource_id,
            },
            "coordinates": { "x": x, "y": y },
            "search_method": report.search_method,
            "mode": report.mode,
        }),
        TargetOutcome::NotFound { available } => json!({
            "status": "error",
            "error": format!(
                "Element not found with {}. Try get_ui_elements first.",
                report.search_method
            ),
            "available_count": available,
        }),
    }
}

fn error_envelope(id: Option<Value>, error: &AppError) -> Value {
    let mut value = json!({ "status": "error", "error": error.to_string() });
    attach_id(&mut value, id);
    value
}

fn attach_id(value: &mut Value, id: Option<Value>) {
    if let (Some(id), Value::Object(map)) = (id, value) {
        let mut with_id = Map::new();
        with_id.insert("id".to_string(), id);
        with_id.append(map);
        *map = with_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::tests::element;
    use std::time::Instant;

    #[test]
    fn discovery_response_shape() {
        let mut e = element(0, "Submit");
        e.resource_id = "com.app:id/submit".into();
        e.class_tag = "android.widget.Button".into();
        let snapshot = DetectionSnapshot {
            elements: vec![e],
            captured_at: Instant::now(),
            mode: DetectionMode::Auto,
            source: DetectionMode::Tree,
            clickable_only: false,
        };
        let value = discovery_response(&snapshot, 50);
        assert_eq!(value["status"], "success");
        assert_eq!(value["mode"], "auto");
        assert_eq!(value["source"], "tree");
        assert_eq!(value["count"], 1);
        assert_eq!(value["elements"][0]["resource_id"], "submit");
        assert_eq!(value["elements"][0]["class"], "Button");
        assert_eq!(value["elements"][0]["center"], json!({ "x": 100, "y": 40 }));
        assert_eq!(value["elements"][0]["bounds"], json!([0, 0, 200, 80]));
    }

    #[test]
    fn not_found_carries_count() {
        let report = TapReport {
            outcome: TargetOutcome::NotFound { available: 4 },
            search_method: "text='Pay'".into(),
            mode: DetectionMode::Tree,
        };
        let value = tap_response(&report);
        assert_eq!(value["status"], "error");
        assert_eq!(value["available_count"], 4);
        assert!(value["error"].as_str().unwrap().contains("text='Pay'"));
    }

    #[test]
    fn id_is_echoed_first() {
        let mut value = json!({ "status": "success" });
        attach_id(&mut value, Some(json!(7)));
        assert_eq!(value.to_string(), r#"{"id":7,"status":"success"}"#);
    }
}
