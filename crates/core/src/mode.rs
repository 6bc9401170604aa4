//! Detection mode selection.
//!
//! The tree dump is fast and rich; optical detection is slow but sees
//! everything that is drawn. `Auto` tries the former and falls back to the
//! latter when the tree pass fails or comes back too sparse.

use crate::config::{Config, Timeouts};
use crate::device::DeviceChannel;
use crate::element::Element;
use crate::error::{AppError, Result};
use crate::hierarchy;
use crate::optical::OpticalEngine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// How elements are discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum DetectionMode {
    /// Accessibility hierarchy dump only.
    #[default]
    Tree,
    /// Text recognition on a screenshot only.
    Optical,
    /// Tree first, optical when the tree is unusable.
    Auto,
}

impl DetectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tree => "tree",
            Self::Optical => "optical",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMode {
    type Err = AppError;

    /// Accepts `xml` and `ocr` as aliases for `tree` and `optical`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tree" | "xml" => Ok(Self::Tree),
            "optical" | "ocr" => Ok(Self::Optical),
            "auto" => Ok(Self::Auto),
            _ => Err(AppError::UnknownMode(s.to_string())),
        }
    }
}

impl TryFrom<String> for DetectionMode {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Elements from one detection run and the pass that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub elements: Vec<Element>,
    /// `Tree` or `Optical`, never `Auto`.
    pub source: DetectionMode,
}

impl Detection {
    pub fn tree(elements: Vec<Element>) -> Self {
        Self {
            elements,
            source: DetectionMode::Tree,
        }
    }

    pub fn optical(elements: Vec<Element>) -> Self {
        Self {
            elements,
            source: DetectionMode::Optical,
        }
    }
}

/// Produces a fresh element list for a device.
pub trait Detector: Send + Sync {
    fn detect(&self, device: Option<&str>, mode: DetectionMode, clickable_only: bool) -> Result<Detection>;
}

/// The production [`Detector`]: hierarchy parser, optical engine, and the
/// policy arbitrating between them.
pub struct ElementDetector {
    channel: Arc<dyn DeviceChannel>,
    optical: Arc<OpticalEngine>,
    timeouts: Timeouts,
    min_tree_elements: usize,
}

impl ElementDetector {
    pub fn new(channel: Arc<dyn DeviceChannel>, optical: Arc<OpticalEngine>, config: &Config) -> Self {
        Self {
            channel,
            optical,
            timeouts: config.timeouts.clone(),
            min_tree_elements: config.min_tree_elements,
        }
    }

    pub fn detect_tree(&self, device: Option<&str>, clickable_only: bool) -> Result<Vec<Element>> {
        let dump = hierarchy::capture_dump(self.channel.as_ref(), device, &self.timeouts)?;
        Ok(hierarchy::parse_elements(&dump, clickable_only, true))
    }

    /// Runs optical detection on `screenshot`, capturing one when absent.
    pub fn detect_optical(&self, device: Option<&str>, screenshot: Option<&[u8]>) -> Result<Vec<Element>> {
        // Fail on a missing engine before paying for a capture.
        self.optical.recognizer()?;
        match screenshot {
            Some(png) => self.optical.detect(png),
            None => {
                let png = self
                    .channel
                    .capture_screenshot(device, self.timeouts.screenshot)?;
                self.optical.detect(&png)
            }
        }
    }
}

impl Detector for ElementDetector {
    fn detect(&self, device: Option<&str>, mode: DetectionMode, clickable_only: bool) -> Result<Detection> {
        match mode {
            DetectionMode::Tree => self.detect_tree(device, clickable_only).map(Detection::tree),
            DetectionMode::Optical => self.detect_optical(device, None).map(Detection::optical),
            DetectionMode::Auto => {
                match self.detect_tree(device, clickable_only) {
                    Ok(elements) if elements.len() >= self.min_tree_elements => {
                        debug!(count = elements.len(), "tree detection sufficient");
                        return Ok(Detection::tree(elements));
                    }
                    Ok(elements) => info!(
                        count = elements.len(),
                        threshold = self.min_tree_elements,
                        "tree detection too sparse, falling back to optical"
                    ),
                    Err(e) => info!(error = %e, "tree detection failed, falling back to optical"),
                }
                // Once the fallback fires its outcome stands, failures included.
                self.detect_optical(device, None).map(Detection::optical)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes_and_aliases() {
        assert_eq!("tree".parse::<DetectionMode>().unwrap(), DetectionMode::Tree);
        assert_eq!("XML".parse::<DetectionMode>().unwrap(), DetectionMode::Tree);
        assert_eq!("ocr".parse::<DetectionMode>().unwrap(), DetectionMode::Optical);
        assert_eq!(" Auto ".parse::<DetectionMode>().unwrap(), DetectionMode::Auto);
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = "vision".parse::<DetectionMode>().unwrap_err();
        assert!(matches!(err, AppError::UnknownMode(ref m) if m == "vision"));
    }

    #[test]
    fn serde_uses_lowercase_and_validates() {
        assert_eq!(serde_json::to_string(&DetectionMode::Optical).unwrap(), "\"optical\"");
        let mode: DetectionMode = serde_json::from_str("\"ocr\"").unwrap();
        assert_eq!(mode, DetectionMode::Optical);
        assert!(serde_json::from_str::<DetectionMode>("\"pixels\"").is_err());
    }
}
