//! UI Target Core Library
//!
//! Discovers interactive elements on an Android device screen, caches the
//! result per device, and resolves "tap the OK button" style queries into
//! screen coordinates.
//!
//! # Overview
//!
//! Elements come from one of two detection passes:
//!
//! - **Tree**: the accessibility hierarchy dumped by `uiautomator`, parsed in
//!   [`hierarchy`]
//! - **Optical**: text recognized in a screenshot, via [`optical`]
//!
//! [`mode::DetectionMode::Auto`] tries the tree first and falls back to
//! optical recognition when the tree comes back empty.
//!
//! # Quick Start
//!
//! ```ignore
//! use ui_target_core::{UiTarget, TargetQuery};
//!
//! let target = UiTarget::new()?;
//! let snapshot = target.service().discover(None, None, false, true)?;
//! println!("{}", ui_target_core::element::format_elements(&snapshot.elements, 50));
//!
//! let query = TargetQuery::from_keys(None, Some("OK".into()), None, false, true)?;
//! target.service().tap_element(None, &query, None, false)?;
//! ```
//!
//! # Module Structure
//!
//! - [`geometry`], [`element`]: rectangles, points and the element record
//! - [`hierarchy`], [`optical`], [`mode`]: detection passes and mode policy
//! - [`cache`], [`matcher`]: snapshot reuse and query resolution
//! - [`device`]: the `adb` channel and subprocess timeouts
//! - [`overlay`], [`image_processing`]: annotated and compressed screenshots
//! - [`service`]: typed and JSON operations for callers
//! - [`config`], [`settings`], [`error`]: environment, persisted preferences, errors

pub mod cache;
pub mod config;
pub mod device;
pub mod element;
pub mod error;
pub mod geometry;
pub mod hierarchy;
pub mod image_processing;
pub mod matcher;
pub mod mode;
pub mod optical;
pub mod overlay;
pub mod service;
pub mod settings;

pub use cache::{DetectionSnapshot, ElementCache};
pub use config::Config;
pub use device::{AdbChannel, DeviceChannel};
pub use element::Element;
pub use error::{AppError, Result};
pub use matcher::{TargetOutcome, TargetQuery};
pub use mode::DetectionMode;
pub use service::ElementService;
pub use settings::Settings;

use optical::OpticalEngine;
use std::sync::Arc;

/// Main entry point: an [`ElementService`] wired to `adb` and Tesseract.
pub struct UiTarget {
    config: Config,
    service: ElementService,
}

impl UiTarget {
    /// Builds from environment configuration and saved settings.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable holds an invalid value.
    pub fn new() -> Result<Self> {
        Ok(Self::with_config(Config::load()?, Settings::load()))
    }

    /// Builds from explicit configuration. Nothing touches the device or the
    /// OCR engine until the first request.
    pub fn with_config(config: Config, settings: Settings) -> Self {
        let channel: Arc<dyn DeviceChannel> = Arc::new(AdbChannel::from_config(&config));
        let optical = Arc::new(OpticalEngine::tesseract(&config));
        let service = ElementService::new(channel, optical, &config, settings);
        Self { config, service }
    }

    pub fn service(&self) -> &ElementService {
        &self.service
    }

    /// Moves the service out, e.g. to share it across request tasks.
    pub fn into_service(self) -> ElementService {
        self.service
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
