//! Optical fallback detection.
//!
//! For surfaces without a usable accessibility tree (WebViews, games,
//! Flutter), text recognized in a screenshot becomes the element list. Each
//! recognized line is assumed tappable.

mod tesseract;

pub use tesseract::TesseractRecognizer;

use crate::config::Config;
use crate::element::{Element, ElementSource};
use crate::error::{AppError, Result};
use crate::geometry::Quad;
use image::DynamicImage;
use once_cell::sync::OnceCell;
use tracing::{debug, info};

/// Regions below this confidence are discarded.
pub const MIN_CONFIDENCE: f32 = 0.5;

/// Class tag carried by every optical element.
pub const OPTICAL_CLASS: &str = "optical_text";

/// One region reported by a text recognizer.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRegion {
    pub text: String,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub quad: Quad,
}

/// A text recognition backend.
pub trait TextRecognizer: Send + Sync {
    /// Recognizes text regions in detection order.
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<TextRegion>>;
}

type RecognizerFactory = dyn Fn() -> Result<Box<dyn TextRecognizer>> + Send + Sync;

/// Owns the expensive recognizer, built once on first use.
///
/// Construction is cheap and never fails; a missing backend is reported as
/// [`AppError::DetectionUnavailable`] by the first call that needs it. If that
/// first initialization fails, the next call tries again.
pub struct OpticalEngine {
    factory: Box<RecognizerFactory>,
    recognizer: OnceCell<Box<dyn TextRecognizer>>,
}

impl OpticalEngine {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn TextRecognizer>> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            recognizer: OnceCell::new(),
        }
    }

    /// Engine backed by the `tesseract` executable named in `config`.
    pub fn tesseract(config: &Config) -> Self {
        let path = config.tesseract_path.clone();
        let lang = config.ocr_lang.clone();
        let timeout = config.timeouts.ocr;
        Self::new(move || {
            let recognizer = TesseractRecognizer::probe(&path, &lang, timeout)?;
            Ok(Box::new(recognizer) as Box<dyn TextRecognizer>)
        })
    }

    /// Engine around an already constructed recognizer.
    pub fn with_recognizer(recognizer: Box<dyn TextRecognizer>) -> Self {
        let engine = Self::new(|| Err(AppError::unavailable("recognizer already installed")));
        // A fresh cell is always empty.
        let _ = engine.recognizer.set(recognizer);
        engine
    }

    pub fn is_initialized(&self) -> bool {
        self.recognizer.get().is_some()
    }

    /// Returns the recognizer, initializing it exactly once under concurrency.
    pub fn recognizer(&self) -> Result<&dyn TextRecognizer> {
        self.recognizer
            .get_or_try_init(|| {
                info!("initializing optical text recognizer");
                (self.factory)()
            })
            .map(|r| &**r)
    }

    /// Decodes `png` and converts the recognized text into elements.
    pub fn detect(&self, png: &[u8]) -> Result<Vec<Element>> {
        let recognizer = self.recognizer()?;
        let image = image::load_from_memory(png)
            .map_err(|e| AppError::image(format!("Failed to decode screenshot: {}", e)))?;
        let regions = recognizer.recognize(&image)?;
        let elements = elements_from_regions(regions);
        debug!(count = elements.len(), "optical detection finished");
        Ok(elements)
    }
}

/// Filters recognized regions and indexes the survivors in order.
pub fn elements_from_regions(regions: impl IntoIterator<Item = TextRegion>) -> Vec<Element> {
    let mut elements = Vec::new();
    for region in regions {
        if region.confidence < MIN_CONFIDENCE {
            continue;
        }
        let text = region.text.trim();
        if text.is_empty() {
            continue;
        }
        let bounds = region.quad.bounding_rect();
        if bounds.is_degenerate() {
            continue;
        }
        elements.push(Element {
            index: elements.len(),
            text: text.to_string(),
            content_desc: String::new(),
            resource_id: String::new(),
            class_tag: OPTICAL_CLASS.to_string(),
            bounds,
            clickable: true,
            enabled: true,
            focused: false,
            selected: false,
            source: ElementSource::Optical,
        });
    }
    elements
}
