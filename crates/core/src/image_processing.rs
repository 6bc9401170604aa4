//! Image decoding and encoding utilities.
//!
//! Device screenshots arrive as PNG, often with an alpha channel. Agents get
//! JPEG: smaller, and every consumer can display it. Transparent pixels are
//! composited onto white before encoding since JPEG has no alpha.

use crate::error::{AppError, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};

/// JPEG quality for plain screenshots.
pub const SCREENSHOT_QUALITY: u8 = 60;

/// JPEG quality for annotated screenshots; labels need to stay legible.
pub const ANNOTATED_QUALITY: u8 = 70;

/// Image processing utilities for screenshot responses.
pub struct ImageProcessor;

impl ImageProcessor {
    /// Decodes PNG (or any supported format) bytes.
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes)
            .map_err(|e| AppError::image(format!("Failed to decode screenshot: {}", e)))
    }

    /// Converts to RGB, compositing any alpha onto a white background.
    pub fn flatten(image: &DynamicImage) -> RgbImage {
        if !image.color().has_alpha() {
            return image.to_rgb8();
        }
        let rgba = image.to_rgba8();
        let mut out = RgbImage::new(rgba.width(), rgba.height());
        for (x, y, px) in rgba.enumerate_pixels() {
            let [r, g, b, a] = px.0;
            let alpha = u16::from(a);
            let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
            out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
        }
        out
    }

    /// Encodes an RGB image as JPEG with the given quality (1-100).
    pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
            .encode_image(image)
            .map_err(|e| AppError::image(format!("Failed to encode image: {}", e)))?;
        Ok(buffer)
    }

    /// Decodes a screenshot and re-encodes it as a compact JPEG.
    pub fn compress_screenshot(png: &[u8]) -> Result<Vec<u8>> {
        let image = Self::decode(png)?;
        Self::encode_jpeg(&Self::flatten(&image), SCREENSHOT_QUALITY)
    }

    pub fn to_base64(bytes: &[u8]) -> String {
        BASE64.encode(bytes)
    }
}
