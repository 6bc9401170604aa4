use super::{TextRecognizer, TextRegion};
use crate::device::run_with_timeout;
use crate::error::{AppError, Result};
use crate::geometry::{Quad, Rect};
use image::{DynamicImage, ImageFormat};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Recognizer driving the `tesseract` executable in TSV mode.
///
/// Tesseract reports words; they are grouped back into text lines so that a
/// label like "Sign in" is one element rather than two.
#[derive(Debug)]
pub struct TesseractRecognizer {
    path: String,
    lang: String,
    timeout: Duration,
}

impl TesseractRecognizer {
    /// Checks that the executable runs and returns a recognizer for it.
    pub fn probe(path: &str, lang: &str, timeout: Duration) -> Result<Self> {
        let mut cmd = Command::new(path);
        cmd.arg("--version");
        let output = run_with_timeout(cmd, None, PROBE_TIMEOUT).map_err(|e| {
            AppError::unavailable(format!(
                "could not run `{path}` ({e}); install tesseract-ocr or set UI_TARGET_TESSERACT_PATH"
            ))
        })?;
        if !output.status.success() {
            return Err(AppError::unavailable(format!(
                "`{path} --version` exited with {}",
                output.status
            )));
        }
        let banner = String::from_utf8_lossy(&output.stdout);
        info!(version = banner.lines().next().unwrap_or("unknown"), "tesseract available");
        Ok(Self {
            path: path.to_string(),
            lang: lang.to_string(),
            timeout,
        })
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<TextRegion>> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| AppError::image(format!("Failed to encode image for OCR: {}", e)))?;

        let mut cmd = Command::new(&self.path);
        cmd.args(["stdin", "stdout", "-l", &self.lang, "tsv"]);
        let output = run_with_timeout(cmd, Some(png), self.timeout)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::capture(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let regions = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        debug!(lines = regions.len(), "tesseract recognized text lines");
        Ok(regions)
    }
}

#[derive(Default)]
struct Line {
    words: Vec<String>,
    confidence_sum: f32,
    rect: Option<Rect>,
}

/// Groups word rows of tesseract TSV output into line regions.
fn parse_tsv(tsv: &str) -> Vec<TextRegion> {
    // Keyed by (page, block, paragraph, line) so output follows reading order.
    let mut lines: BTreeMap<[u32; 4], Line> = BTreeMap::new();

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let Some(key) = parse_key(&cols[1..5]) else {
            continue;
        };
        let (Ok(left), Ok(top), Ok(width), Ok(height), Ok(conf)) = (
            cols[6].parse::<i32>(),
            cols[7].parse::<i32>(),
            cols[8].parse::<i32>(),
            cols[9].parse::<i32>(),
            cols[10].parse::<f32>(),
        ) else {
            continue;
        };
        let word = cols[11].trim();
        if conf < 0.0 || word.is_empty() {
            continue;
        }

        let word_rect = Rect::new(left, top, left + width, top + height);
        let line = lines.entry(key).or_default();
        line.words.push(word.to_string());
        line.confidence_sum += conf;
        line.rect = Some(match line.rect {
            Some(r) => Rect::new(
                r.left.min(word_rect.left),
                r.top.min(word_rect.top),
                r.right.max(word_rect.right),
                r.bottom.max(word_rect.bottom),
            ),
            None => word_rect,
        });
    }

    lines
        .into_values()
        .filter_map(|line| {
            let rect = line.rect?;
            Some(TextRegion {
                confidence: line.confidence_sum / line.words.len() as f32 / 100.0,
                text: line.words.join(" "),
                quad: Quad::from_rect(rect),
            })
        })
        .collect()
}

fn parse_key(cols: &[&str]) -> Option<[u32; 4]> {
    let mut key = [0u32; 4];
    for (slot, raw) in key.iter_mut().zip(cols) {
        *slot = raw.parse().ok()?;
    }
    Some(key)
}
