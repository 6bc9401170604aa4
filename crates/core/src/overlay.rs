//! Annotated screenshots.
//!
//! Every element gets a red outline and a red tile with its index in white,
//! sitting just above its top-left corner, so an agent can read "tap 7" off
//! the picture. Glyphs come from the 8x8 bitmap font scaled to the image.

use crate::element::Element;
use crate::error::Result;
use crate::geometry::Rect;
use crate::image_processing::{ANNOTATED_QUALITY, ImageProcessor};
use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{Rgb, RgbImage};

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const LABEL_TEXT: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: u32 = 2;
const MIN_FONT_PX: u32 = 16;
const GLYPH_PX: u32 = 8;

/// Draws index annotations for `elements` onto the screenshot and returns JPEG.
pub fn render_annotated(screenshot: &[u8], elements: &[Element]) -> Result<Vec<u8>> {
    let image = ImageProcessor::decode(screenshot)?;
    let mut canvas = ImageProcessor::flatten(&image);
    annotate(&mut canvas, elements);
    ImageProcessor::encode_jpeg(&canvas, ANNOTATED_QUALITY)
}

/// Font height in pixels: proportional to the short side, never below 16.
pub fn font_size(width: u32, height: u32) -> u32 {
    (width.min(height) / 50).max(MIN_FONT_PX)
}

/// Draws boxes and labels in place.
pub fn annotate(canvas: &mut RgbImage, elements: &[Element]) {
    if canvas.width() == 0 || canvas.height() == 0 {
        return;
    }
    let scale = (font_size(canvas.width(), canvas.height()) / GLYPH_PX).max(1);

    for element in elements {
        draw_rect_outline(canvas, element.bounds, BOX_COLOR, BOX_THICKNESS);

        let label = element.index.to_string();
        let tile = label_tile(element.bounds, &label, scale, canvas.width(), canvas.height());
        fill_rect(canvas, tile, BOX_COLOR);
        draw_bitmap_text(canvas, tile.left + 3, tile.top + 2, &label, LABEL_TEXT, scale);
    }
}

/// Where the label tile for `bounds` goes: above-left of the box, clamped so
/// it stays inside a `width` x `height` image.
pub fn label_tile(bounds: Rect, label: &str, scale: u32, width: u32, height: u32) -> Rect {
    let glyph = (GLYPH_PX * scale) as i32;
    let tile_w = glyph * label.chars().count() as i32 + 6;
    let tile_h = glyph + 4;
    let (img_w, img_h) = (width as i32, height as i32);

    let x = bounds.left.saturating_sub(1).min(img_w - tile_w).max(0);
    let y = bounds
        .top
        .saturating_sub(tile_h)
        .saturating_sub(1)
        .min(img_h - tile_h)
        .max(0);
    Rect::new(x, y, x + tile_w, y + tile_h)
}

fn draw_rect_outline(img: &mut RgbImage, rect: Rect, color: Rgb<u8>, thickness: u32) {
    let t = thickness.max(1) as i32;
    let Rect {
        left,
        top,
        right,
        bottom,
    } = rect;
    fill_rect(img, Rect::new(left, top, right, top.saturating_add(t)), color);
    fill_rect(img, Rect::new(left, bottom.saturating_sub(t), right, bottom), color);
    fill_rect(img, Rect::new(left, top, left.saturating_add(t), bottom), color);
    fill_rect(img, Rect::new(right.saturating_sub(t), top, right, bottom), color);
}

/// Fills `rect` (exclusive right/bottom), clipped to the image.
fn fill_rect(img: &mut RgbImage, rect: Rect, color: Rgb<u8>) {
    let x0 = rect.left.max(0);
    let y0 = rect.top.max(0);
    let x1 = rect.right.min(img.width() as i32);
    let y1 = rect.bottom.min(img.height() as i32);
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn draw_bitmap_text(img: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>, scale: u32) {
    let s = scale.max(1) as i32;
    let mut cursor_x = x;
    for ch in text.chars() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            cursor_x += GLYPH_PX as i32 * s;
            continue;
        };
        for (row_idx, row) in glyph.iter().enumerate() {
            for col in 0..GLYPH_PX as i32 {
                if (*row >> col) & 1 == 0 {
                    continue;
                }
                let px = cursor_x + col * s;
                let py = y + row_idx as i32 * s;
                fill_rect(img, Rect::new(px, py, px + s, py + s), color);
            }
        }
        cursor_x += GLYPH_PX as i32 * s;
    }
}
