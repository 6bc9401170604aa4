//! Device-pixel geometry.
//!
//! Rectangles are axis-aligned and half-open in spirit: an element occupies
//! `left..right` horizontally and `top..bottom` vertically. Anything with zero
//! or negative extent is degenerate and never becomes an element.

use serde::Serialize;

/// A point in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle `(left, top, right, bottom)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// The rectangle substituted for anything that fails to parse.
    pub const ZERO: Rect = Rect::new(0, 0, 0, 0);

    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// True when the rectangle has no positive area.
    pub fn is_degenerate(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    pub fn width(&self) -> i32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Center point using integer division, matching the tap target.
    pub fn center(&self) -> Point {
        Point::new(midpoint(self.left, self.right), midpoint(self.top, self.bottom))
    }

    pub fn as_tuple(&self) -> (i32, i32, i32, i32) {
        (self.left, self.top, self.right, self.bottom)
    }
}

/// Summed in `i64`; the halved result always fits back into `i32`.
fn midpoint(a: i32, b: i32) -> i32 {
    ((i64::from(a) + i64::from(b)) / 2) as i32
}

// Serialized as a 4-element array, the shape agents already consume.
impl Serialize for Rect {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_tuple().serialize(serializer)
    }
}

/// Parses the hierarchy dump bounds literal `[L,T][R,B]`.
///
/// Any deviation from that exact shape yields [`Rect::ZERO`], which the
/// degenerate-rectangle rule then drops.
pub fn parse_bounds(raw: &str) -> Rect {
    try_parse_bounds(raw).unwrap_or(Rect::ZERO)
}

fn try_parse_bounds(raw: &str) -> Option<Rect> {
    let inner = raw.strip_prefix('[')?.strip_suffix(']')?;
    let (first, second) = inner.split_once("][")?;
    let (left, top) = parse_pair(first)?;
    let (right, bottom) = parse_pair(second)?;
    Some(Rect::new(left, top, right, bottom))
}

fn parse_pair(pair: &str) -> Option<(i32, i32)> {
    let (a, b) = pair.split_once(',')?;
    Some((a.parse().ok()?, b.parse().ok()?))
}

/// A quadrilateral as reported by text recognizers, corners in any order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quad(pub [Point; 4]);

impl Quad {
    /// Builds the quad describing an axis-aligned box, clockwise from top-left.
    pub fn from_rect(rect: Rect) -> Self {
        Quad([
            Point::new(rect.left, rect.top),
            Point::new(rect.right, rect.top),
            Point::new(rect.right, rect.bottom),
            Point::new(rect.left, rect.bottom),
        ])
    }

    /// Reduces the quad to its axis-aligned bounding rectangle.
    pub fn bounding_rect(&self) -> Rect {
        let [first, rest @ ..] = &self.0;
        let mut rect = Rect::new(first.x, first.y, first.x, first.y);
        for p in rest {
            rect.left = rect.left.min(p.x);
            rect.top = rect.top.min(p.y);
            rect.right = rect.right.max(p.x);
            rect.bottom = rect.bottom.max(p.y);
        }
        rect
    }
}
