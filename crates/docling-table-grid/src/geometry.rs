//! Geometric primitives shared by all stages
//!
//! Coordinates are integer pixels relative to the image a value was computed
//! from. Boxes are half-open: a box at `x` with `width` covers `x..x + width`.

// Pixel coordinates never exceed u32 and image dimensions fit in i64/f64.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle with non-zero size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Create a box, rejecting zero width or height
    #[inline]
    #[must_use = "returns a new BoundingBox if the size is non-zero"]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            None
        } else {
            Some(Self {
                x,
                y,
                width,
                height,
            })
        }
    }

    /// Create a box from left/top (inclusive) and right/bottom (exclusive) edges
    #[inline]
    #[must_use = "returns a new BoundingBox if the edges are ordered"]
    pub const fn from_edges(left: u32, top: u32, right: u32, bottom: u32) -> Option<Self> {
        if right <= left || bottom <= top {
            None
        } else {
            Some(Self {
                x: left,
                y: top,
                width: right - left,
                height: bottom - top,
            })
        }
    }

    /// Box covering a whole image
    #[inline]
    #[must_use = "returns the full-image box"]
    pub const fn full(width: u32, height: u32) -> Option<Self> {
        Self::new(0, 0, width, height)
    }

    /// Exclusive right edge
    #[inline]
    #[must_use]
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge
    #[inline]
    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    #[inline]
    #[must_use]
    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    #[inline]
    #[must_use]
    pub const fn center_x(&self) -> u32 {
        self.x + self.width / 2
    }

    #[inline]
    #[must_use]
    pub const fn center_y(&self) -> u32 {
        self.y + self.height / 2
    }

    /// True when `other` lies entirely inside `self`
    #[inline]
    #[must_use]
    pub const fn contains(&self, other: &Self) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// True when the two boxes share at least one pixel
    #[inline]
    #[must_use]
    pub const fn intersects(&self, other: &Self) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    #[must_use = "returns the overlapping area in pixels"]
    pub fn intersection_area(&self, other: &Self) -> u64 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return 0;
        }
        u64::from(right - left) * u64::from(bottom - top)
    }

    /// Expand on every side by `padding`, clamped to a `width` x `height` image
    #[must_use = "returns the padded box"]
    pub fn pad(&self, padding: u32, width: u32, height: u32) -> Self {
        let left = self.x.saturating_sub(padding);
        let top = self.y.saturating_sub(padding);
        let right = self.right().saturating_add(padding).min(width).max(left + 1);
        let bottom = self
            .bottom()
            .saturating_add(padding)
            .min(height)
            .max(top + 1);
        Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }

    /// Shrink on every side by `margin`; `None` when nothing is left
    #[must_use = "returns the inset box if it is non-empty"]
    pub fn inset(&self, margin: u32) -> Option<Self> {
        let left = self.x.saturating_add(margin);
        let top = self.y.saturating_add(margin);
        let right = self.right().saturating_sub(margin);
        let bottom = self.bottom().saturating_sub(margin);
        Self::from_edges(left, top, right, bottom)
    }

    /// Shrink horizontally and vertically by independent margins
    #[must_use = "returns the inset box if it is non-empty"]
    pub fn inset_xy(&self, margin_x: u32, margin_y: u32) -> Option<Self> {
        Self::from_edges(
            self.x.saturating_add(margin_x),
            self.y.saturating_add(margin_y),
            self.right().saturating_sub(margin_x),
            self.bottom().saturating_sub(margin_y),
        )
    }

    /// Intersect with a `width` x `height` image
    #[must_use = "returns the clamped box if any of it lies inside the image"]
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        Self::from_edges(
            self.x.min(width),
            self.y.min(height),
            self.right().min(width),
            self.bottom().min(height),
        )
    }

    /// Shift by a signed offset; coordinates saturate at zero
    #[must_use = "returns the translated box"]
    pub fn translate(&self, dx: i64, dy: i64) -> Self {
        let shift = |v: u32, d: i64| (i64::from(v) + d).clamp(0, i64::from(u32::MAX)) as u32;
        Self {
            x: shift(self.x, dx),
            y: shift(self.y, dy),
            width: self.width,
            height: self.height,
        }
    }

    /// Convert to an `imageproc` rectangle for drawing
    #[inline]
    #[must_use]
    pub fn to_rect(&self) -> Rect {
        Rect::at(self.x as i32, self.y as i32).of_size(self.width, self.height)
    }
}

/// Separator axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Row separator, positioned by y
    Horizontal,
    /// Column separator, positioned by x
    Vertical,
}

impl Orientation {
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Horizontal => "horizontal",
            Self::Vertical => "vertical",
        }
    }
}

/// A single separator coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinePosition {
    pub position: u32,
    pub orientation: Orientation,
}

/// Separator positions along one axis
///
/// Groups straight out of the line detector are raw: unsorted and possibly
/// duplicated. Groups returned by the segmenter are sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineGroup {
    pub orientation: Orientation,
    pub positions: Vec<u32>,
}

impl LineGroup {
    #[inline]
    #[must_use = "returns a new LineGroup"]
    pub const fn raw(orientation: Orientation, positions: Vec<u32>) -> Self {
        Self {
            orientation,
            positions,
        }
    }

    #[inline]
    #[must_use = "returns an empty LineGroup"]
    pub const fn empty(orientation: Orientation) -> Self {
        Self::raw(orientation, Vec::new())
    }

    /// Evenly divide `start..=end` into `count` bands (`count + 1` lines)
    #[must_use = "returns the uniform LineGroup"]
    pub fn uniform(orientation: Orientation, start: u32, end: u32, count: usize) -> Self {
        let count = count.max(1);
        let span = f64::from(end.saturating_sub(start));
        let positions = (0..=count)
            .map(|i| start + (span * i as f64 / count as f64).round() as u32)
            .collect();
        Self::raw(orientation, positions)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn first(&self) -> Option<u32> {
        self.positions.first().copied()
    }

    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<u32> {
        self.positions.last().copied()
    }

    /// Consecutive `(start, end)` pairs
    pub fn bands(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.positions.windows(2).map(|w| (w[0], w[1]))
    }

    /// Smallest gap between consecutive positions (None with < 2 lines)
    #[must_use]
    pub fn min_separation(&self) -> Option<u32> {
        self.positions
            .windows(2)
            .map(|w| w[1].abs_diff(w[0]))
            .min()
    }

    /// Tagged view of every position
    pub fn lines(&self) -> impl Iterator<Item = LinePosition> + '_ {
        self.positions.iter().map(move |&position| LinePosition {
            position,
            orientation: self.orientation,
        })
    }

    /// Shift every position by `offset` (saturating at zero)
    #[must_use = "returns the translated LineGroup"]
    pub fn translate(&self, offset: i64) -> Self {
        let positions = self
            .positions
            .iter()
            .map(|&p| (i64::from(p) + offset).clamp(0, i64::from(u32::MAX)) as u32)
            .collect();
        Self::raw(self.orientation, positions)
    }
}

/// Whether a geometric value was measured or guessed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometrySource {
    #[default]
    Detected,
    Estimated,
}
