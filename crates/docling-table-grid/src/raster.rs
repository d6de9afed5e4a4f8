//! Pixel-level helpers shared by the stages
//!
//! Masks follow the `imageproc` convention: foreground pixels are 255,
//! background pixels are 0.

// Pixel coordinates, counts and intensities: conversions are bounded by image size.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use crate::config::MarkerColor;
use crate::geometry::BoundingBox;
use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::point::Point;

/// Convert RGB to HSV with hue in 0..180 (half degrees), saturation and value in 0..=255
#[must_use]
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let r = f32::from(rgb[0]);
    let g = f32::from(rgb[1]);
    let b = f32::from(rgb[2]);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    let h_degrees = if delta <= f32::EPSILON {
        0.0
    } else if (max - r).abs() <= f32::EPSILON {
        60.0 * ((g - b) / delta)
    } else if (max - g).abs() <= f32::EPSILON {
        60.0 * ((b - r) / delta) + 120.0
    } else {
        60.0 * ((r - g) / delta) + 240.0
    };
    let h_degrees = if h_degrees < 0.0 {
        h_degrees + 360.0
    } else {
        h_degrees
    };

    [
        (h_degrees / 2.0).round().min(180.0) as u8,
        s.round() as u8,
        v.round() as u8,
    ]
}

/// Binary mask of pixels matching a marker color
#[must_use = "returns a new mask; the input is not modified"]
pub fn marker_mask(image: &RgbImage, marker: &MarkerColor) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let hsv = rgb_to_hsv(image.get_pixel(x, y).0);
        Luma([if marker.matches(hsv) { 255 } else { 0 }])
    })
}

/// Binary mask of pixels darker than `threshold`
#[must_use = "returns a new mask; the input is not modified"]
pub fn ink_mask(gray: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([if gray.get_pixel(x, y).0[0] < threshold {
            255
        } else {
            0
        }])
    })
}

#[inline]
#[must_use = "returns a grayscale copy"]
pub fn to_gray(image: &RgbImage) -> GrayImage {
    imageops::grayscale(image)
}

/// Number of foreground pixels in a mask
#[must_use]
pub fn count_foreground(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p.0[0] > 0).count()
}

#[must_use = "returns the cropped image"]
pub fn crop(image: &RgbImage, bbox: &BoundingBox) -> RgbImage {
    imageops::crop_imm(image, bbox.x, bbox.y, bbox.width, bbox.height).to_image()
}

#[must_use = "returns the cropped image"]
pub fn crop_gray(image: &GrayImage, bbox: &BoundingBox) -> GrayImage {
    imageops::crop_imm(image, bbox.x, bbox.y, bbox.width, bbox.height).to_image()
}

/// Length of the longest run of `true`, bridging gaps of up to `max_gap` values
///
/// The length is measured from the first to the last `true` of the run, so
/// bridged gaps count toward it.
#[must_use]
pub fn longest_run<I: IntoIterator<Item = bool>>(values: I, max_gap: u32) -> u32 {
    let mut best = 0;
    let mut active = false;
    let mut start = 0u32;
    let mut last_on = 0u32;

    for (i, on) in values.into_iter().enumerate() {
        if !on {
            continue;
        }
        let i = i as u32;
        if !active || i - last_on - 1 > max_gap {
            start = i;
            active = true;
        }
        last_on = i;
        best = best.max(i - start + 1);
    }
    best
}

/// Intensity statistics of one image region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionStats {
    /// Mean gray level (0 = black, 255 = white)
    pub mean: f64,
    /// Population variance of the gray level
    pub variance: f64,
    /// Fraction of pixels set in the edge map
    pub edge_ratio: f64,
}

impl RegionStats {
    #[inline]
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// Mean, variance and edge ratio of `bbox` in `gray`, using a precomputed edge map
#[must_use]
pub fn region_stats(gray: &GrayImage, edges: &GrayImage, bbox: &BoundingBox) -> RegionStats {
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut edge_count = 0u64;

    for y in bbox.y..bbox.bottom() {
        for x in bbox.x..bbox.right() {
            let v = f64::from(gray.get_pixel(x, y).0[0]);
            sum += v;
            sum_sq += v * v;
            if edges.get_pixel(x, y).0[0] > 0 {
                edge_count += 1;
            }
        }
    }

    let n = bbox.area() as f64;
    let mean = sum / n;
    RegionStats {
        mean,
        variance: (sum_sq / n - mean * mean).max(0.0),
        edge_ratio: edge_count as f64 / n,
    }
}

/// Fraction of pixels in `bbox` darker than `background`
#[must_use]
pub fn ink_fraction(gray: &GrayImage, bbox: &BoundingBox, background: u8) -> f32 {
    let mut ink = 0u64;
    for y in bbox.y..bbox.bottom() {
        for x in bbox.x..bbox.right() {
            if gray.get_pixel(x, y).0[0] < background {
                ink += 1;
            }
        }
    }
    (ink as f64 / bbox.area() as f64) as f32
}

/// Points of every top-level outer contour in a mask
///
/// The mask is traced inside a one-pixel background frame, so shapes touching
/// the image border are found too. Points are in mask coordinates.
#[must_use]
pub fn outer_contours(mask: &GrayImage) -> Vec<Vec<Point<u32>>> {
    let mut framed = GrayImage::new(mask.width() + 2, mask.height() + 2);
    imageops::replace(&mut framed, mask, 1, 1);

    let contours: Vec<Contour<u32>> = find_contours(&framed);
    contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| {
            c.points
                .into_iter()
                .map(|p| Point::new(p.x.saturating_sub(1), p.y.saturating_sub(1)))
                .collect()
        })
        .collect()
}

/// Axis-aligned bounds of a contour
#[must_use]
pub fn contour_bounds(points: &[Point<u32>]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    BoundingBox::from_edges(min_x, min_y, max_x + 1, max_y + 1)
}

/// Count disjoint ink shapes whose bounds reach `min_extent` pixels on either side
///
/// Only top-level outer borders count, so holes and nested shapes are ignored.
#[must_use]
pub fn count_shapes(gray: &GrayImage, ink_threshold: u8, min_extent: u32) -> usize {
    outer_contours(&ink_mask(gray, ink_threshold))
        .iter()
        .filter_map(|points| contour_bounds(points))
        .filter(|b| b.width.max(b.height) >= min_extent)
        .count()
}
