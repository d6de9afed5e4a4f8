//! Stage 4: Header Separator Location
//!
//! Finds the line separating the header row from the data rows.
//!
//! Only the top `search_fraction` of the table is searched. A pixel row counts
//! as a line when one contiguous run (small gaps bridged) covers at least
//! `span_fraction` of the table width. Qualifying rows within
//! `merge_tolerance` of each other form a single line, so double-drawn and
//! anti-aliased strokes count once. The first line found is normally the
//! table's top border and the second the header separator. If only one line is
//! found it is taken as the separator.
//!
//! Grid-marker pixels are read first; when they hold no full-width line the
//! dark-ink mask is searched instead.

// Pixel counts and fractions: conversions are bounded by image size.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use crate::config::{GridConfig, MarkerColor};
use crate::geometry::BoundingBox;
use crate::raster::{count_foreground, crop, crop_gray, ink_mask, longest_run, marker_mask, to_gray};
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

/// Configuration for Stage 4 (Header Separator Location)
#[derive(Debug, Clone, PartialEq)]
pub struct Stage04Config {
    pub marker: MarkerColor,
    pub ink_threshold: u8,
    pub search_fraction: f32,
    pub span_fraction: f32,
    pub run_gap: u32,
    pub merge_tolerance: u32,
}

impl From<&GridConfig> for Stage04Config {
    fn from(config: &GridConfig) -> Self {
        Self {
            marker: config.grid_marker.clone(),
            ink_threshold: config.ink_threshold,
            search_fraction: config.header_search_fraction,
            span_fraction: config.header_span_fraction,
            run_gap: config.header_run_gap,
            merge_tolerance: config.merge_tolerance,
        }
    }
}

impl Default for Stage04Config {
    #[inline]
    fn default() -> Self {
        Self::from(&GridConfig::default())
    }
}

/// Which mask the header lines were read from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMask {
    /// Grid-marker colored pixels
    Marker,
    /// Dark pixels
    #[default]
    Ink,
}

/// Result of the header search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderSearch {
    /// Separator y in the coordinates of the searched image
    pub separator_y: Option<u32>,
    /// Distinct full-width lines seen in the search band
    pub lines_found: usize,
    pub mask: HeaderMask,
}

/// Stage 4: Header Separator Locator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stage04HeaderLocator {
    config: Stage04Config,
}

impl Stage04HeaderLocator {
    #[inline]
    #[must_use = "header locator stage is created but not used"]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use = "header locator stage is created but not used"]
    pub const fn with_config(config: Stage04Config) -> Self {
        Self { config }
    }

    /// Locate the header separator inside `table` (coordinates of `image`)
    #[must_use = "returns the header search result"]
    pub fn locate(&self, image: &RgbImage, table: &BoundingBox) -> HeaderSearch {
        let Some(table) = table.clamp_to(image.width(), image.height()) else {
            return HeaderSearch {
                separator_y: None,
                lines_found: 0,
                mask: HeaderMask::Ink,
            };
        };

        let band_height = ((table.height as f32 * self.config.search_fraction).ceil() as u32)
            .clamp(1, table.height);
        let band = BoundingBox {
            height: band_height,
            ..table
        };

        let markers = marker_mask(&crop(image, &band), &self.config.marker);
        let marker_lines = if count_foreground(&markers) > 0 {
            self.full_width_lines(&markers)
        } else {
            Vec::new()
        };
        let (lines, kind) = if marker_lines.is_empty() {
            let gray = crop_gray(&to_gray(image), &band);
            let ink = ink_mask(&gray, self.config.ink_threshold);
            (self.full_width_lines(&ink), HeaderMask::Ink)
        } else {
            (marker_lines, HeaderMask::Marker)
        };

        let separator = lines.get(1).or_else(|| lines.first()).map(|&y| y + band.y);

        log::debug!(
            "Header search ({:?} mask, rows {}..{}): {} line(s), separator {:?}",
            kind,
            band.y,
            band.bottom(),
            lines.len(),
            separator
        );

        HeaderSearch {
            separator_y: separator,
            lines_found: lines.len(),
            mask: kind,
        }
    }

    /// First row of each chain of qualifying rows (band coordinates)
    ///
    /// A qualifying row more than `merge_tolerance` below the previous one
    /// starts a new line.
    fn full_width_lines(&self, mask: &GrayImage) -> Vec<u32> {
        let (width, height) = mask.dimensions();
        let min_run = self.config.span_fraction * width as f32;

        let mut lines = Vec::new();
        let mut last_qualified: Option<u32> = None;
        for y in 0..height {
            let row = (0..width).map(|x| mask.get_pixel(x, y).0[0] > 0);
            if (longest_run(row, self.config.run_gap) as f32) < min_run {
                continue;
            }
            if last_qualified.map_or(true, |last| y - last > self.config.merge_tolerance) {
                lines.push(y);
            }
            last_qualified = Some(y);
        }
        lines
    }
}
