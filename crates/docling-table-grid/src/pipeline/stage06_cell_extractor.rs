//! Stage 6: Cell Extraction
//!
//! Crops one cell per row band for a given column span. Each cell is inset by
//! `margin` so grid lines stay out, clamped to the image, and dropped when
//! shorter than `min_cell_height` (over-segmentation artifacts). Blank cells
//! are kept and flagged so row indices stay stable.

// Fractions of pixel counts.
#![allow(clippy::cast_precision_loss)]

use crate::config::GridConfig;
use crate::error::{GridError, Result};
use crate::geometry::{BoundingBox, LineGroup};
use crate::raster::{crop, ink_fraction, to_gray};
use image::RgbImage;
use std::fmt;

/// Configuration for Stage 6 (Cell Extraction)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage06Config {
    pub margin: u32,
    pub min_cell_height: u32,
    pub empty_intensity: u8,
    pub empty_ink_fraction: f32,
}

impl From<&GridConfig> for Stage06Config {
    fn from(config: &GridConfig) -> Self {
        Self {
            margin: config.cell_margin,
            min_cell_height: config.min_cell_height,
            empty_intensity: config.empty_intensity,
            empty_ink_fraction: config.empty_ink_fraction,
        }
    }
}

impl Default for Stage06Config {
    #[inline]
    fn default() -> Self {
        Self::from(&GridConfig::default())
    }
}

/// Which horizontal slice of the table a cell belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnDescriptor {
    /// The whole table width
    FullRow,
    /// An ordinary column by 0-based index
    Column(usize),
    /// The drawing column by 0-based index
    Drawing(usize),
    /// The header band
    Header,
}

impl ColumnDescriptor {
    /// Short name used in artifact file names
    #[must_use]
    pub fn slug(&self) -> String {
        match self {
            Self::FullRow => "row".to_string(),
            Self::Column(i) => format!("col{i}"),
            Self::Drawing(i) => format!("drawing{i}"),
            Self::Header => "header".to_string(),
        }
    }
}

impl fmt::Display for ColumnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.slug())
    }
}

/// Horizontal extent cells are cut from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpan {
    pub column: ColumnDescriptor,
    /// Left edge (inclusive)
    pub left: u32,
    /// Right edge (exclusive)
    pub right: u32,
}

impl ColumnSpan {
    #[inline]
    #[must_use]
    pub const fn full_row(left: u32, right: u32) -> Self {
        Self {
            column: ColumnDescriptor::FullRow,
            left,
            right,
        }
    }

    #[inline]
    #[must_use]
    pub const fn column(column: ColumnDescriptor, bounds: &BoundingBox) -> Self {
        Self {
            column,
            left: bounds.x,
            right: bounds.x + bounds.width,
        }
    }
}

/// One extracted cell
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// 1-based index among the surviving cells of its extraction (0 for the header)
    pub row_index: usize,
    pub column: ColumnDescriptor,
    /// Crop rectangle in the coordinates of the source image
    pub bounds: BoundingBox,
    pub image: RgbImage,
    pub is_empty: bool,
    /// Fraction of pixels darker than the background intensity
    pub ink_fraction: f32,
}

/// Stage 6: Cell Extractor
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stage06CellExtractor {
    config: Stage06Config,
}

impl Stage06CellExtractor {
    #[inline]
    #[must_use = "cell extractor stage is created but not used"]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use = "cell extractor stage is created but not used"]
    pub const fn with_config(config: Stage06Config) -> Self {
        Self { config }
    }

    /// Extract one cell per consecutive pair of row boundaries
    ///
    /// # Errors
    ///
    /// `EmptyExtraction` when no band yields a usable cell.
    pub fn extract(&self, image: &RgbImage, rows: &LineGroup, span: ColumnSpan) -> Result<Vec<Cell>> {
        let mut cells = Vec::new();
        let mut skipped = 0usize;

        for (top, bottom) in rows.bands() {
            let Some(bounds) = self.cell_bounds(image, span.left, top, span.right, bottom) else {
                skipped += 1;
                continue;
            };
            cells.push(self.make_cell(image, bounds, span.column, cells.len() + 1));
        }

        let bands = rows.len().saturating_sub(1);
        log::debug!(
            "Extracted {} {} cell(s) from {} band(s), {} skipped",
            cells.len(),
            span.column,
            bands,
            skipped
        );

        if cells.is_empty() {
            return Err(GridError::EmptyExtraction { bands });
        }
        Ok(cells)
    }

    /// Extract a single band (e.g. the header) as one cell
    #[must_use = "returns the extracted cell if the band is usable"]
    pub fn extract_band(
        &self,
        image: &RgbImage,
        band: &BoundingBox,
        column: ColumnDescriptor,
        row_index: usize,
    ) -> Option<Cell> {
        let bounds = self.cell_bounds(image, band.x, band.y, band.right(), band.bottom())?;
        Some(self.make_cell(image, bounds, column, row_index))
    }

    fn cell_bounds(
        &self,
        image: &RgbImage,
        left: u32,
        top: u32,
        right: u32,
        bottom: u32,
    ) -> Option<BoundingBox> {
        let bounds = BoundingBox::from_edges(left, top, right, bottom)?
            .inset(self.config.margin)?
            .clamp_to(image.width(), image.height())?;
        (bounds.height >= self.config.min_cell_height).then_some(bounds)
    }

    fn make_cell(
        &self,
        image: &RgbImage,
        bounds: BoundingBox,
        column: ColumnDescriptor,
        row_index: usize,
    ) -> Cell {
        let cell_image = crop(image, &bounds);
        let gray = to_gray(&cell_image);
        let local = BoundingBox {
            x: 0,
            y: 0,
            ..bounds
        };
        let ink = ink_fraction(&gray, &local, self.config.empty_intensity);
        Cell {
            row_index,
            column,
            bounds,
            image: cell_image,
            is_empty: ink <= self.config.empty_ink_fraction,
            ink_fraction: ink,
        }
    }
}
