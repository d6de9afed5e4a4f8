/// Shared types for the grid pipeline
///
/// Geometry types serialize to JSON so results can be stored next to the cell
/// images and compared across runs. Cell images are not serialized.
use crate::config::{BoundaryStrategy, LineStrategy};
use crate::error::{GridError, Result};
use crate::geometry::{BoundingBox, GeometrySource};
use crate::pipeline::stage04_header::HeaderMask;
use crate::pipeline::stage05_column_classifier::ColumnScore;
use crate::pipeline::stage06_cell_extractor::Cell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Caller-supplied expectations used only when detection fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageHints {
    /// Number of row bands (header included) for uniform division
    pub expected_rows: Option<usize>,
    /// Number of column bands for uniform division
    pub expected_columns: Option<usize>,
}

/// One page of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageJob {
    pub page_id: String,
    pub path: PathBuf,
    pub hints: PageHints,
}

impl PageJob {
    #[inline]
    #[must_use = "returns a new PageJob"]
    pub fn new(page_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            page_id: page_id.into(),
            path: path.into(),
            hints: PageHints::default(),
        }
    }

    #[inline]
    #[must_use = "returns the job with hints attached"]
    pub fn with_hints(mut self, hints: PageHints) -> Self {
        self.hints = hints;
        self
    }
}

/// Where each part of the geometry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometrySources {
    pub boundary: GeometrySource,
    pub rows: GeometrySource,
    pub columns: GeometrySource,
    pub drawing_column: GeometrySource,
    /// `None` when the whole page was used as the table
    pub boundary_strategy: Option<BoundaryStrategy>,
    pub line_strategy: LineStrategy,
}

/// Recovered table structure in page coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableGeometry {
    /// Detected table rectangle (unpadded)
    pub outer_bounds: BoundingBox,
    pub header_separator_y: Option<u32>,
    /// Band between the table top and the header separator
    pub header_bounds: Option<BoundingBox>,
    /// Full-width data row bands, top to bottom
    pub row_bounds: Vec<BoundingBox>,
    /// Full-height column bands, left to right
    pub column_bounds: Vec<BoundingBox>,
    /// Every resolved row separator (header separator included)
    pub row_boundaries: Vec<u32>,
    /// Every resolved column separator
    pub column_boundaries: Vec<u32>,
    /// 0-based index into `column_bounds`
    pub drawing_column_index: Option<usize>,
    pub sources: GeometrySources,
}

impl TableGeometry {
    #[inline]
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.row_bounds.len()
    }

    #[inline]
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.column_bounds.len()
    }

    /// Bounds of the drawing column, if one was chosen
    #[must_use]
    pub fn drawing_column_bounds(&self) -> Option<BoundingBox> {
        self.drawing_column_index
            .and_then(|i| self.column_bounds.get(i))
            .copied()
    }

    /// True when any part of the geometry came from a fallback
    #[must_use]
    pub fn is_estimated(&self) -> bool {
        [
            self.sources.boundary,
            self.sources.rows,
            self.sources.columns,
            self.sources.drawing_column,
        ]
        .contains(&GeometrySource::Estimated)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A recoverable failure and what was done instead
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fallback {
    pub stage: String,
    pub error: String,
    pub action: String,
}

impl Fallback {
    #[must_use = "returns a new Fallback record"]
    pub fn new(stage: &str, error: &GridError, action: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            error: error.to_string(),
            action: action.into(),
        }
    }
}

/// Diagnostics collected while processing a page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Full-width lines seen by the header search
    pub header_lines_found: usize,
    pub header_mask: HeaderMask,
    /// True when no line strategy found two lines on both axes
    pub lines_degraded: bool,
    pub column_scores: Vec<ColumnScore>,
    pub fallbacks: Vec<Fallback>,
}

/// Everything recovered from one page
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    pub page_id: String,
    pub geometry: TableGeometry,
    /// Full-width data row cells, 1-based `row_index`
    pub row_cells: Vec<Cell>,
    /// Drawing-column cells of the data rows
    pub drawing_cells: Vec<Cell>,
    pub header_cell: Option<Cell>,
    pub report: PipelineReport,
}

impl PageResult {
    /// Every extracted cell: header first, then rows, then drawings
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.header_cell
            .iter()
            .chain(self.row_cells.iter())
            .chain(self.drawing_cells.iter())
    }
}

/// Result for one page of a batch
#[derive(Debug)]
pub struct PageOutcome {
    pub page_id: String,
    pub result: Result<PageResult>,
}
