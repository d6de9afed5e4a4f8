//! # Grid Recovery Pipeline
//!
//! Fine-grained, independently testable stages that recover the grid of a
//! single bordered table from a page raster, plus the orchestrator that chains
//! them.
//!
//! ## Pipeline Stages
//!
//! ### Stage 1: Boundary Detection ([`Stage01BoundaryDetector`])
//! - **Input:** Page image
//! - **Process:** Marker-color or ink mask, morphology, contour + polygon test
//! - **Output:** Padded outer table rectangle
//!
//! ### Stage 2: Grid Line Detection ([`Stage02GridLineDetector`])
//! - **Input:** Table sub-image
//! - **Process:** Edge + Hough with span filter, or marker/ink projection scans
//! - **Output:** Raw horizontal and vertical positions
//!
//! ### Stage 3: Segmentation ([`Stage03RowSegmenter`])
//! - **Input:** Raw positions for one axis
//! - **Process:** Chain merge within tolerance, adaptive noise filter
//! - **Output:** Resolved separators
//!
//! ### Stage 4: Header Separator ([`Stage04HeaderLocator`])
//! - **Input:** Table sub-image and table rectangle
//! - **Process:** Full-width run search in the top of the table
//! - **Output:** Separator y, if any
//!
//! ### Stage 5: Drawing Column ([`Stage05ColumnClassifier`])
//! - **Input:** Table sub-image, resolved rows and columns, header y
//! - **Process:** Per-cell texture/edge/shape scoring
//! - **Output:** Drawing column index and per-column scores
//!
//! ### Stage 6: Cell Extraction ([`Stage06CellExtractor`])
//! - **Input:** Source image, row separators, column span
//! - **Process:** Inset, clamp, drop slivers, flag blanks
//! - **Output:** Cells with images
//!
//! Stages are stateless: each takes its inputs by reference and returns new
//! values. [`GridPipeline`] converts recoverable stage errors into fallbacks
//! and records them in the [`PipelineReport`].

pub mod orchestrator;
pub mod stage01_boundary;
pub mod stage02_grid_lines;
pub mod stage03_row_segmenter;
pub mod stage04_header;
pub mod stage05_column_classifier;
pub mod stage06_cell_extractor;
pub mod types;

pub use orchestrator::GridPipeline;
pub use stage01_boundary::{BoundaryDetection, Stage01BoundaryDetector, Stage01Config};
pub use stage02_grid_lines::{GridLines, Stage02Config, Stage02GridLineDetector};
pub use stage03_row_segmenter::{Stage03Config, Stage03RowSegmenter};
pub use stage04_header::{HeaderMask, HeaderSearch, Stage04Config, Stage04HeaderLocator};
pub use stage05_column_classifier::{
    ColumnScore, ColumnSelection, Stage05ColumnClassifier, Stage05Config,
};
pub use stage06_cell_extractor::{
    Cell, ColumnDescriptor, ColumnSpan, Stage06CellExtractor, Stage06Config,
};
pub use types::*;
