//! # Docling Table Grid - Grid-Structure Recovery for Scanned Order Tables
//!
//! Recovers the structure of a single bordered table from a page raster:
//! outer boundary, row and column separators, the header separator, and the
//! column holding freeform drawings. Each data row is then cropped into cell
//! images for downstream recognition.
//!
//! ## Features
//!
//! - **Boundary Detection**: Reserved marker color or plain ink contours
//! - **Grid Lines**: Canny + Hough with a full-span filter that rejects strokes inside cells
//! - **Segmentation**: Tolerance merge plus an adaptive noise filter, idempotent
//! - **Header Separator**: Full-width run search in the top of the table
//! - **Drawing Column**: Texture, edge and shape scoring per column
//! - **Cells**: Inset crops with stable 1-based row indices and blank flags
//! - **Fallbacks**: Recoverable failures degrade to estimated geometry, recorded per page
//!
//! ## Quick Start
//!
//! ```no_run
//! use docling_table_grid::{ArtifactWriter, GridPipeline, PageHints, Result};
//!
//! # fn main() -> Result<()> {
//! let pipeline = GridPipeline::with_defaults();
//! let hints = PageHints {
//!     expected_rows: Some(6),
//!     expected_columns: None,
//! };
//! let page = pipeline.process_file("order-17-p1", "scans/order-17-p1.png", &hints)?;
//!
//! if let Some(i) = page.geometry.drawing_column_index {
//!     log::info!("Drawing column {i}, {} drawing cells", page.drawing_cells.len());
//! }
//! for fallback in &page.report.fallbacks {
//!     log::warn!("{}: {} ({})", fallback.stage, fallback.error, fallback.action);
//! }
//!
//! let writer = ArtifactWriter::new("out/cells")?;
//! writer.write_page(&page)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! Every threshold is a named [`GridConfig`] field with a default. Partial JSON
//! files override only the fields they set:
//!
//! ```no_run
//! use docling_table_grid::{GridConfig, GridPipeline};
//!
//! # fn main() -> docling_table_grid::Result<()> {
//! let config = GridConfig::from_json_str(r#"{"cell_margin": 5, "whole_page_fallback": true}"#)?;
//! let pipeline = GridPipeline::new(config)?;
//! # Ok(())
//! # }
//! ```
//!
//! [`GridConfig::from_env`] reads `TABLE_GRID_*` overrides.
//!
//! ## Batch Processing
//!
//! [`GridPipeline::process_batch`] processes independent pages in parallel
//! (rayon). The pipeline holds no per-page state and is shared by reference.

pub mod annotate;
pub mod config;
pub mod error;
pub mod geometry;
pub mod persist;
pub mod pipeline;
pub mod raster;

pub use annotate::{render_debug_overlay, render_markers};
pub use config::{
    BoundaryStrategy, ColumnScoreWeights, GridConfig, HsvRange, LineStrategy, MarkerColor,
};
pub use error::{GridError, Result};
pub use geometry::{BoundingBox, GeometrySource, LineGroup, LinePosition, Orientation};
pub use persist::ArtifactWriter;

// Pipeline API
pub use pipeline::{
    Cell,             // Extracted cell image with bounds
    ColumnDescriptor, // FullRow | Column | Drawing | Header
    ColumnScore,      // Per-column drawing score
    Fallback,         // Recorded recoverable failure
    GeometrySources,  // Detected/estimated provenance
    GridPipeline,     // Main pipeline struct
    PageHints,        // Expected row/column counts for fallbacks
    PageJob,          // Batch input
    PageOutcome,      // Batch output
    PageResult,       // Geometry + cells + report
    PipelineReport,   // Per-page diagnostics
    TableGeometry,    // Serializable structure
};
