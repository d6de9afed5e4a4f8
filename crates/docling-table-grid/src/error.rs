//! Error types for table grid recovery
//!
//! Every stage returns `Result<T>` wrapping [`GridError`]. Most variants are
//! recoverable: the pipeline turns them into a fallback (uniform division,
//! widest column, ...) and records the decision in its report. Only an
//! unreadable page image, and a boundary that cannot be found, reach the caller.
//!
//! # Examples
//!
//! ```no_run
//! use docling_table_grid::{GridError, GridPipeline, PageHints};
//!
//! let pipeline = GridPipeline::with_defaults();
//! match pipeline.process_file("page-001", "scans/page-001.png", &PageHints::default()) {
//!     Ok(result) => log::debug!("{} rows", result.geometry.row_bounds.len()),
//!     Err(GridError::ImageUnreadable { page_id, .. }) => {
//!         log::warn!("Skipping unreadable page {page_id}");
//!     }
//!     Err(e) => log::warn!("Page failed: {e}"),
//! }
//! ```

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the grid recovery stages
#[derive(Error, Debug)]
pub enum GridError {
    /// No rectangular table outline could be located on the page
    ///
    /// Terminal for the page: the boundary stage is not retried internally.
    #[error(
        "Table boundary not found{}: {reason}",
        .page_id.as_ref().map(|p| format!(" on page {p}")).unwrap_or_default()
    )]
    BoundaryNotFound {
        /// Page being processed, attached by the pipeline
        page_id: Option<String>,
        /// What the detector tried before giving up
        reason: String,
    },

    /// Fewer than two separator lines survived on one axis
    #[error("Only {found} {axis} grid line(s) detected, need at least 2")]
    GridLinesInsufficient {
        /// Axis name ("horizontal" or "vertical")
        axis: &'static str,
        /// Number of resolved lines
        found: usize,
    },

    /// No column qualified as the drawing column
    #[error("Drawing column not found: {reason}")]
    ColumnNotFound {
        /// Why scoring and the width fallback both failed
        reason: String,
    },

    /// Cell extraction produced zero usable cells
    #[error("Cell extraction produced no usable cells ({bands} band(s) considered)")]
    EmptyExtraction {
        /// Number of row bands that were examined
        bands: usize,
    },

    /// The page image could not be read or decoded
    #[error("Page {page_id}: image unreadable ({path}): {source}")]
    ImageUnreadable {
        /// Identifier of the page being processed
        page_id: String,
        /// Path that was read
        path: PathBuf,
        /// Decoder or I/O failure
        #[source]
        source: image::ImageError,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {reason}")]
    ConfigError {
        /// Which field is out of range and why
        reason: String,
    },

    /// Encoding an artifact image failed
    #[error("Failed to encode artifact: {0}")]
    Encode(#[from] image::ImageError),

    /// Serializing geometry failed
    #[error("Failed to serialize geometry: {0}")]
    Serialize(#[from] serde_json::Error),

    /// I/O error while persisting artifacts
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl GridError {
    /// Returns true when the pipeline can continue with a fallback
    ///
    /// `GridLinesInsufficient` falls back to uniform division, `ColumnNotFound`
    /// to the widest column, and `EmptyExtraction` is reported without stopping
    /// later stages.
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::GridLinesInsufficient { .. }
                | Self::ColumnNotFound { .. }
                | Self::EmptyExtraction { .. }
        )
    }

    /// Returns true if this is a configuration error (user-fixable)
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigError { .. })
    }

    /// Page identifier attached to the error, if any
    #[inline]
    #[must_use = "returns the page id without modifying the error"]
    pub fn page_id(&self) -> Option<&str> {
        match self {
            Self::ImageUnreadable { page_id, .. } => Some(page_id),
            Self::BoundaryNotFound {
                page_id: Some(page_id),
                ..
            } => Some(page_id),
            _ => None,
        }
    }

    /// Attach `id` to an error raised before the page was known
    #[must_use]
    pub fn for_page(self, id: &str) -> Self {
        match self {
            Self::BoundaryNotFound {
                page_id: None,
                reason,
            } => Self::BoundaryNotFound {
                page_id: Some(id.to_string()),
                reason,
            },
            other => other,
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, GridError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn unreadable() -> GridError {
        GridError::ImageUnreadable {
            page_id: "p7".to_string(),
            path: PathBuf::from("/tmp/p7.png"),
            source: image::ImageError::IoError(io::Error::new(
                io::ErrorKind::NotFound,
                "missing",
            )),
        }
    }

    #[test]
    fn test_boundary_not_found_display() {
        let err = GridError::BoundaryNotFound {
            page_id: None,
            reason: "no contours".to_string(),
        };
        assert_eq!(err.to_string(), "Table boundary not found: no contours");
        assert!(err.page_id().is_none());

        let err = err.for_page("p3");
        assert_eq!(err.page_id(), Some("p3"));
        assert_eq!(
            err.to_string(),
            "Table boundary not found on page p3: no contours"
        );
    }

    #[test]
    fn test_for_page_keeps_existing_ids() {
        let err = unreadable().for_page("other");
        assert_eq!(err.page_id(), Some("p7"));
        let err = GridError::EmptyExtraction { bands: 2 }.for_page("p1");
        assert!(err.page_id().is_none());
    }

    #[test]
    fn test_grid_lines_insufficient_display() {
        let err = GridError::GridLinesInsufficient {
            axis: "horizontal",
            found: 1,
        };
        assert_eq!(
            err.to_string(),
            "Only 1 horizontal grid line(s) detected, need at least 2"
        );
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(GridError::GridLinesInsufficient {
            axis: "vertical",
            found: 0
        }
        .is_recoverable());
        assert!(GridError::ColumnNotFound {
            reason: String::new()
        }
        .is_recoverable());
        assert!(GridError::EmptyExtraction { bands: 0 }.is_recoverable());
        assert!(!GridError::BoundaryNotFound {
            page_id: None,
            reason: String::new()
        }
        .is_recoverable());
        assert!(!unreadable().is_recoverable());
    }

    #[test]
    fn test_unreadable_carries_page_id_and_source() {
        let err = unreadable();
        assert_eq!(err.page_id(), Some("p7"));
        assert!(err.to_string().contains("Page p7"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_config_error() {
        let err = GridError::ConfigError {
            reason: "cell_margin too large".to_string(),
        };
        assert!(err.is_config_error());
        assert!(err.page_id().is_none());
    }

    #[test]
    fn test_from_io_error() {
        let err: GridError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, GridError::Io(_)));
    }
}
