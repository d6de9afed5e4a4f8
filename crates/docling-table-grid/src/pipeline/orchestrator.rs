/// Grid Pipeline Orchestrator
///
/// Chains stages 1-6 for one page, converts stage-local coordinates to page
/// coordinates, and turns recoverable stage errors into fallbacks:
///   - too few row/column lines: uniform division (from `PageHints`)
///   - no drawing column: no drawing cells
///   - no usable cells: empty cell list
///
/// Only an unreadable image, or a missing boundary without
/// `whole_page_fallback`, fails the page.
use crate::annotate::render_debug_overlay;
use crate::config::GridConfig;
use crate::error::{GridError, Result};
use crate::geometry::{BoundingBox, GeometrySource, LineGroup, Orientation};
use crate::persist::ArtifactWriter;
use crate::pipeline::{
    Cell, ColumnDescriptor, ColumnSelection, ColumnSpan, Fallback, GeometrySources, PageHints,
    PageJob, PageOutcome, PageResult, PipelineReport, Stage01BoundaryDetector, Stage02GridLineDetector,
    Stage03RowSegmenter, Stage04HeaderLocator, Stage05ColumnClassifier, Stage06CellExtractor,
    TableGeometry,
};
use crate::raster::crop;
use image::RgbImage;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Grid recovery pipeline for single-table pages
#[derive(Debug, Clone)]
pub struct GridPipeline {
    config: GridConfig,
    stage01: Stage01BoundaryDetector,
    stage02: Stage02GridLineDetector,
    stage03: Stage03RowSegmenter,
    stage04: Stage04HeaderLocator,
    stage05: Stage05ColumnClassifier,
    stage06: Stage06CellExtractor,
    /// Debug output directory for overlays and intermediate JSON
    debug_output_dir: Option<PathBuf>,
}

impl Default for GridPipeline {
    #[inline]
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl GridPipeline {
    /// Create a pipeline from a validated configuration
    ///
    /// # Errors
    ///
    /// `ConfigError` when the configuration is out of range.
    pub fn new(config: GridConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Create a pipeline with default configuration
    #[inline]
    #[must_use = "pipeline is created but not used"]
    pub fn with_defaults() -> Self {
        Self::build(GridConfig::default())
    }

    /// Save overlays, geometry and reports of every page into `debug_dir`
    #[inline]
    #[must_use = "pipeline is created but not used"]
    pub fn with_debug_output(mut self, debug_dir: PathBuf) -> Self {
        self.debug_output_dir = Some(debug_dir);
        self
    }

    fn build(config: GridConfig) -> Self {
        Self {
            stage01: Stage01BoundaryDetector::with_config((&config).into()),
            stage02: Stage02GridLineDetector::with_config((&config).into()),
            stage03: Stage03RowSegmenter::with_config((&config).into()),
            stage04: Stage04HeaderLocator::with_config((&config).into()),
            stage05: Stage05ColumnClassifier::with_config((&config).into()),
            stage06: Stage06CellExtractor::with_config((&config).into()),
            config,
            debug_output_dir: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Decode an image file and process it
    ///
    /// # Errors
    ///
    /// `ImageUnreadable` (carrying `page_id`) when the file cannot be decoded,
    /// otherwise as [`Self::process_page`].
    pub fn process_file<P: AsRef<Path>>(
        &self,
        page_id: &str,
        path: P,
        hints: &PageHints,
    ) -> Result<PageResult> {
        let path = path.as_ref();
        let page = image::open(path)
            .map_err(|source| GridError::ImageUnreadable {
                page_id: page_id.to_string(),
                path: path.to_path_buf(),
                source,
            })?
            .to_rgb8();
        log::debug!(
            "Page {page_id}: decoded {} ({}x{})",
            path.display(),
            page.width(),
            page.height()
        );
        self.process_page(page_id, &page, hints)
    }

    /// Process independent pages in parallel, one outcome per job in input order
    #[must_use = "page outcomes are returned but not used"]
    pub fn process_batch(&self, jobs: &[PageJob]) -> Vec<PageOutcome> {
        log::info!("Processing batch of {} page(s)", jobs.len());
        jobs.par_iter()
            .map(|job| PageOutcome {
                page_id: job.page_id.clone(),
                result: self.process_file(&job.page_id, &job.path, &job.hints),
            })
            .collect()
    }

    /// Recover the table grid of one page
    ///
    /// # Errors
    ///
    /// `BoundaryNotFound` when no table outline is found and
    /// `whole_page_fallback` is off. Every other stage failure becomes a
    /// [`Fallback`] in the report.
    pub fn process_page(
        &self,
        page_id: &str,
        page: &RgbImage,
        hints: &PageHints,
    ) -> Result<PageResult> {
        let mut report = PipelineReport::default();

        // Stage 1: Boundary
        log::debug!("Page {page_id}: Stage 01 boundary detection...");
        let (bounds, table, boundary_source, boundary_strategy) = match self.stage01.detect(page) {
            Ok(found) => (
                found.bounds,
                found.table,
                GeometrySource::Detected,
                Some(found.strategy),
            ),
            Err(e) if self.config.whole_page_fallback => {
                let full = BoundingBox::full(page.width(), page.height()).ok_or_else(|| {
                    GridError::BoundaryNotFound {
                        page_id: Some(page_id.to_string()),
                        reason: "page image is empty".to_string(),
                    }
                })?;
                log::warn!("Page {page_id}: {e}; using the whole page");
                report
                    .fallbacks
                    .push(Fallback::new("boundary", &e, "using the whole page"));
                (full, full, GeometrySource::Estimated, None)
            }
            Err(e) => {
                let e = e.for_page(page_id);
                log::warn!("{e}");
                return Err(e);
            }
        };

        let table_image = crop(page, &bounds);
        let (dx, dy) = (i64::from(bounds.x), i64::from(bounds.y));
        let table_local = table.translate(-dx, -dy);

        // Stage 2: Grid lines
        log::debug!("Page {page_id}: Stage 02 grid line detection...");
        let lines = self.stage02.detect(&table_image);
        report.lines_degraded = lines.degraded;

        // Stage 3: Rows and columns
        log::debug!("Page {page_id}: Stage 03 segmentation...");
        let (rows, rows_source) =
            self.resolve_axis(&lines.horizontal, &table_local, hints.expected_rows, &mut report);
        let (columns, columns_source) =
            self.resolve_axis(&lines.vertical, &table_local, hints.expected_columns, &mut report);

        // Stage 4: Header separator
        log::debug!("Page {page_id}: Stage 04 header separator...");
        let header = self.stage04.locate(&table_image, &table_local);
        report.header_lines_found = header.lines_found;
        report.header_mask = header.mask;
        let (rows, header_y) = match header.separator_y {
            Some(y) => insert_separator(&rows, y, self.config.merge_tolerance),
            None => (rows, None),
        };

        // Stage 5: Drawing column
        log::debug!("Page {page_id}: Stage 05 column classification...");
        let selection = match self.stage05.classify(&table_image, &columns, &rows, header_y) {
            Ok(selection) => Some(selection),
            Err(e) => {
                log::warn!("Page {page_id}: {e}");
                report
                    .fallbacks
                    .push(Fallback::new("drawing_column", &e, "no drawing cells extracted"));
                None
            }
        };

        // Stage 6: Cells
        log::debug!("Page {page_id}: Stage 06 cell extraction...");
        let (left, right) = match (columns.first(), columns.last()) {
            (Some(l), Some(r)) if r > l => (l, r),
            _ => (table_local.x, table_local.right()),
        };
        let data_rows = match header_y {
            Some(h) => LineGroup::raw(
                Orientation::Horizontal,
                rows.positions.iter().copied().filter(|&p| p >= h).collect(),
            ),
            None => rows.clone(),
        };
        let header_band = header_y.and_then(|h| {
            let top = rows.first().filter(|&f| f < h).unwrap_or(table_local.y);
            BoundingBox::from_edges(left, top, right, h)
        });

        let row_cells = self.extract_or_report(
            &table_image,
            &data_rows,
            ColumnSpan::full_row(left, right),
            &mut report,
        );
        let drawing_cells = selection.as_ref().map_or_else(Vec::new, |s| {
            self.extract_or_report(
                &table_image,
                &data_rows,
                ColumnSpan::column(ColumnDescriptor::Drawing(s.index), &s.bounds),
                &mut report,
            )
        });
        let header_cell = header_band.and_then(|band| {
            self.stage06
                .extract_band(&table_image, &band, ColumnDescriptor::Header, 0)
        });

        // Page coordinates
        let grid_top = header_band
            .map(|b| b.y)
            .into_iter()
            .chain(rows.first())
            .min()
            .unwrap_or(table_local.y);
        let grid_bottom = rows.last().filter(|&b| b > grid_top).unwrap_or(table_local.bottom());

        let geometry = TableGeometry {
            outer_bounds: table,
            header_separator_y: header_y.map(|h| shift(h, dy)),
            header_bounds: header_band.map(|b| b.translate(dx, dy)),
            row_bounds: data_rows
                .bands()
                .filter_map(|(top, bottom)| BoundingBox::from_edges(left, top, right, bottom))
                .map(|b| b.translate(dx, dy))
                .collect(),
            column_bounds: columns
                .bands()
                .map(|(l, r)| BoundingBox {
                    x: l,
                    y: grid_top,
                    width: r.saturating_sub(l).max(1),
                    height: grid_bottom.saturating_sub(grid_top).max(1),
                })
                .map(|b| b.translate(dx, dy))
                .collect(),
            row_boundaries: rows.translate(dy).positions,
            column_boundaries: columns.translate(dx).positions,
            drawing_column_index: selection.as_ref().map(|s| s.index),
            sources: GeometrySources {
                boundary: boundary_source,
                rows: rows_source,
                columns: columns_source,
                drawing_column: selection
                    .as_ref()
                    .map_or(GeometrySource::Estimated, |s| s.source),
                boundary_strategy,
                line_strategy: lines.strategy,
            },
        };
        report.column_scores = selection
            .map(|ColumnSelection { scores, .. }| scores)
            .unwrap_or_default()
            .into_iter()
            .map(|mut s| {
                s.bounds = s.bounds.translate(dx, dy);
                s
            })
            .collect();

        let result = PageResult {
            page_id: page_id.to_string(),
            geometry,
            row_cells: row_cells.into_iter().map(|c| to_page(c, dx, dy)).collect(),
            drawing_cells: drawing_cells.into_iter().map(|c| to_page(c, dx, dy)).collect(),
            header_cell: header_cell.map(|c| to_page(c, dx, dy)),
            report,
        };

        log::info!(
            "Page {page_id}: {} data row(s), {} column(s), drawing column {:?}, {} fallback(s)",
            result.geometry.row_count(),
            result.geometry.column_count(),
            result.geometry.drawing_column_index,
            result.report.fallbacks.len()
        );

        if let Some(ref debug_dir) = self.debug_output_dir {
            self.save_debug(debug_dir, page, &result);
        }
        Ok(result)
    }

    /// Segment one axis, falling back to uniform division
    fn resolve_axis(
        &self,
        raw: &LineGroup,
        table: &BoundingBox,
        expected: Option<usize>,
        report: &mut PipelineReport,
    ) -> (LineGroup, GeometrySource) {
        match self.stage03.segment(raw) {
            Ok(group) => (group, GeometrySource::Detected),
            Err(e) => {
                let bands = expected.unwrap_or(1).max(1);
                let (start, end, stage) = match raw.orientation {
                    Orientation::Horizontal => (table.y, table.bottom(), "rows"),
                    Orientation::Vertical => (table.x, table.right(), "columns"),
                };
                log::warn!("{e}; dividing {stage} uniformly into {bands} band(s)");
                report.fallbacks.push(Fallback::new(
                    stage,
                    &e,
                    format!("uniform division into {bands} band(s)"),
                ));
                (
                    LineGroup::uniform(raw.orientation, start, end, bands),
                    GeometrySource::Estimated,
                )
            }
        }
    }

    fn extract_or_report(
        &self,
        image: &RgbImage,
        rows: &LineGroup,
        span: ColumnSpan,
        report: &mut PipelineReport,
    ) -> Vec<Cell> {
        match self.stage06.extract(image, rows, span) {
            Ok(cells) => cells,
            Err(e) => {
                log::warn!("{} cells: {e}", span.column);
                report
                    .fallbacks
                    .push(Fallback::new("cells", &e, format!("no {} cells", span.column)));
                Vec::new()
            }
        }
    }

    fn save_debug(&self, debug_dir: &Path, page: &RgbImage, result: &PageResult) {
        let writer = match ArtifactWriter::new(debug_dir) {
            Ok(writer) => writer,
            Err(e) => {
                log::error!("Failed to create debug directory: {e}");
                return;
            }
        };
        let overlay = render_debug_overlay(page, &result.geometry);
        if let Err(e) = writer.write_image(&result.page_id, "overlay", &overlay) {
            log::error!("Failed to save overlay for {}: {e}", result.page_id);
        }
        if let Err(e) = writer.write_geometry(&result.page_id, &result.geometry) {
            log::error!("Failed to save geometry for {}: {e}", result.page_id);
        }
        if let Err(e) = writer.write_report(&result.page_id, &result.report) {
            log::error!("Failed to save report for {}: {e}", result.page_id);
        }
    }
}

/// Add the header separator to the row lines, snapping to an existing line within `tolerance`
fn insert_separator(rows: &LineGroup, y: u32, tolerance: u32) -> (LineGroup, Option<u32>) {
    if let Some(&existing) = rows.positions.iter().find(|&&p| p.abs_diff(y) <= tolerance) {
        return (rows.clone(), Some(existing));
    }
    let mut positions = rows.positions.clone();
    let at = positions.partition_point(|&p| p < y);
    positions.insert(at, y);
    (LineGroup::raw(rows.orientation, positions), Some(y))
}

#[inline]
fn shift(v: u32, d: i64) -> u32 {
    u32::try_from(i64::from(v) + d).unwrap_or(0)
}

fn to_page(mut cell: Cell, dx: i64, dy: i64) -> Cell {
    cell.bounds = cell.bounds.translate(dx, dy);
    cell
}
