//! Writing cells and geometry to disk
//!
//! File names are deterministic, `{page_id}_row{NNN}_{column}.png` for cells
//! and `{page_id}_geometry.json` for geometry, so re-running a page replaces
//! its artifacts instead of adding new ones. Every file is written to a
//! temporary file in the target directory and renamed into place.

use crate::error::{GridError, Result};
use crate::pipeline::{Cell, PageResult, PipelineReport, TableGeometry};
use image::{ImageFormat, RgbImage};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use xxhash_rust::xxh3::xxh3_64;

/// File-name stem for a page id
///
/// Ids made only of ASCII alphanumerics, `-`, `_` and inner dots are used
/// as-is. Anything else has unsafe characters replaced by `_` and gets an
/// 8-digit hash of the original id appended, so distinct ids never share a
/// stem (`a/b` and `a_b` stay apart).
#[must_use]
pub fn sanitize_page_id(page_id: &str) -> String {
    let cleaned: String = page_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if !trimmed.is_empty() && trimmed == page_id {
        return trimmed.to_string();
    }

    let stem = if trimmed.is_empty() { "page" } else { trimmed };
    format!("{stem}_{:08x}", xxh3_64(page_id.as_bytes()) >> 32)
}

/// File name of a cell image
#[must_use]
pub fn cell_file_name(page_id: &str, cell: &Cell) -> String {
    format!(
        "{}_row{:03}_{}.png",
        sanitize_page_id(page_id),
        cell.row_index,
        cell.column.slug()
    )
}

/// Writes page artifacts into one output directory
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    /// Create the writer, creating `dir` if needed
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_cell(&self, page_id: &str, cell: &Cell) -> Result<PathBuf> {
        self.write_png(&cell_file_name(page_id, cell), &cell.image)
    }

    pub fn write_geometry(&self, page_id: &str, geometry: &TableGeometry) -> Result<PathBuf> {
        let name = format!("{}_geometry.json", sanitize_page_id(page_id));
        self.write_bytes(&name, geometry.to_json()?.as_bytes())
    }

    pub fn write_report(&self, page_id: &str, report: &PipelineReport) -> Result<PathBuf> {
        let name = format!("{}_report.json", sanitize_page_id(page_id));
        let json = serde_json::to_string_pretty(report)?;
        self.write_bytes(&name, json.as_bytes())
    }

    /// Write an arbitrary image (e.g. a debug overlay) as PNG
    pub fn write_image(&self, page_id: &str, suffix: &str, image: &RgbImage) -> Result<PathBuf> {
        let name = format!("{}_{suffix}.png", sanitize_page_id(page_id));
        self.write_png(&name, image)
    }

    /// Write every cell and the geometry of a page; returns the written paths
    pub fn write_page(&self, result: &PageResult) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for cell in result.cells() {
            written.push(self.write_cell(&result.page_id, cell)?);
        }
        written.push(self.write_geometry(&result.page_id, &result.geometry)?);
        log::info!(
            "Wrote {} artifact(s) for page {} to {}",
            written.len(),
            result.page_id,
            self.dir.display()
        );
        Ok(written)
    }

    fn write_png(&self, name: &str, image: &RgbImage) -> Result<PathBuf> {
        let mut encoded = Cursor::new(Vec::new());
        image.write_to(&mut encoded, ImageFormat::Png)?;
        self.write_bytes(name, encoded.get_ref())
    }

    fn write_bytes(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.dir.join(name);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|e| GridError::Io(e.error))?;
        log::debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;
    use crate::pipeline::ColumnDescriptor;
    use image::Rgb;

    fn cell(row_index: usize, column: ColumnDescriptor) -> Cell {
        Cell {
            row_index,
            column,
            bounds: BoundingBox::new(0, 0, 8, 6).unwrap(),
            image: RgbImage::from_pixel(8, 6, Rgb([10, 20, 30])),
            is_empty: false,
            ink_fraction: 1.0,
        }
    }

    #[test]
    fn test_sanitize_page_id() {
        assert_eq!(sanitize_page_id("scan-01.tif"), "scan-01.tif");
        assert_eq!(sanitize_page_id("p_1"), "p_1");
        assert!(sanitize_page_id("order 12/p3").starts_with("order_12_p3_"));
        assert!(sanitize_page_id("../").starts_with("__"));
        assert!(sanitize_page_id("").starts_with("page_"));
        assert_eq!(sanitize_page_id("a/b"), sanitize_page_id("a/b"));
    }

    #[test]
    fn test_sanitized_ids_stay_distinct() {
        let ids = ["a/b", "a_b", "a b", "a:b", ".a_b", "a_b.", "", "page"];
        let stems: std::collections::BTreeSet<String> =
            ids.iter().map(|id| sanitize_page_id(id)).collect();
        assert_eq!(stems.len(), ids.len(), "{stems:?}");
        assert!(stems.iter().all(|s| !s.contains('/') && !s.starts_with('.')));
    }

    #[test]
    fn test_cell_file_name() {
        assert_eq!(
            cell_file_name("p1", &cell(7, ColumnDescriptor::Drawing(2))),
            "p1_row007_drawing2.png"
        );
        assert_eq!(
            cell_file_name("p1", &cell(0, ColumnDescriptor::Header)),
            "p1_row000_header.png"
        );
    }

    #[test]
    fn test_write_cell_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("out")).unwrap();
        let first = writer.write_cell("p1", &cell(1, ColumnDescriptor::FullRow)).unwrap();
        let second = writer.write_cell("p1", &cell(1, ColumnDescriptor::FullRow)).unwrap();
        assert_eq!(first, second);

        let files: Vec<_> = fs::read_dir(writer.dir()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let decoded = image::open(&first).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(3, 3).0, [10, 20, 30]);
    }
}
