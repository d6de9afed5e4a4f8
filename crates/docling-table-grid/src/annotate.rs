//! Rendering recovered geometry back onto page images
//!
//! [`render_markers`] produces a pre-annotated page in the reserved marker
//! colors, the input format of the `MarkerColor`/`MarkerScan` strategies.
//! [`render_debug_overlay`] draws the geometry for visual inspection.

// Drawing coordinates are page pixels and fit in f32.
#![allow(clippy::cast_precision_loss)]

use crate::config::GridConfig;
use crate::geometry::BoundingBox;
use crate::pipeline::TableGeometry;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};

/// Thickness of painted marker lines
pub const MARKER_THICKNESS: u32 = 3;

const ROW_COLOR: Rgb<u8> = Rgb([0, 90, 255]);
const COLUMN_COLOR: Rgb<u8> = Rgb([0, 170, 170]);
const HEADER_COLOR: Rgb<u8> = Rgb([255, 140, 0]);
const DRAWING_COLOR: Rgb<u8> = Rgb([200, 0, 200]);
const OUTLINE_COLOR: Rgb<u8> = Rgb([220, 30, 30]);

/// Paint the table outline and grid separators in the configured marker colors
///
/// The boundary frame is drawn just outside `outer_bounds` so it never covers
/// the outermost grid lines, which are painted along the table edges.
#[must_use = "returns the annotated copy; the input is not modified"]
pub fn render_markers(image: &RgbImage, geometry: &TableGeometry, config: &GridConfig) -> RgbImage {
    let mut out = image.clone();
    let (width, height) = out.dimensions();
    let grid = Rgb(config.grid_marker.paint);
    let boundary = Rgb(config.boundary_marker.paint);
    let table = geometry.outer_bounds;

    for &y in &geometry.row_boundaries {
        let line = BoundingBox::new(table.x, y, table.width, MARKER_THICKNESS)
            .and_then(|b| b.clamp_to(width, height));
        if let Some(line) = line {
            draw_filled_rect_mut(&mut out, line.to_rect(), grid);
        }
    }
    for &x in &geometry.column_boundaries {
        let line = BoundingBox::new(x, table.y, MARKER_THICKNESS, table.height)
            .and_then(|b| b.clamp_to(width, height));
        if let Some(line) = line {
            draw_filled_rect_mut(&mut out, line.to_rect(), grid);
        }
    }

    for i in 1..=MARKER_THICKNESS {
        let frame = table.pad(i, width, height);
        draw_hollow_rect_mut(&mut out, frame.to_rect(), boundary);
    }

    log::debug!(
        "Rendered markers: {} row and {} column separators",
        geometry.row_boundaries.len(),
        geometry.column_boundaries.len()
    );
    out
}

/// Draw rows, columns, the header separator and the drawing column
#[must_use = "returns the overlay copy; the input is not modified"]
pub fn render_debug_overlay(image: &RgbImage, geometry: &TableGeometry) -> RgbImage {
    let mut out = image.clone();
    let table = geometry.outer_bounds;
    let (left, right) = (table.x as f32, (table.right() - 1) as f32);
    let (top, bottom) = (table.y as f32, (table.bottom() - 1) as f32);

    for &y in &geometry.row_boundaries {
        draw_line_segment_mut(&mut out, (left, y as f32), (right, y as f32), ROW_COLOR);
    }
    for &x in &geometry.column_boundaries {
        draw_line_segment_mut(&mut out, (x as f32, top), (x as f32, bottom), COLUMN_COLOR);
    }
    if let Some(y) = geometry.header_separator_y {
        for dy in 0..2 {
            let y = (y + dy) as f32;
            draw_line_segment_mut(&mut out, (left, y), (right, y), HEADER_COLOR);
        }
    }
    if let Some(column) = geometry.drawing_column_bounds() {
        for i in 0..3 {
            let Some(r) = column.inset(i) else { break };
            draw_hollow_rect_mut(&mut out, r.to_rect(), DRAWING_COLOR);
        }
    }
    draw_hollow_rect_mut(&mut out, table.to_rect(), OUTLINE_COLOR);
    out
}
