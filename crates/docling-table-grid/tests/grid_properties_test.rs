//! Property tests across stage boundaries
//!
//! Run with: cargo test -p docling-table-grid --test grid_properties_test

mod common;

use common::pages::{scribble, BLACK, WHITE};
use docling_table_grid::geometry::{BoundingBox, LineGroup, Orientation};
use docling_table_grid::pipeline::{Stage01BoundaryDetector, Stage05ColumnClassifier};
use docling_table_grid::{GridConfig, GridPipeline, PageHints};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

const RED: Rgb<u8> = Rgb([255, 0, 0]);

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// A painted frame is recovered exactly and the padded box contains it
    #[test]
    fn prop_marker_frame_recovered(
        x in 5u32..120,
        y in 5u32..90,
        w in 60u32..260,
        h in 50u32..190,
    ) {
        let mut page = RgbImage::from_pixel(400, 300, WHITE);
        for t in 0..4u32 {
            let rect = Rect::at((x + t) as i32, (y + t) as i32).of_size(w - 2 * t, h - 2 * t);
            draw_hollow_rect_mut(&mut page, rect, RED);
        }
        let found = Stage01BoundaryDetector::new().detect(&page).unwrap();
        let expected = BoundingBox::new(x, y, w, h).unwrap();

        prop_assert!(found.bounds.contains(&found.table));
        let area = found.table.area() as f64;
        let expected_area = expected.area() as f64;
        prop_assert!((area - expected_area).abs() <= 0.05 * expected_area);
        prop_assert_eq!(found.table, expected);
    }

    /// A column narrower than the minimum is never chosen when others exist
    #[test]
    fn prop_narrow_columns_never_chosen(
        widths in prop::collection::vec(10u32..120, 2..6),
        inked in prop::collection::vec(any::<bool>(), 6),
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let total: u32 = widths.iter().sum();
        let mut page = RgbImage::from_pixel(total + 10, 240, WHITE);

        let mut xs = vec![5u32];
        for w in &widths {
            xs.push(xs[xs.len() - 1] + w);
        }
        let ys = vec![5u32, 80, 160, 235];
        for (c, band) in xs.windows(2).enumerate() {
            if !inked[c] || band[1] - band[0] < 12 {
                continue;
            }
            for rows in ys.windows(2) {
                let area = Rect::at(band[0] as i32 + 4, rows[0] as i32 + 4)
                    .of_size(band[1] - band[0] - 8, rows[1] - rows[0] - 8);
                scribble(&mut page, area, 6, &mut rng);
            }
        }
        for &x in &xs {
            draw_filled_rect_mut(&mut page, Rect::at(x as i32, 5).of_size(1, 231), BLACK);
        }

        let classifier = Stage05ColumnClassifier::new();
        let columns = LineGroup::raw(Orientation::Vertical, xs);
        let rows = LineGroup::raw(Orientation::Horizontal, ys);
        match classifier.classify(&page, &columns, &rows, None) {
            Ok(selection) => prop_assert!(
                selection.bounds.width >= 30,
                "chose {}px column {}", selection.bounds.width, selection.index
            ),
            Err(e) => prop_assert!(widths.iter().all(|&w| w < 30), "{e}"),
        }
    }

    /// Uniform fallback cells are disjoint, ordered and 1-based
    #[test]
    fn prop_fallback_cells_disjoint(rows in 1usize..9, columns in 1usize..7) {
        let config = GridConfig { whole_page_fallback: true, ..Default::default() };
        let page = RgbImage::from_pixel(300, 240, WHITE);
        let hints = PageHints { expected_rows: Some(rows), expected_columns: Some(columns) };
        let result = GridPipeline::new(config).unwrap().process_page("blank", &page, &hints).unwrap();

        prop_assert_eq!(result.row_cells.len(), rows);
        prop_assert_eq!(result.geometry.column_count(), columns);
        for (i, cell) in result.row_cells.iter().enumerate() {
            prop_assert_eq!(cell.row_index, i + 1);
            prop_assert!(cell.is_empty);
        }
        for pair in result.row_cells.windows(2) {
            prop_assert!(!pair[0].bounds.intersects(&pair[1].bounds));
            prop_assert!(pair[0].bounds.bottom() <= pair[1].bounds.y);
        }
        prop_assert!(result.geometry.drawing_column_index.is_some());
    }
}
