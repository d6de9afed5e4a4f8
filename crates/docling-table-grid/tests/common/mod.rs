/// Common test utilities for synthetic order-table pages.
///
/// Pages are drawn with 2px black ruling lines, flat gray blocks standing in
/// for printed text, and seeded random strokes in the drawing column. These
/// are not part of the production library.
#[allow(dead_code)]
pub mod pages {
    use image::{Rgb, RgbImage};
    use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut};
    use imageproc::rect::Rect;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
    pub const GRAY: Rgb<u8> = Rgb([180, 180, 180]);

    /// Ruling line thickness
    pub const LINE: u32 = 2;
    /// Distance between ruling lines and cell content
    pub const CONTENT_INSET: u32 = 15;
    /// Allowed deviation of recovered positions
    pub const TOLERANCE: u32 = 3;

    /// A ruled table with one header row; every other row is data
    #[derive(Debug, Clone)]
    pub struct SyntheticTable {
        pub width: u32,
        pub height: u32,
        /// Top edge of each horizontal ruling line
        pub rows: Vec<u32>,
        /// Left edge of each vertical ruling line
        pub columns: Vec<u32>,
        /// Column band that holds drawings in the data rows
        pub drawing_column: Option<usize>,
        pub top_border: bool,
        /// Row bands (0 = header) left without any content
        pub blank_rows: Vec<usize>,
        pub strokes_per_cell: usize,
        pub seed: u64,
    }

    impl SyntheticTable {
        /// 1000x1400 order sheet: 1 header row, 4 data rows, drawings in the third column
        pub fn order_sheet() -> Self {
            Self {
                width: 1000,
                height: 1400,
                rows: vec![100, 340, 580, 820, 1060, 1300],
                columns: vec![50, 300, 600, 800, 950],
                drawing_column: Some(2),
                top_border: true,
                blank_rows: Vec::new(),
                strokes_per_cell: 25,
                seed: 17,
            }
        }

        /// Table rectangle including the last ruling line
        pub fn outer(&self) -> (u32, u32, u32, u32) {
            let left = self.columns[0];
            let top = self.rows[0];
            let right = self.columns[self.columns.len() - 1] + LINE;
            let bottom = self.rows[self.rows.len() - 1] + LINE;
            (left, top, right, bottom)
        }

        /// Horizontal center of the drawing column band
        pub fn drawing_center_x(&self) -> Option<u32> {
            self.drawing_column
                .map(|c| (self.columns[c] + self.columns[c + 1]) / 2)
        }

        pub fn data_rows(&self) -> usize {
            self.rows.len().saturating_sub(2)
        }

        pub fn render(&self) -> RgbImage {
            let mut page = RgbImage::from_pixel(self.width, self.height, WHITE);
            let mut rng = StdRng::seed_from_u64(self.seed);
            let (left, top, right, bottom) = self.outer();

            for (r, band) in self.rows.windows(2).enumerate() {
                if self.blank_rows.contains(&r) {
                    continue;
                }
                for (c, cols) in self.columns.windows(2).enumerate() {
                    let Some(content) = content_rect(cols[0], band[0], cols[1], band[1]) else {
                        continue;
                    };
                    if r > 0 && Some(c) == self.drawing_column {
                        scribble(&mut page, content, self.strokes_per_cell, &mut rng);
                    } else {
                        draw_filled_rect_mut(&mut page, content, GRAY);
                    }
                }
            }

            for (i, &y) in self.rows.iter().enumerate() {
                if i == 0 && !self.top_border {
                    continue;
                }
                draw_filled_rect_mut(
                    &mut page,
                    Rect::at(left as i32, y as i32).of_size(right - left, LINE),
                    BLACK,
                );
            }
            for &x in &self.columns {
                draw_filled_rect_mut(
                    &mut page,
                    Rect::at(x as i32, top as i32).of_size(LINE, bottom - top),
                    BLACK,
                );
            }
            page
        }
    }

    fn content_rect(left: u32, top: u32, right: u32, bottom: u32) -> Option<Rect> {
        let x0 = left + LINE + CONTENT_INSET;
        let y0 = top + LINE + CONTENT_INSET;
        let x1 = right.checked_sub(CONTENT_INSET)?;
        let y1 = bottom.checked_sub(CONTENT_INSET)?;
        (x1 > x0 && y1 > y0).then(|| Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0, y1 - y0))
    }

    /// Random 2px strokes confined to `area`
    pub fn scribble(page: &mut RgbImage, area: Rect, strokes: usize, rng: &mut StdRng) {
        let (x0, x1) = (area.left() as f32, area.right() as f32);
        let (y0, y1) = (area.top() as f32, area.bottom() as f32);
        for _ in 0..strokes {
            let start = (rng.random_range(x0..x1), rng.random_range(y0..y1));
            let end = (rng.random_range(x0..x1), rng.random_range(y0..y1));
            draw_line_segment_mut(page, start, end, BLACK);
            let shifted = |(x, y): (f32, f32)| ((x + 1.0).min(x1), y);
            draw_line_segment_mut(page, shifted(start), shifted(end), BLACK);
        }
    }

    /// True when every expected value has a recovered value within `TOLERANCE`
    pub fn all_within(expected: &[u32], actual: &[u32]) -> bool {
        expected.len() == actual.len()
            && expected
                .iter()
                .zip(actual)
                .all(|(e, a)| e.abs_diff(*a) <= TOLERANCE)
    }
}

#[allow(dead_code)]
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
