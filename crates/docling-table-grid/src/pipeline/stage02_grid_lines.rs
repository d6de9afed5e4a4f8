//! Stage 2: Grid Line Detection
//!
//! Finds raw row and column separator positions inside the table sub-image.
//!
//! Three interchangeable strategies, tried in configuration order:
//! - **`EdgeHough`:** Canny edge map, Hough transform with a low vote threshold,
//!   near-axis filter, then the longest supported segment along each line is
//!   measured (bridging gaps) and kept only when it spans almost the whole table.
//!   Support only comes from edge pixels whose gradient says they run along the
//!   line, so ruling lines crossing a candidate do not bridge the gaps between
//!   content blocks. This rejects strokes and block edges inside cells.
//! - **`MarkerScan`:** rows/columns whose grid-marker pixel fraction exceeds a
//!   threshold. Compatibility path for pre-annotated images.
//! - **`InkScan`:** the same projection scan on dark pixels.
//!
//! The first strategy that yields at least two distinct lines on both axes
//! wins. If none does, the result with the most lines is returned and the
//! segmenter downstream reports the shortfall.
//!
//! Output positions are raw: unsorted runs of adjacent pixels for thick lines,
//! edge pairs for Hough lines. Deduplication is Stage 3's job.

// Pixel coordinates and angles: conversions are bounded by image size.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use crate::config::{GridConfig, LineStrategy, MarkerColor};
use crate::geometry::{LineGroup, Orientation};
use crate::raster::{ink_mask, longest_run, marker_mask, to_gray};
use image::{GrayImage, Luma, RgbImage};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};

/// Blur applied inside `imageproc::edges::canny`
const CANNY_SIGMA: f32 = 1.4;

/// Configuration for Stage 2 (Grid Line Detection)
#[derive(Debug, Clone, PartialEq)]
pub struct Stage02Config {
    pub strategies: Vec<LineStrategy>,
    pub marker: MarkerColor,
    pub ink_threshold: u8,
    pub canny_low: f32,
    pub canny_high: f32,
    pub hough_vote_fraction: f32,
    pub hough_suppression_radius: u32,
    pub axis_tolerance_degrees: u32,
    pub hough_max_gap: u32,
    pub line_span_fraction: f32,
    pub marker_line_fraction: f32,
    /// Positions further apart than this count as distinct lines when judging a strategy
    pub distinct_line_gap: u32,
}

impl From<&GridConfig> for Stage02Config {
    fn from(config: &GridConfig) -> Self {
        Self {
            strategies: config.line_strategies.clone(),
            marker: config.grid_marker.clone(),
            ink_threshold: config.ink_threshold,
            canny_low: config.canny_low,
            canny_high: config.canny_high,
            hough_vote_fraction: config.hough_vote_fraction,
            hough_suppression_radius: config.hough_suppression_radius,
            axis_tolerance_degrees: config.axis_tolerance_degrees,
            hough_max_gap: config.hough_max_gap,
            line_span_fraction: config.line_span_fraction,
            marker_line_fraction: config.marker_line_fraction,
            distinct_line_gap: config.merge_tolerance,
        }
    }
}

impl Default for Stage02Config {
    #[inline]
    fn default() -> Self {
        Self::from(&GridConfig::default())
    }
}

/// Raw separator positions for both axes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridLines {
    pub horizontal: LineGroup,
    pub vertical: LineGroup,
    /// Strategy that produced these lines
    pub strategy: LineStrategy,
    /// True when no strategy met the two-lines-per-axis bar
    pub degraded: bool,
}

impl GridLines {
    fn empty(strategy: LineStrategy) -> Self {
        Self {
            horizontal: LineGroup::empty(Orientation::Horizontal),
            vertical: LineGroup::empty(Orientation::Vertical),
            strategy,
            degraded: true,
        }
    }
}

/// Number of clusters in `positions` when values within `gap` are chained
fn distinct_lines(positions: &[u32], gap: u32) -> usize {
    let mut sorted = positions.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.is_empty() {
        return 0;
    }
    1 + sorted.windows(2).filter(|w| w[1] - w[0] > gap).count()
}

/// Stage 2: Grid Line Detector
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stage02GridLineDetector {
    config: Stage02Config,
}

impl Stage02GridLineDetector {
    #[inline]
    #[must_use = "grid line detector stage is created but not used"]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use = "grid line detector stage is created but not used"]
    pub const fn with_config(config: Stage02Config) -> Self {
        Self { config }
    }

    /// Detect separators, trying strategies in order
    #[must_use = "returns the detected grid lines"]
    pub fn detect(&self, table: &RgbImage) -> GridLines {
        let first = self
            .config
            .strategies
            .first()
            .copied()
            .unwrap_or(LineStrategy::EdgeHough);
        if table.width() < 3 || table.height() < 3 {
            return GridLines::empty(first);
        }

        let gray = to_gray(table);
        let mut best: Option<(usize, GridLines)> = None;

        for &strategy in &self.config.strategies {
            let (horizontal, vertical) = self.run_strategy(strategy, table, &gray);
            let h_lines = distinct_lines(&horizontal, self.config.distinct_line_gap);
            let v_lines = distinct_lines(&vertical, self.config.distinct_line_gap);
            log::debug!(
                "Line strategy {}: {} horizontal, {} vertical",
                strategy.as_str(),
                h_lines,
                v_lines
            );

            let lines = GridLines {
                horizontal: LineGroup::raw(Orientation::Horizontal, horizontal),
                vertical: LineGroup::raw(Orientation::Vertical, vertical),
                strategy,
                degraded: false,
            };
            if h_lines >= 2 && v_lines >= 2 {
                return lines;
            }
            let total = h_lines + v_lines;
            if best.as_ref().map_or(true, |(t, _)| total > *t) {
                best = Some((total, lines));
            }
        }

        let mut lines = best.map_or_else(|| GridLines::empty(first), |(_, lines)| lines);
        lines.degraded = true;
        log::warn!(
            "No line strategy found 2+ lines on both axes; using {} result",
            lines.strategy.as_str()
        );
        lines
    }

    /// Run one strategy, returning raw (horizontal, vertical) positions
    #[must_use = "returns raw line positions"]
    pub fn run_strategy(
        &self,
        strategy: LineStrategy,
        table: &RgbImage,
        gray: &GrayImage,
    ) -> (Vec<u32>, Vec<u32>) {
        match strategy {
            LineStrategy::EdgeHough => self.detect_edge_hough(gray),
            LineStrategy::MarkerScan => self.scan_mask(&marker_mask(table, &self.config.marker)),
            LineStrategy::InkScan => self.scan_mask(&ink_mask(gray, self.config.ink_threshold)),
        }
    }

    /// Rows and columns whose foreground fraction exceeds `marker_line_fraction`
    fn scan_mask(&self, mask: &GrayImage) -> (Vec<u32>, Vec<u32>) {
        let (width, height) = mask.dimensions();
        let threshold = self.config.marker_line_fraction;

        let mut row_counts = vec![0u32; height as usize];
        let mut col_counts = vec![0u32; width as usize];
        for (x, y, p) in mask.enumerate_pixels() {
            if p.0[0] > 0 {
                row_counts[y as usize] += 1;
                col_counts[x as usize] += 1;
            }
        }

        let horizontal = row_counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c as f32 / width as f32 > threshold)
            .map(|(y, _)| y as u32)
            .collect();
        let vertical = col_counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c as f32 / height as f32 > threshold)
            .map(|(x, _)| x as u32)
            .collect();
        (horizontal, vertical)
    }

    fn detect_edge_hough(&self, gray: &GrayImage) -> (Vec<u32>, Vec<u32>) {
        let (width, height) = gray.dimensions();
        let edges = canny(gray, self.config.canny_low, self.config.canny_high);

        let vote_threshold =
            ((width.min(height) as f32 * self.config.hough_vote_fraction) as u32).max(10);
        let options = LineDetectionOptions {
            vote_threshold,
            suppression_radius: self.config.hough_suppression_radius,
        };
        let candidates: Vec<PolarLine> = detect_lines(&edges, options);
        let (along_x, along_y) = split_by_direction(gray, &edges);

        let mut horizontal = Vec::new();
        let mut vertical = Vec::new();
        for line in &candidates {
            match self.axis_of(line) {
                Some(Orientation::Horizontal) => {
                    if let Some(y) = self.measure_horizontal(&along_x, line) {
                        horizontal.push(y);
                    }
                }
                Some(Orientation::Vertical) => {
                    if let Some(x) = self.measure_vertical(&along_y, line) {
                        vertical.push(x);
                    }
                }
                None => {}
            }
        }
        log::trace!(
            "Hough: {} candidates (votes >= {}), kept {} horizontal / {} vertical",
            candidates.len(),
            vote_threshold,
            horizontal.len(),
            vertical.len()
        );
        (horizontal, vertical)
    }

    /// Axis of a Hough line, if within tolerance of one
    ///
    /// `angle_in_degrees` is the angle of the line's normal: 90 means a
    /// horizontal line, 0 (or close to 180) a vertical one.
    fn axis_of(&self, line: &PolarLine) -> Option<Orientation> {
        let tol = self.config.axis_tolerance_degrees;
        let angle = line.angle_in_degrees;
        if angle.abs_diff(90) <= tol {
            Some(Orientation::Horizontal)
        } else if angle <= tol || angle >= 180 - tol {
            Some(Orientation::Vertical)
        } else {
            None
        }
    }

    /// Longest edge-supported run along a near-horizontal line; returns its y at mid-span
    fn measure_horizontal(&self, edges: &GrayImage, line: &PolarLine) -> Option<u32> {
        let (width, height) = edges.dimensions();
        let theta = (line.angle_in_degrees as f32).to_radians();
        let (sin, cos) = theta.sin_cos();
        let y_at = |x: u32| (line.r - x as f32 * cos) / sin;

        let support = (0..width).map(|x| has_edge_near(edges, x as i64, y_at(x).round() as i64));
        let run = longest_run(support, self.config.hough_max_gap);
        if (run as f32) < self.config.line_span_fraction * width as f32 {
            return None;
        }

        let y = y_at(width / 2).round();
        (y >= 0.0 && y < height as f32).then_some(y as u32)
    }

    /// Longest edge-supported run along a near-vertical line; returns its x at mid-span
    fn measure_vertical(&self, edges: &GrayImage, line: &PolarLine) -> Option<u32> {
        let (width, height) = edges.dimensions();
        let theta = (line.angle_in_degrees as f32).to_radians();
        let (sin, cos) = theta.sin_cos();
        let x_at = |y: u32| (line.r - y as f32 * sin) / cos;

        let support = (0..height).map(|y| has_edge_near(edges, x_at(y).round() as i64, y as i64));
        let run = longest_run(support, self.config.hough_max_gap);
        if (run as f32) < self.config.line_span_fraction * height as f32 {
            return None;
        }

        let x = x_at(height / 2).round();
        (x >= 0.0 && x < width as f32).then_some(x as u32)
    }
}

/// Split an edge map into edges running along x and edges running along y
///
/// Direction comes from the Sobel gradient of the image blurred the way
/// `canny` blurs it. Pixels with equal gradient components go to neither map.
fn split_by_direction(gray: &GrayImage, edges: &GrayImage) -> (GrayImage, GrayImage) {
    let blurred = gaussian_blur_f32(gray, CANNY_SIGMA);
    let gx = horizontal_sobel(&blurred);
    let gy = vertical_sobel(&blurred);

    let (width, height) = edges.dimensions();
    let mut along_x = GrayImage::new(width, height);
    let mut along_y = GrayImage::new(width, height);
    for (x, y, p) in edges.enumerate_pixels() {
        if p.0[0] == 0 {
            continue;
        }
        let dx = gx.get_pixel(x, y).0[0].unsigned_abs();
        let dy = gy.get_pixel(x, y).0[0].unsigned_abs();
        if dy > dx {
            along_x.put_pixel(x, y, Luma([255]));
        } else if dx > dy {
            along_y.put_pixel(x, y, Luma([255]));
        }
    }
    (along_x, along_y)
}

/// Edge pixel at `(x, y)` or one pixel either side of it (both axes)
fn has_edge_near(edges: &GrayImage, x: i64, y: i64) -> bool {
    let (width, height) = edges.dimensions();
    (-1..=1).any(|dy| {
        (-1..=1).any(|dx| {
            let (px, py) = (x + dx, y + dy);
            px >= 0
                && py >= 0
                && px < i64::from(width)
                && py < i64::from(height)
                && edges.get_pixel(px as u32, py as u32).0[0] > 0
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut};
    use imageproc::rect::Rect;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    /// 2px grid lines at the given positions spanning the full image
    fn grid_image(width: u32, height: u32, rows: &[u32], cols: &[u32], color: Rgb<u8>) -> RgbImage {
        let mut img = RgbImage::from_pixel(width, height, WHITE);
        for &y in rows {
            draw_filled_rect_mut(&mut img, Rect::at(0, y as i32).of_size(width, 2), color);
        }
        for &x in cols {
            draw_filled_rect_mut(&mut img, Rect::at(x as i32, 0).of_size(2, height), color);
        }
        img
    }

    fn near(found: &[u32], expected: u32, tol: u32) -> bool {
        found.iter().any(|&p| p.abs_diff(expected) <= tol)
    }

    fn only(strategy: LineStrategy) -> Stage02GridLineDetector {
        Stage02GridLineDetector::with_config(Stage02Config {
            strategies: vec![strategy],
            ..Default::default()
        })
    }

    #[test]
    fn test_distinct_lines_chains_close_positions() {
        assert_eq!(distinct_lines(&[], 10), 0);
        assert_eq!(distinct_lines(&[5, 6, 7, 100, 101], 10), 2);
        assert_eq!(distinct_lines(&[0, 8, 16, 24], 10), 1);
    }

    #[test]
    fn test_ink_scan_finds_thick_lines() {
        let img = grid_image(300, 200, &[10, 100, 190], &[20, 150, 280], BLACK);
        let lines = only(LineStrategy::InkScan).detect(&img);

        assert_eq!(lines.strategy, LineStrategy::InkScan);
        assert!(!lines.degraded);
        assert_eq!(lines.horizontal.positions, vec![10, 11, 100, 101, 190, 191]);
        assert_eq!(lines.vertical.positions, vec![20, 21, 150, 151, 280, 281]);
    }

    #[test]
    fn test_marker_scan_ignores_black_lines() {
        let mut img = grid_image(300, 200, &[50], &[], BLACK);
        for y in [10u32, 120] {
            draw_filled_rect_mut(&mut img, Rect::at(0, y as i32).of_size(300, 3), Rgb([0, 255, 0]));
        }
        for x in [5u32, 200] {
            draw_filled_rect_mut(&mut img, Rect::at(x as i32, 0).of_size(3, 200), Rgb([0, 255, 0]));
        }
        let lines = only(LineStrategy::MarkerScan).detect(&img);
        assert!(near(&lines.horizontal.positions, 10, 0));
        assert!(near(&lines.horizontal.positions, 120, 0));
        assert!(!near(&lines.horizontal.positions, 50, 1));
        assert!(near(&lines.vertical.positions, 200, 0));
    }

    #[test]
    fn test_scan_rejects_partial_lines() {
        // 30% coverage is below the 40% bar
        let mut img = RgbImage::from_pixel(200, 100, WHITE);
        draw_filled_rect_mut(&mut img, Rect::at(0, 40).of_size(60, 2), BLACK);
        let (h, v) = only(LineStrategy::InkScan).run_strategy(
            LineStrategy::InkScan,
            &img,
            &to_gray(&img),
        );
        assert!(h.is_empty());
        assert!(v.is_empty());
    }

    #[test]
    fn test_edge_hough_finds_full_span_lines() {
        let img = grid_image(400, 300, &[2, 150, 296], &[2, 200, 396], BLACK);
        let lines = only(LineStrategy::EdgeHough).detect(&img);

        assert_eq!(lines.strategy, LineStrategy::EdgeHough);
        for y in [2, 150, 296] {
            assert!(near(&lines.horizontal.positions, y, 3), "missing row {y}: {lines:?}");
        }
        for x in [2, 200, 396] {
            assert!(near(&lines.vertical.positions, x, 3), "missing column {x}: {lines:?}");
        }
    }

    #[test]
    fn test_edge_hough_rejects_cell_internal_strokes() {
        let mut img = grid_image(400, 300, &[2, 296], &[2, 396], BLACK);
        // A long stroke inside the table that stops well short of the borders
        draw_filled_rect_mut(&mut img, Rect::at(60, 140).of_size(200, 2), BLACK);
        draw_line_segment_mut(&mut img, (50.0, 50.0), (300.0, 250.0), BLACK);

        let (h, _) = only(LineStrategy::EdgeHough).run_strategy(
            LineStrategy::EdgeHough,
            &img,
            &to_gray(&img),
        );
        assert!(!near(&h, 140, 4), "internal stroke accepted: {h:?}");
    }

    #[test]
    fn test_edge_hough_ignores_content_block_edges() {
        // Gray blocks 15px inside every cell, like printed text
        let rows = [2, 150, 296];
        let cols = [2, 200, 396];
        let mut img = grid_image(400, 300, &rows, &cols, BLACK);
        for band in rows.windows(2) {
            for span in cols.windows(2) {
                let block = Rect::at(span[0] as i32 + 17, band[0] as i32 + 17)
                    .of_size(span[1] - span[0] - 32, band[1] - band[0] - 32);
                draw_filled_rect_mut(&mut img, block, Rgb([180, 180, 180]));
            }
        }

        let (h, v) = only(LineStrategy::EdgeHough).run_strategy(
            LineStrategy::EdgeHough,
            &img,
            &to_gray(&img),
        );
        let on_ruling = |p: u32, lines: &[u32]| lines.iter().any(|&l| p.abs_diff(l) <= 3);
        assert!(h.iter().all(|&y| on_ruling(y, &rows)), "block edge accepted: {h:?}");
        assert!(v.iter().all(|&x| on_ruling(x, &cols)), "block edge accepted: {v:?}");
        for y in rows {
            assert!(near(&h, y, 3), "missing row {y}: {h:?}");
        }
        for x in cols {
            assert!(near(&v, x, 3), "missing column {x}: {v:?}");
        }
    }

    #[test]
    fn test_falls_back_to_next_strategy() {
        let img = grid_image(300, 200, &[10, 100, 190], &[20, 280], BLACK);
        let detector = Stage02GridLineDetector::with_config(Stage02Config {
            strategies: vec![LineStrategy::MarkerScan, LineStrategy::InkScan],
            ..Default::default()
        });
        let lines = detector.detect(&img);
        assert_eq!(lines.strategy, LineStrategy::InkScan);
        assert!(!lines.degraded);
    }

    #[test]
    fn test_degraded_when_nothing_qualifies() {
        let img = grid_image(300, 200, &[100], &[], BLACK);
        let detector = Stage02GridLineDetector::with_config(Stage02Config {
            strategies: vec![LineStrategy::MarkerScan, LineStrategy::InkScan],
            ..Default::default()
        });
        let lines = detector.detect(&img);
        assert!(lines.degraded);
        assert_eq!(lines.strategy, LineStrategy::InkScan);
        assert_eq!(lines.horizontal.positions, vec![100, 101]);
    }

    #[test]
    fn test_tiny_image_is_empty() {
        let img = RgbImage::from_pixel(2, 2, WHITE);
        let lines = Stage02GridLineDetector::new().detect(&img);
        assert!(lines.degraded);
        assert!(lines.horizontal.is_empty());
    }
}
