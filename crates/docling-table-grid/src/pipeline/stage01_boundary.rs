//! Stage 1: Table Boundary Detection
//!
//! Locates the single outer table rectangle on a page.
//!
//! Algorithm (per strategy):
//! 1. Build a binary mask (boundary marker color, or dark ink)
//! 2. Close (bridge gaps), then open marker masks (remove speckle)
//! 3. Extract outer contours
//! 4. Approximate each contour to a polygon; keep those with >= 4 vertices
//! 5. Pick the largest by bounding-box area
//! 6. Pad and clamp to the page
//!
//! Strategies are tried in configuration order and the first hit wins.
//! Failing every strategy is terminal for the page.

use crate::config::{BoundaryStrategy, GridConfig, MarkerColor};
use crate::error::{GridError, Result};
use crate::geometry::BoundingBox;
use crate::raster::{contour_bounds, ink_mask, marker_mask, outer_contours, to_gray};
use image::{GrayImage, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::morphology::{close, open};

/// Configuration for Stage 1 (Boundary Detection)
#[derive(Debug, Clone, PartialEq)]
pub struct Stage01Config {
    pub strategies: Vec<BoundaryStrategy>,
    pub marker: MarkerColor,
    pub ink_threshold: u8,
    pub close_radius: u8,
    pub open_radius: u8,
    pub polygon_epsilon_fraction: f64,
    pub padding: u32,
    pub min_table_area_fraction: f64,
}

impl From<&GridConfig> for Stage01Config {
    fn from(config: &GridConfig) -> Self {
        Self {
            strategies: config.boundary_strategies.clone(),
            marker: config.boundary_marker.clone(),
            ink_threshold: config.ink_threshold,
            close_radius: config.close_radius,
            open_radius: config.open_radius,
            polygon_epsilon_fraction: config.polygon_epsilon_fraction,
            padding: config.boundary_padding,
            min_table_area_fraction: config.min_table_area_fraction,
        }
    }
}

impl Default for Stage01Config {
    #[inline]
    fn default() -> Self {
        Self::from(&GridConfig::default())
    }
}

/// Outer table rectangle found on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryDetection {
    /// Detected rectangle, padded and clamped to the page
    pub bounds: BoundingBox,
    /// Detected rectangle before padding
    pub table: BoundingBox,
    /// Strategy that found it
    pub strategy: BoundaryStrategy,
    /// Vertex count of the approximated polygon
    pub vertices: usize,
}

/// Stage 1: Boundary Detector
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stage01BoundaryDetector {
    config: Stage01Config,
}

impl Stage01BoundaryDetector {
    #[inline]
    #[must_use = "boundary detector stage is created but not used"]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use = "boundary detector stage is created but not used"]
    pub const fn with_config(config: Stage01Config) -> Self {
        Self { config }
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &Stage01Config {
        &self.config
    }

    /// Find the outer table rectangle
    ///
    /// # Errors
    ///
    /// `BoundaryNotFound` when no strategy yields a rectangular contour.
    pub fn detect(&self, page: &RgbImage) -> Result<BoundaryDetection> {
        let (width, height) = page.dimensions();
        let mut tried = Vec::with_capacity(self.config.strategies.len());

        for &strategy in &self.config.strategies {
            let (mask, min_area) = match strategy {
                BoundaryStrategy::MarkerColor => {
                    let mask = marker_mask(page, &self.config.marker);
                    (self.despeckle(&mask, true), 1)
                }
                BoundaryStrategy::InkContour => {
                    let mask = ink_mask(&to_gray(page), self.config.ink_threshold);
                    let page_area = f64::from(width) * f64::from(height);
                    // Ruling lines are often thinner than the opening kernel: close only
                    (
                        self.despeckle(&mask, false),
                        (page_area * self.config.min_table_area_fraction) as u64,
                    )
                }
            };

            match self.largest_rectangle(&mask, min_area) {
                Some((table, vertices)) => {
                    let bounds = table.pad(self.config.padding, width, height);
                    log::debug!(
                        "Boundary found via {}: table={:?} padded={:?} vertices={}",
                        strategy.as_str(),
                        table,
                        bounds,
                        vertices
                    );
                    return Ok(BoundaryDetection {
                        bounds,
                        table,
                        strategy,
                        vertices,
                    });
                }
                None => {
                    log::debug!("Boundary strategy {} found nothing", strategy.as_str());
                    tried.push(strategy.as_str());
                }
            }
        }

        Err(GridError::BoundaryNotFound {
            page_id: None,
            reason: format!(
                "no rectangular contour on {width}x{height} page (tried: {})",
                tried.join(", ")
            ),
        })
    }

    fn despeckle(&self, mask: &GrayImage, open_after: bool) -> GrayImage {
        let mut cleaned = if self.config.close_radius > 0 {
            close(mask, Norm::LInf, self.config.close_radius)
        } else {
            mask.clone()
        };
        if open_after && self.config.open_radius > 0 {
            cleaned = open(&cleaned, Norm::LInf, self.config.open_radius);
        }
        cleaned
    }

    /// Largest outer contour approximating a polygon with >= 4 vertices
    fn largest_rectangle(&self, mask: &GrayImage, min_area: u64) -> Option<(BoundingBox, usize)> {
        outer_contours(mask)
            .iter()
            .filter(|points| points.len() >= 4)
            .filter_map(|points| {
                let bounds = contour_bounds(points)?;
                if bounds.area() < min_area.max(1) {
                    return None;
                }
                let epsilon = self.config.polygon_epsilon_fraction * arc_length(points, true);
                let polygon = approximate_polygon_dp(points, epsilon, true);
                (polygon.len() >= 4).then_some((bounds, polygon.len()))
            })
            .max_by_key(|(bounds, _)| bounds.area())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
    use imageproc::rect::Rect;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    const RED: Rgb<u8> = Rgb([255, 0, 0]);

    fn framed_page(rect: Rect, thickness: u32, color: Rgb<u8>) -> RgbImage {
        let mut page = RgbImage::from_pixel(400, 300, WHITE);
        for t in 0..thickness {
            let inner = Rect::at(rect.left() + t as i32, rect.top() + t as i32)
                .of_size(rect.width() - 2 * t, rect.height() - 2 * t);
            draw_hollow_rect_mut(&mut page, inner, color);
        }
        page
    }

    #[test]
    fn test_marker_rectangle_found_and_padded() {
        let page = framed_page(Rect::at(40, 30).of_size(300, 200), 4, RED);
        let detection = Stage01BoundaryDetector::new().detect(&page).unwrap();

        assert_eq!(detection.strategy, BoundaryStrategy::MarkerColor);
        assert_eq!(detection.table, BoundingBox::new(40, 30, 300, 200).unwrap());
        assert_eq!(detection.bounds, BoundingBox::new(37, 27, 306, 206).unwrap());
        assert!(detection.vertices >= 4);
    }

    #[test]
    fn test_speckle_is_ignored() {
        let mut page = framed_page(Rect::at(40, 30).of_size(300, 200), 4, RED);
        page.put_pixel(10, 10, RED);
        page.put_pixel(380, 280, RED);
        let detection = Stage01BoundaryDetector::new().detect(&page).unwrap();
        assert_eq!(detection.table, BoundingBox::new(40, 30, 300, 200).unwrap());
    }

    #[test]
    fn test_largest_of_two_rectangles_wins() {
        let mut page = framed_page(Rect::at(150, 100).of_size(220, 180), 4, RED);
        for t in 0..4 {
            draw_hollow_rect_mut(
                &mut page,
                Rect::at(10 + t, 10 + t).of_size(60 - 2 * t as u32, 40 - 2 * t as u32),
                RED,
            );
        }
        let detection = Stage01BoundaryDetector::new().detect(&page).unwrap();
        assert_eq!(detection.table, BoundingBox::new(150, 100, 220, 180).unwrap());
    }

    #[test]
    fn test_ink_contour_fallback_on_plain_table() {
        let page = framed_page(Rect::at(50, 40).of_size(280, 200), 2, Rgb([0, 0, 0]));
        let detection = Stage01BoundaryDetector::new().detect(&page).unwrap();
        assert_eq!(detection.strategy, BoundaryStrategy::InkContour);
        assert_eq!(detection.table, BoundingBox::new(50, 40, 280, 200).unwrap());
    }

    #[test]
    fn test_ink_contour_ignores_small_marks() {
        let mut page = RgbImage::from_pixel(400, 300, WHITE);
        draw_filled_rect_mut(&mut page, Rect::at(20, 20).of_size(15, 10), Rgb([0, 0, 0]));
        let err = Stage01BoundaryDetector::new().detect(&page).unwrap_err();
        assert!(matches!(err, GridError::BoundaryNotFound { .. }));
    }

    #[test]
    fn test_blank_page_is_not_found() {
        let page = RgbImage::from_pixel(120, 80, WHITE);
        let err = Stage01BoundaryDetector::new().detect(&page).unwrap_err();
        assert!(err.to_string().contains("marker_color"));
        assert!(err.to_string().contains("ink_contour"));
    }

    #[test]
    fn test_padding_clamps_at_page_edge() {
        let page = framed_page(Rect::at(0, 0).of_size(400, 300), 4, RED);
        let detection = Stage01BoundaryDetector::new().detect(&page).unwrap();
        assert_eq!(detection.strategy, BoundaryStrategy::MarkerColor);
        assert_eq!(detection.table, BoundingBox::new(0, 0, 400, 300).unwrap());
        assert_eq!(detection.bounds, BoundingBox::new(0, 0, 400, 300).unwrap());
    }

    #[test]
    fn test_ink_frame_touching_left_edge() {
        let page = framed_page(Rect::at(0, 20).of_size(300, 200), 2, Rgb([0, 0, 0]));
        let detection = Stage01BoundaryDetector::new().detect(&page).unwrap();
        assert_eq!(detection.strategy, BoundaryStrategy::InkContour);
        assert_eq!(detection.table, BoundingBox::new(0, 20, 300, 200).unwrap());
        assert_eq!(detection.bounds, BoundingBox::new(0, 17, 303, 206).unwrap());
    }
}
