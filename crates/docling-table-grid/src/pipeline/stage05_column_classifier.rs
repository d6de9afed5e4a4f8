//! Stage 5: Drawing Column Classification
//!
//! Scores every column by how much its data cells look like freeform line-art
//! and picks the best one.
//!
//! Per sampled cell (inset to keep grid lines out):
//! - darkness: `1 - mean / 255`
//! - texture: intensity standard deviation, saturating at 64
//! - edges: Canny edge-pixel ratio, saturating at 10%
//! - shapes: bonus when the cell holds two or more disjoint ink shapes
//! - flat fills (variance below `flat_variance`) are penalized
//!
//! Cells whose mean intensity is above `empty_intensity` are blank and skipped.
//! Ties within `tie_margin` go to the wider column. When no column has any
//! non-blank sample, the widest sufficiently wide column is returned and
//! tagged estimated.

// Pixel statistics: conversions are bounded by image size.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use crate::config::{ColumnScoreWeights, GridConfig};
use crate::error::{GridError, Result};
use crate::geometry::{BoundingBox, GeometrySource, LineGroup};
use crate::raster::{count_shapes, crop_gray, region_stats, to_gray};
use image::RgbImage;
use imageproc::edges::canny;
use serde::{Deserialize, Serialize};

/// Standard deviation at which the texture term saturates
const STD_DEV_SCALE: f64 = 64.0;

/// Edge ratio at which the edge term saturates
const EDGE_RATIO_SCALE: f64 = 0.1;

/// Smallest shape extent counted by the contour bonus
const MIN_SHAPE_EXTENT: u32 = 3;

/// Configuration for Stage 5 (Column Classification)
#[derive(Debug, Clone, PartialEq)]
pub struct Stage05Config {
    pub sample_rows: usize,
    pub sample_inset_fraction: f32,
    pub min_column_width: u32,
    pub tie_margin: f64,
    pub weights: ColumnScoreWeights,
    pub empty_intensity: u8,
    pub ink_threshold: u8,
    pub canny_low: f32,
    pub canny_high: f32,
}

impl From<&GridConfig> for Stage05Config {
    fn from(config: &GridConfig) -> Self {
        Self {
            sample_rows: config.column_sample_rows,
            sample_inset_fraction: config.sample_inset_fraction,
            min_column_width: config.min_column_width,
            tie_margin: config.tie_margin,
            weights: config.score_weights,
            empty_intensity: config.empty_intensity,
            ink_threshold: config.ink_threshold,
            canny_low: config.canny_low,
            canny_high: config.canny_high,
        }
    }
}

impl Default for Stage05Config {
    #[inline]
    fn default() -> Self {
        Self::from(&GridConfig::default())
    }
}

/// Drawing-likelihood score of one column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnScore {
    /// 0-based column index (left to right)
    pub column_index: usize,
    /// Column band spanning the sampled rows
    pub bounds: BoundingBox,
    /// Mean score over non-blank samples; `None` when every sample was blank
    pub score: Option<f64>,
    /// Number of non-blank samples that contributed
    pub samples: usize,
}

/// The chosen drawing column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSelection {
    pub index: usize,
    pub bounds: BoundingBox,
    pub source: GeometrySource,
    pub scores: Vec<ColumnScore>,
}

/// Stage 5: Column Classifier
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stage05ColumnClassifier {
    config: Stage05Config,
}

impl Stage05ColumnClassifier {
    #[inline]
    #[must_use = "column classifier stage is created but not used"]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use = "column classifier stage is created but not used"]
    pub const fn with_config(config: Stage05Config) -> Self {
        Self { config }
    }

    /// Pick the drawing column
    ///
    /// `header_y` excludes the header row from sampling: only row bands whose
    /// center lies below it are data rows. Without a header every band is
    /// sampled.
    ///
    /// # Errors
    ///
    /// `ColumnNotFound` when no column has a non-blank sample and none is at
    /// least `min_column_width` wide.
    pub fn classify(
        &self,
        image: &RgbImage,
        columns: &LineGroup,
        rows: &LineGroup,
        header_y: Option<u32>,
    ) -> Result<ColumnSelection> {
        let column_bands: Vec<(u32, u32)> = columns.bands().collect();
        if column_bands.is_empty() {
            return Err(GridError::ColumnNotFound {
                reason: format!("{} column line(s), no column bands", columns.len()),
            });
        }

        let data_rows: Vec<(u32, u32)> = rows
            .bands()
            .filter(|&(top, bottom)| header_y.map_or(true, |h| (top + bottom) / 2 > h))
            .collect();
        let sampled = spread_sample(&data_rows, self.config.sample_rows);
        let (row_top, row_bottom) = match (sampled.first(), sampled.last()) {
            (Some(first), Some(last)) => (first.0, last.1),
            _ => (rows.first().unwrap_or(0), rows.last().unwrap_or(image.height())),
        };

        let gray = to_gray(image);
        let edges = canny(&gray, self.config.canny_low, self.config.canny_high);

        let scores: Vec<ColumnScore> = column_bands
            .iter()
            .enumerate()
            .map(|(column_index, &(left, right))| {
                let mut total = 0.0;
                let mut samples = 0;
                for &(top, bottom) in &sampled {
                    let Some(cell) = self.sample_box(left, top, right, bottom, image) else {
                        continue;
                    };
                    let stats = region_stats(&gray, &edges, &cell);
                    if stats.mean > f64::from(self.config.empty_intensity) {
                        continue;
                    }
                    let shapes = count_shapes(
                        &crop_gray(&gray, &cell),
                        self.config.ink_threshold,
                        MIN_SHAPE_EXTENT,
                    );
                    total += self.sample_score(stats.mean, stats.variance, stats.edge_ratio, shapes);
                    samples += 1;
                }
                let bounds = BoundingBox {
                    x: left,
                    y: row_top,
                    width: right.saturating_sub(left).max(1),
                    height: row_bottom.saturating_sub(row_top).max(1),
                };
                ColumnScore {
                    column_index,
                    bounds,
                    score: (samples > 0).then(|| total / samples as f64),
                    samples,
                }
            })
            .collect();

        for s in &scores {
            log::debug!(
                "Column {} x={}..{}: score {:?} over {} sample(s)",
                s.column_index,
                s.bounds.x,
                s.bounds.right(),
                s.score,
                s.samples
            );
        }

        self.select(scores)
    }

    /// Combine one sample's statistics into a score
    #[must_use]
    pub fn sample_score(&self, mean: f64, variance: f64, edge_ratio: f64, shapes: usize) -> f64 {
        let w = &self.config.weights;
        let mut score = w.ink_weight * (1.0 - mean / 255.0)
            + w.variance_weight * (variance.sqrt() / STD_DEV_SCALE).min(1.0)
            + w.edge_weight * (edge_ratio / EDGE_RATIO_SCALE).min(1.0);
        if shapes >= 2 {
            score += w.contour_bonus;
        }
        if variance < w.flat_variance {
            score -= w.flat_penalty;
        }
        score
    }

    fn sample_box(
        &self,
        left: u32,
        top: u32,
        right: u32,
        bottom: u32,
        image: &RgbImage,
    ) -> Option<BoundingBox> {
        let cell = BoundingBox::from_edges(left, top, right, bottom)?;
        let inset = self.config.sample_inset_fraction;
        cell.inset_xy(
            (cell.width as f32 * inset) as u32,
            (cell.height as f32 * inset) as u32,
        )?
        .clamp_to(image.width(), image.height())
    }

    fn select(&self, scores: Vec<ColumnScore>) -> Result<ColumnSelection> {
        let only_column = scores.len() == 1;
        let eligible = |s: &&ColumnScore| only_column || s.bounds.width >= self.config.min_column_width;

        let best = scores
            .iter()
            .filter(eligible)
            .filter_map(|s| s.score.map(|v| (s, v)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((_, best_score)) = best {
            // Among near-ties prefer the widest column
            let chosen = scores
                .iter()
                .filter(eligible)
                .filter(|s| s.score.is_some_and(|v| best_score - v < self.config.tie_margin))
                .max_by_key(|s| (s.bounds.width, std::cmp::Reverse(s.column_index)));
            if let Some(chosen) = chosen {
                log::info!(
                    "Drawing column {} (x={}..{}, score {:.3})",
                    chosen.column_index,
                    chosen.bounds.x,
                    chosen.bounds.right(),
                    chosen.score.unwrap_or(best_score)
                );
                return Ok(ColumnSelection {
                    index: chosen.column_index,
                    bounds: chosen.bounds,
                    source: GeometrySource::Detected,
                    scores,
                });
            }
        }

        let widest = scores
            .iter()
            .filter(|s| s.bounds.width >= self.config.min_column_width)
            .max_by_key(|s| (s.bounds.width, std::cmp::Reverse(s.column_index)));
        match widest {
            Some(widest) => {
                log::warn!(
                    "No column has non-blank samples; falling back to widest column {}",
                    widest.column_index
                );
                Ok(ColumnSelection {
                    index: widest.column_index,
                    bounds: widest.bounds,
                    source: GeometrySource::Estimated,
                    scores,
                })
            }
            None => Err(GridError::ColumnNotFound {
                reason: format!(
                    "{} column(s), none with content and none at least {}px wide",
                    scores.len(),
                    self.config.min_column_width
                ),
            }),
        }
    }
}

/// Up to `n` items spread evenly across `items`, first and last included
fn spread_sample<T: Copy>(items: &[T], n: usize) -> Vec<T> {
    if items.len() <= n {
        return items.to_vec();
    }
    if n <= 1 {
        return items.first().copied().into_iter().collect();
    }
    (0..n)
        .map(|i| items[i * (items.len() - 1) / (n - 1)])
        .collect()
}
