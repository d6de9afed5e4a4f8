//! Stage 3: Line Segmentation
//!
//! Turns a raw `LineGroup` into resolved separators.
//!
//! 1. Sort, then chain positions closer than `merge_tolerance` into groups and
//!    keep the first (topmost/leftmost) of each group
//! 2. Noise filter: gaps below `noise_fraction` of the mean gap are merged away,
//!    repeated until nothing changes. The first and last lines always survive.
//!
//! The same segmenter resolves rows and columns. Output is a fixed point:
//! segmenting an already resolved group returns it unchanged.

// Gaps are bounded by image size, far below f32 precision limits.
#![allow(clippy::cast_precision_loss)]

use crate::config::GridConfig;
use crate::error::{GridError, Result};
use crate::geometry::LineGroup;

/// Configuration for Stage 3 (Line Segmentation)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage03Config {
    pub merge_tolerance: u32,
    pub noise_fraction: f32,
}

impl From<&GridConfig> for Stage03Config {
    fn from(config: &GridConfig) -> Self {
        Self {
            merge_tolerance: config.merge_tolerance,
            noise_fraction: config.row_noise_fraction,
        }
    }
}

impl Default for Stage03Config {
    #[inline]
    fn default() -> Self {
        Self::from(&GridConfig::default())
    }
}

/// Stage 3: Row (and column) Segmenter
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stage03RowSegmenter {
    config: Stage03Config,
}

impl Stage03RowSegmenter {
    #[inline]
    #[must_use = "segmenter stage is created but not used"]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use = "segmenter stage is created but not used"]
    pub const fn with_config(config: Stage03Config) -> Self {
        Self { config }
    }

    /// Resolve raw positions into separators
    ///
    /// # Errors
    ///
    /// `GridLinesInsufficient` when fewer than two lines survive.
    pub fn segment(&self, raw: &LineGroup) -> Result<LineGroup> {
        let merged = merge_close(&raw.positions, self.config.merge_tolerance);
        let resolved = drop_noise(merged, self.config.noise_fraction);

        log::debug!(
            "Segmented {} {} positions into {} lines",
            raw.len(),
            raw.orientation.as_str(),
            resolved.len()
        );

        if resolved.len() < 2 {
            return Err(GridError::GridLinesInsufficient {
                axis: raw.orientation.as_str(),
                found: resolved.len(),
            });
        }
        Ok(LineGroup::raw(raw.orientation, resolved))
    }
}

/// Sort and chain-merge positions within `tolerance`, keeping each chain's first
fn merge_close(positions: &[u32], tolerance: u32) -> Vec<u32> {
    let mut sorted = positions.to_vec();
    sorted.sort_unstable();

    let mut merged: Vec<u32> = Vec::with_capacity(sorted.len());
    let mut chain_end = None;
    for p in sorted {
        match chain_end {
            Some(end) if p - end <= tolerance => {}
            _ => merged.push(p),
        }
        chain_end = Some(p);
    }
    merged
}

/// Merge away gaps narrower than `fraction` of the mean gap, to a fixed point
fn drop_noise(mut lines: Vec<u32>, fraction: f32) -> Vec<u32> {
    while lines.len() >= 3 {
        let (first, last) = (lines[0], lines[lines.len() - 1]);
        let mean_gap = (last - first) as f32 / (lines.len() - 1) as f32;
        let threshold = mean_gap * fraction;

        let mut kept = vec![first];
        for &p in &lines[1..lines.len() - 1] {
            if let Some(&prev) = kept.last() {
                if (p - prev) as f32 >= threshold {
                    kept.push(p);
                }
            }
        }
        // The last line wins over an interior line crowding it
        if let Some(&prev) = kept.last() {
            if kept.len() > 1 && ((last - prev) as f32) < threshold {
                kept.pop();
            }
        }
        kept.push(last);

        if kept.len() == lines.len() {
            break;
        }
        log::trace!("Noise filter: {} -> {} lines", lines.len(), kept.len());
        lines = kept;
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Orientation;
    use proptest::prelude::*;

    fn group(positions: &[u32]) -> LineGroup {
        LineGroup::raw(Orientation::Horizontal, positions.to_vec())
    }

    #[test]
    fn test_merges_edge_pairs_to_topmost() {
        let raw = group(&[342, 99, 102, 339, 580, 583]);
        let rows = Stage03RowSegmenter::new().segment(&raw).unwrap();
        assert_eq!(rows.positions, vec![99, 339, 580]);
    }

    #[test]
    fn test_chain_merge_is_transitive() {
        // 0-8-16 chain together even though 0 and 16 are further apart than the tolerance
        let raw = group(&[0, 8, 16, 200, 400]);
        let rows = Stage03RowSegmenter::new().segment(&raw).unwrap();
        assert_eq!(rows.positions, vec![0, 200, 400]);
    }

    #[test]
    fn test_noise_line_dropped() {
        // Mean gap 80, threshold 24: the line at 120 is 20 from its neighbour
        let raw = group(&[0, 100, 120, 200, 300, 400]);
        let rows = Stage03RowSegmenter::new().segment(&raw).unwrap();
        assert_eq!(rows.positions, vec![0, 100, 200, 300, 400]);
    }

    #[test]
    fn test_first_and_last_always_kept() {
        let raw = group(&[0, 15, 200, 385, 400]);
        let rows = Stage03RowSegmenter::new().segment(&raw).unwrap();
        assert_eq!(rows.first(), Some(0));
        assert_eq!(rows.last(), Some(400));
        assert_eq!(rows.positions, vec![0, 200, 400]);
    }

    #[test]
    fn test_single_line_is_insufficient() {
        let raw = LineGroup::raw(Orientation::Vertical, vec![50, 52, 55]);
        let err = Stage03RowSegmenter::new().segment(&raw).unwrap_err();
        match err {
            GridError::GridLinesInsufficient { axis, found } => {
                assert_eq!(axis, "vertical");
                assert_eq!(found, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_is_insufficient() {
        let err = Stage03RowSegmenter::new().segment(&group(&[])).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_custom_noise_fraction() {
        let segmenter = Stage03RowSegmenter::with_config(Stage03Config {
            merge_tolerance: 2,
            noise_fraction: 0.1,
        });
        let rows = segmenter.segment(&group(&[0, 100, 120, 200, 300, 400])).unwrap();
        assert_eq!(rows.len(), 6);
    }

    proptest! {
        #[test]
        fn prop_segment_is_idempotent(raw in proptest::collection::vec(0u32..2000, 0..40)) {
            let segmenter = Stage03RowSegmenter::new();
            if let Ok(once) = segmenter.segment(&group(&raw)) {
                let twice = segmenter.segment(&once).unwrap();
                prop_assert_eq!(once, twice);
            }
        }

        #[test]
        fn prop_resolved_lines_are_separated(raw in proptest::collection::vec(0u32..2000, 2..40)) {
            let segmenter = Stage03RowSegmenter::new();
            if let Ok(rows) = segmenter.segment(&group(&raw)) {
                prop_assert!(rows.positions.windows(2).all(|w| w[1] > w[0] + 10));
                let min = raw.iter().copied().min().unwrap();
                prop_assert_eq!(rows.first(), Some(min));
            }
        }
    }
}
