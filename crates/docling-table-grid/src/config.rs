//! Configuration for grid recovery
//!
//! Every heuristic threshold used by the stages lives here as a named field.
//! All fields have defaults, so a JSON file only needs the values it changes.

use crate::error::{GridError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;

/// Inclusive HSV range (hue in 0..=180, saturation and value in 0..=255)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    #[inline]
    #[must_use = "returns a new HsvRange"]
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, hsv: [u8; 3]) -> bool {
        hsv[0] >= self.lower[0]
            && hsv[0] <= self.upper[0]
            && hsv[1] >= self.lower[1]
            && hsv[1] <= self.upper[1]
            && hsv[2] >= self.lower[2]
            && hsv[2] <= self.upper[2]
    }
}

/// Reserved marker color: the HSV ranges that match it and the RGB used to paint it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerColor {
    pub ranges: Vec<HsvRange>,
    pub paint: [u8; 3],
}

impl MarkerColor {
    /// Red marker; two hue ranges because red wraps around the hue circle
    #[must_use = "returns the red marker definition"]
    pub fn red() -> Self {
        Self {
            ranges: vec![
                HsvRange::new([0, 100, 100], [10, 255, 255]),
                HsvRange::new([160, 100, 100], [180, 255, 255]),
            ],
            paint: [255, 0, 0],
        }
    }

    /// Green marker used for grid separators
    #[must_use = "returns the green marker definition"]
    pub fn green() -> Self {
        Self {
            ranges: vec![HsvRange::new([40, 80, 80], [85, 255, 255])],
            paint: [0, 255, 0],
        }
    }

    #[inline]
    #[must_use]
    pub fn matches(&self, hsv: [u8; 3]) -> bool {
        self.ranges.iter().any(|r| r.contains(hsv))
    }
}

/// How the outer table rectangle is found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryStrategy {
    /// Contour of a rectangle painted in the boundary marker color
    MarkerColor,
    /// Largest rectangular contour of dark ink (plain scans)
    InkContour,
}

impl BoundaryStrategy {
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MarkerColor => "marker_color",
            Self::InkContour => "ink_contour",
        }
    }
}

/// How separator lines are found inside the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStrategy {
    /// Canny edges + Hough transform + span filter
    EdgeHough,
    /// Per-row/column fraction of grid-marker pixels
    MarkerScan,
    /// Per-row/column fraction of dark pixels
    InkScan,
}

impl LineStrategy {
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EdgeHough => "edge_hough",
            Self::MarkerScan => "marker_scan",
            Self::InkScan => "ink_scan",
        }
    }
}

/// Weights combining per-cell statistics into a drawing-likelihood score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnScoreWeights {
    /// Weight of `1 - mean / 255` (darker is better)
    pub ink_weight: f64,
    /// Weight of the normalized standard deviation
    pub variance_weight: f64,
    /// Weight of the normalized edge-pixel ratio
    pub edge_weight: f64,
    /// Added when a sample holds two or more disjoint shapes
    pub contour_bonus: f64,
    /// Subtracted when a sample is a flat fill
    pub flat_penalty: f64,
    /// Intensity variance below which a sample counts as flat
    pub flat_variance: f64,
}

impl Default for ColumnScoreWeights {
    #[inline]
    fn default() -> Self {
        Self {
            ink_weight: 1.0,
            variance_weight: 1.5,
            edge_weight: 2.0,
            contour_bonus: 1.0,
            flat_penalty: 2.0,
            flat_variance: 25.0,
        }
    }
}

/// Grid recovery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    // --- Marker colors ---
    /// Color painted around the outer table boundary
    pub boundary_marker: MarkerColor,
    /// Color painted over grid separators
    pub grid_marker: MarkerColor,

    // --- Boundary detection ---
    /// Strategies tried in order
    pub boundary_strategies: Vec<BoundaryStrategy>,
    /// Radius of the closing step that bridges gaps in the mask. Default: 2.
    pub close_radius: u8,
    /// Radius of the opening step that removes speckle from marker masks. Default: 1.
    pub open_radius: u8,
    /// Douglas-Peucker epsilon as a fraction of contour perimeter. Default: 0.02.
    pub polygon_epsilon_fraction: f64,
    /// Padding added around the detected rectangle. Default: 3.
    pub boundary_padding: u32,
    /// Minimum table area as a fraction of the page (ink strategy only). Default: 0.05.
    pub min_table_area_fraction: f64,
    /// Use the whole page when no boundary is found instead of failing. Default: false.
    pub whole_page_fallback: bool,

    // --- Shared masks ---
    /// Gray level below which a pixel is ink. Default: 100.
    pub ink_threshold: u8,

    // --- Grid line detection ---
    /// Strategies tried in order
    pub line_strategies: Vec<LineStrategy>,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Hough vote threshold as a fraction of the shorter table side. Default: 0.3.
    pub hough_vote_fraction: f32,
    /// Hough non-maximum suppression radius. Default: 4.
    pub hough_suppression_radius: u32,
    /// Maximum deviation from an axis for a line to count. Default: 10.
    pub axis_tolerance_degrees: u32,
    /// Largest gap bridged when measuring a line segment. Default: 20.
    pub hough_max_gap: u32,
    /// Minimum segment span as a fraction of the table extent. Default: 0.95.
    pub line_span_fraction: f32,
    /// Minimum marker/ink fraction for a scanned row or column. Default: 0.40.
    pub marker_line_fraction: f32,

    // --- Line segmentation ---
    /// Positions closer than this merge into one separator. Default: 10.
    pub merge_tolerance: u32,
    /// Gaps below this fraction of the mean gap are noise. Default: 0.30.
    pub row_noise_fraction: f32,

    // --- Header separator ---
    /// Fraction of the table height searched from the top. Default: 0.30.
    pub header_search_fraction: f32,
    /// Minimum contiguous run as a fraction of table width. Default: 0.70.
    pub header_span_fraction: f32,
    /// Gaps up to this many pixels do not break a run. Default: 2.
    pub header_run_gap: u32,

    // --- Column classification ---
    /// Data rows sampled per column. Default: 5.
    pub column_sample_rows: usize,
    /// Fraction of each cell side trimmed before sampling. Default: 0.1.
    pub sample_inset_fraction: f32,
    /// Narrowest column eligible as the drawing column. Default: 30.
    pub min_column_width: u32,
    /// Score difference under which the wider column wins. Default: 0.05.
    pub tie_margin: f64,
    pub score_weights: ColumnScoreWeights,

    // --- Cell extraction ---
    /// Inward margin applied to every cell. Default: 3.
    pub cell_margin: u32,
    /// Cells shorter than this are over-segmentation artifacts. Default: 10.
    pub min_cell_height: u32,
    /// Gray level at or above which a pixel is background. Default: 250.
    pub empty_intensity: u8,
    /// Cells with at most this ink fraction are flagged empty. Default: 0.01.
    pub empty_ink_fraction: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            boundary_marker: MarkerColor::red(),
            grid_marker: MarkerColor::green(),
            boundary_strategies: vec![BoundaryStrategy::MarkerColor, BoundaryStrategy::InkContour],
            close_radius: 2,
            open_radius: 1,
            polygon_epsilon_fraction: 0.02,
            boundary_padding: 3,
            min_table_area_fraction: 0.05,
            whole_page_fallback: false,
            ink_threshold: 100,
            line_strategies: vec![
                LineStrategy::EdgeHough,
                LineStrategy::MarkerScan,
                LineStrategy::InkScan,
            ],
            canny_low: 50.0,
            canny_high: 100.0,
            hough_vote_fraction: 0.3,
            hough_suppression_radius: 4,
            axis_tolerance_degrees: 10,
            hough_max_gap: 20,
            line_span_fraction: 0.95,
            marker_line_fraction: 0.40,
            merge_tolerance: 10,
            row_noise_fraction: 0.30,
            header_search_fraction: 0.30,
            header_span_fraction: 0.70,
            header_run_gap: 2,
            column_sample_rows: 5,
            sample_inset_fraction: 0.1,
            min_column_width: 30,
            tie_margin: 0.05,
            score_weights: ColumnScoreWeights::default(),
            cell_margin: 3,
            min_cell_height: 10,
            empty_intensity: 250,
            empty_ink_fraction: 0.01,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn check_fraction(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(GridError::ConfigError {
            reason: format!("{name} must be in (0, 1], got {value}"),
        })
    }
}

impl GridConfig {
    /// Parse a (possibly partial) JSON configuration and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| GridError::ConfigError {
            reason: format!("malformed JSON: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Defaults with overrides from environment variables
    ///
    /// Environment variables:
    /// - `TABLE_GRID_LINE_SPAN_FRACTION` (default: 0.95)
    /// - `TABLE_GRID_HEADER_SPAN_FRACTION` (default: 0.70)
    /// - `TABLE_GRID_ROW_NOISE_FRACTION` (default: 0.30)
    /// - `TABLE_GRID_CELL_MARGIN` (default: 3)
    /// - `TABLE_GRID_EMPTY_INTENSITY` (default: 250)
    /// - `TABLE_GRID_BOUNDARY_PADDING` (default: 3)
    /// - `TABLE_GRID_WHOLE_PAGE_FALLBACK` (default: false)
    #[must_use = "creates config from environment variables"]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse("TABLE_GRID_LINE_SPAN_FRACTION") {
            config.line_span_fraction = v;
        }
        if let Some(v) = env_parse("TABLE_GRID_HEADER_SPAN_FRACTION") {
            config.header_span_fraction = v;
        }
        if let Some(v) = env_parse("TABLE_GRID_ROW_NOISE_FRACTION") {
            config.row_noise_fraction = v;
        }
        if let Some(v) = env_parse("TABLE_GRID_CELL_MARGIN") {
            config.cell_margin = v;
        }
        if let Some(v) = env_parse("TABLE_GRID_EMPTY_INTENSITY") {
            config.empty_intensity = v;
        }
        if let Some(v) = env_parse("TABLE_GRID_BOUNDARY_PADDING") {
            config.boundary_padding = v;
        }
        if let Some(v) = env_parse("TABLE_GRID_WHOLE_PAGE_FALLBACK") {
            config.whole_page_fallback = v;
        }
        config
    }

    /// Reject values the stages cannot work with
    pub fn validate(&self) -> Result<()> {
        check_fraction("line_span_fraction", f64::from(self.line_span_fraction))?;
        check_fraction("marker_line_fraction", f64::from(self.marker_line_fraction))?;
        check_fraction("row_noise_fraction", f64::from(self.row_noise_fraction))?;
        check_fraction("header_search_fraction", f64::from(self.header_search_fraction))?;
        check_fraction("header_span_fraction", f64::from(self.header_span_fraction))?;
        check_fraction("hough_vote_fraction", f64::from(self.hough_vote_fraction))?;
        check_fraction("min_table_area_fraction", self.min_table_area_fraction)?;
        check_fraction("polygon_epsilon_fraction", self.polygon_epsilon_fraction)?;

        if !(0.0..0.5).contains(&self.sample_inset_fraction) {
            return Err(GridError::ConfigError {
                reason: format!(
                    "sample_inset_fraction must be in [0, 0.5), got {}",
                    self.sample_inset_fraction
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.empty_ink_fraction) {
            return Err(GridError::ConfigError {
                reason: format!(
                    "empty_ink_fraction must be in [0, 1], got {}",
                    self.empty_ink_fraction
                ),
            });
        }
        if self.canny_low > self.canny_high {
            return Err(GridError::ConfigError {
                reason: format!(
                    "canny_low ({}) exceeds canny_high ({})",
                    self.canny_low, self.canny_high
                ),
            });
        }
        if self.axis_tolerance_degrees >= 45 {
            return Err(GridError::ConfigError {
                reason: "axis_tolerance_degrees must be below 45".to_string(),
            });
        }
        if self.boundary_strategies.is_empty() || self.line_strategies.is_empty() {
            return Err(GridError::ConfigError {
                reason: "at least one boundary and one line strategy is required".to_string(),
            });
        }
        if self.column_sample_rows == 0 {
            return Err(GridError::ConfigError {
                reason: "column_sample_rows must be at least 1".to_string(),
            });
        }
        for (name, marker) in [
            ("boundary_marker", &self.boundary_marker),
            ("grid_marker", &self.grid_marker),
        ] {
            if marker.ranges.is_empty() {
                return Err(GridError::ConfigError {
                    reason: format!("{name} has no HSV ranges"),
                });
            }
            for range in &marker.ranges {
                let ordered = (0..3).all(|i| range.lower[i] <= range.upper[i]);
                if !ordered || range.upper[0] > 180 {
                    return Err(GridError::ConfigError {
                        reason: format!("{name} has an invalid HSV range {range:?}"),
                    });
                }
            }
        }
        Ok(())
    }
}
