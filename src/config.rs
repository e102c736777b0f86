//! Configuration types shared by the analysis engines.
//!
//! Every section deserializes with defaults, so a config file only needs the
//! values it overrides.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};
use crate::filters::{FilterKind, KalmanParams};
use crate::interpolation::PatternOptions;
use crate::outliers::OutlierThresholds;

// ─────────────────────────────────────────────────────────────────────────────
// Filter defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Default parameters offered for each filter kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterDefaults {
    pub butterworth_order: usize,
    pub butterworth_cutoff_hz: f64,
    pub median_kernel: usize,
    /// Gaussian sigma in frames.
    pub gaussian_sigma: f64,
    /// Number of samples per LOESS neighbourhood; converted to a span per range.
    pub loess_values: usize,
    pub loess_degree: usize,
    pub kalman: KalmanParams,
}

impl Default for FilterDefaults {
    fn default() -> Self {
        Self {
            butterworth_order: 4,
            butterworth_cutoff_hz: 10.0,
            median_kernel: 3,
            gaussian_sigma: 3.0,
            loess_values: 10,
            loess_degree: 1,
            kalman: KalmanParams::default(),
        }
    }
}

impl FilterDefaults {
    pub fn butterworth(&self) -> FilterKind {
        FilterKind::Butterworth { order: self.butterworth_order, cutoff_hz: self.butterworth_cutoff_hz }
    }

    pub fn butterworth_on_speed(&self) -> FilterKind {
        FilterKind::ButterworthOnSpeed { order: self.butterworth_order, cutoff_hz: self.butterworth_cutoff_hz }
    }

    pub fn median(&self) -> FilterKind {
        FilterKind::Median { kernel_size: self.median_kernel }
    }

    pub fn gaussian(&self) -> FilterKind {
        FilterKind::Gaussian { sigma: self.gaussian_sigma }
    }

    pub fn kalman(&self) -> FilterKind {
        FilterKind::Kalman(self.kalman)
    }

    /// LOESS over `sample_count` samples using `loess_values` neighbours.
    pub fn loess(&self, sample_count: usize) -> FilterKind {
        let span = if sample_count == 0 { 1.0 } else { (self.loess_values as f64 / sample_count as f64).min(1.0) };
        FilterKind::Loess { span, degree: self.loess_degree }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Selection / picking
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Frames the view may move away from a selection before it is cleared.
    pub frame_tolerance: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self { frame_tolerance: 0 }
    }
}

/// Identity-buffer rendering parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickingConfig {
    /// Radius of a marker's pickable disc in pixels.
    pub marker_radius_px: f32,
    /// Vertical field of view of the perspective camera, degrees.
    pub fov_y_deg: f64,
    pub near: f64,
    pub far: f64,
}

impl Default for PickingConfig {
    fn default() -> Self {
        Self { marker_radius_px: 6.0, fov_y_deg: 45.0, near: 0.1, far: 100.0 }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Skeleton
// ─────────────────────────────────────────────────────────────────────────────

/// Marker pairs joined by a rigid segment, used for segment-length checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkeletonConfig {
    pub pairs: Vec<(String, String)>,
}

// ─────────────────────────────────────────────────────────────────────────────
// StudioConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level configuration.
///
/// | Field       | Purpose |
/// |-------------|---------|
/// | `filters`   | Default filter parameters |
/// | `outliers`  | Outlier detection thresholds |
/// | `pattern`   | Gap interpolation options |
/// | `selection` | Analysis selection behaviour |
/// | `picking`   | Identity buffer camera and marker size |
/// | `skeleton`  | Segment pairs for length checks |
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub filters: FilterDefaults,
    pub outliers: OutlierThresholds,
    pub pattern: PatternOptions,
    pub selection: SelectionConfig,
    pub picking: PickingConfig,
    pub skeleton: SkeletonConfig,
}

impl StudioConfig {
    /// Checks every section; the first problem is reported as [`StudioError::Config`].
    pub fn validate(&self) -> Result<()> {
        let wrap = |e: StudioError| StudioError::Config(e.to_string());
        self.outliers.validate().map_err(wrap)?;
        self.pattern.validate().map_err(wrap)?;
        crate::filters::median::check_kernel(self.filters.median_kernel).map_err(wrap)?;
        crate::filters::gaussian::check_sigma(self.filters.gaussian_sigma).map_err(wrap)?;
        self.filters.kalman.noise().map_err(wrap)?;
        if self.filters.butterworth_order == 0 {
            return Err(StudioError::Config("Butterworth order must be at least 1".into()));
        }
        if self.filters.loess_values == 0 || !(1..=2).contains(&self.filters.loess_degree) {
            return Err(StudioError::Config("LOESS needs at least one value and degree 1 or 2".into()));
        }
        let p = &self.picking;
        if !(p.marker_radius_px.is_finite() && p.marker_radius_px > 0.0) {
            return Err(StudioError::Config(format!("marker radius must be positive, got {}", p.marker_radius_px)));
        }
        if !(p.fov_y_deg > 0.0 && p.fov_y_deg < 180.0) {
            return Err(StudioError::Config(format!("field of view must be in (0, 180), got {}", p.fov_y_deg)));
        }
        if !(p.near > 0.0 && p.far > p.near) {
            return Err(StudioError::Config(format!("clip planes must satisfy 0 < near < far, got {} / {}", p.near, p.far)));
        }
        Ok(())
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(text).map_err(|e| StudioError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| StudioError::Config(e.to_string()))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text).map_err(|e| StudioError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
