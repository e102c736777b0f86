//! Robust outlier flags from finite-difference speed and acceleration.
//!
//! A frame is flagged when its speed or acceleration lies more than a given
//! number of robust standard deviations above the median of a local window.
//! The robust deviation is `1.4826 * MAD`, which is not inflated by the very
//! spikes being looked for. Flags are advisory: positions are never changed.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::data::kinematics;
use crate::data::series::{FrameRange, MarkerSeries};
use crate::error::{Result, StudioError};

/// Scale factor turning a median absolute deviation into a normal-consistent sigma.
const MAD_SCALE: f64 = 1.4826;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierThresholds {
    /// Multiple of the robust deviation allowed for speed.
    pub velocity_factor: f64,
    /// Multiple of the robust deviation allowed for acceleration.
    pub acceleration_factor: f64,
    /// Width of the local statistics window in frames.
    pub window: usize,
    /// Lower bound on the robust deviation, in length units per frame.
    pub min_deviation: f64,
    /// Relative frame-to-frame change of a skeleton segment length that is flagged.
    pub segment_ratio: f64,
}

impl Default for OutlierThresholds {
    fn default() -> Self {
        Self { velocity_factor: 4.0, acceleration_factor: 4.0, window: 31, min_deviation: 1e-6, segment_ratio: 0.2 }
    }
}

impl OutlierThresholds {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("velocity factor", self.velocity_factor),
            ("acceleration factor", self.acceleration_factor),
            ("segment ratio", self.segment_ratio),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(StudioError::invalid(format!("{name} must be positive, got {v}")));
            }
        }
        if self.window < 3 {
            return Err(StudioError::invalid(format!("outlier window must span at least 3 frames, got {}", self.window)));
        }
        if !self.min_deviation.is_finite() || self.min_deviation < 0.0 {
            return Err(StudioError::invalid(format!("minimum deviation must be non-negative, got {}", self.min_deviation)));
        }
        Ok(())
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

/// Frames in `range` whose `metric` value exceeds the local median by more
/// than `factor` robust deviations.
fn flag_metric(metric: &[Option<f64>], range: FrameRange, factor: f64, th: &OutlierThresholds, out: &mut BTreeSet<usize>) {
    let half = th.window / 2;
    for f in range.frames() {
        let Some(value) = metric[f] else { continue };
        let lo = f.saturating_sub(half).max(range.start);
        let hi = (f + half).min(range.end);
        let mut local: Vec<f64> = metric[lo..=hi].iter().flatten().copied().collect();
        if local.len() < 3 {
            continue;
        }
        let center = median(&mut local);
        let mut spread: Vec<f64> = local.iter().map(|v| (v - center).abs()).collect();
        let sigma = (MAD_SCALE * median(&mut spread)).max(th.min_deviation);
        if value - center > factor * sigma {
            out.insert(f);
        }
    }
}

/// Frames of `series` inside `range` flagged by speed or acceleration.
pub fn detect(series: &MarkerSeries, range: FrameRange, thresholds: &OutlierThresholds) -> Result<BTreeSet<usize>> {
    range.validate(series.len())?;
    thresholds.validate()?;
    // Per-frame units; the thresholds are relative so the frame rate cancels out.
    let speed = kinematics::step_speed(series, 1.0);
    let accel = kinematics::acceleration(series, 1.0);
    let mut flagged = BTreeSet::new();
    flag_metric(&speed, range, thresholds.velocity_factor, thresholds, &mut flagged);
    flag_metric(&accel, range, thresholds.acceleration_factor, thresholds, &mut flagged);
    tracing::debug!(marker = series.name(), %range, count = flagged.len(), "outliers detected");
    Ok(flagged)
}

/// Frames where the distance between `a` and `b` changes by more than
/// `ratio` relative to the previous frame.
pub fn segment_outliers(a: &MarkerSeries, b: &MarkerSeries, range: FrameRange, ratio: f64) -> Result<BTreeSet<usize>> {
    range.validate(a.len())?;
    range.validate(b.len())?;
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(StudioError::invalid(format!("segment ratio must be positive, got {ratio}")));
    }
    let length = |f: usize| Some((a.position(f)? - b.position(f)?).norm());
    Ok(range
        .frames()
        .filter(|&f| f > 0)
        .filter(|&f| match (length(f - 1), length(f)) {
            (Some(prev), Some(cur)) if prev > 0.0 => (cur - prev).abs() / prev > ratio,
            _ => false,
        })
        .collect())
}
