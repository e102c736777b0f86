//! Gap-aware trajectory filters.
//!
//! Every filter is a pure function from a series to a new series version.
//! Only present samples inside the requested range are touched: missing
//! samples stay missing, and runs of present samples separated by gaps are
//! filtered independently (except for the Kalman filter, which carries its
//! state across gaps by prediction). Processed samples are tagged
//! [`Quality::Filtered`].

pub mod butterworth;
pub mod gaussian;
pub mod kalman;
pub mod loess;
pub mod median;

use serde::{Deserialize, Serialize};

use crate::data::sample::{Quality, Sample};
use crate::data::series::{FrameRange, MarkerSeries};
use crate::error::{Result, StudioError};

pub use kalman::KalmanParams;

/// Filter selection with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterKind {
    /// Zero-phase low-pass on positions.
    Butterworth { order: usize, cutoff_hz: f64 },
    /// Zero-phase low-pass on frame-to-frame displacement, re-integrated.
    ButterworthOnSpeed { order: usize, cutoff_hz: f64 },
    /// Sliding median over an odd number of frames.
    Median { kernel_size: usize },
    /// Gaussian weighted average; sigma in frames.
    Gaussian { sigma: f64 },
    /// Constant-velocity Kalman filter on the 3D position.
    Kalman(KalmanParams),
    /// Local polynomial regression over `span` (fraction) of the samples.
    Loess { span: f64, degree: usize },
}

impl FilterKind {
    /// Short label for logs and UI lists.
    pub fn describe(&self) -> String {
        match self {
            FilterKind::Butterworth { order, cutoff_hz } => format!("Butterworth {order}th order, {cutoff_hz:.2} Hz"),
            FilterKind::ButterworthOnSpeed { order, cutoff_hz } => {
                format!("Butterworth on speed {order}th order, {cutoff_hz:.2} Hz")
            }
            FilterKind::Median { kernel_size } => format!("median, {kernel_size} frames"),
            FilterKind::Gaussian { sigma } => format!("Gaussian, sigma {sigma:.2} frames"),
            FilterKind::Kalman(p) => format!("Kalman, trust {:.2}{}", p.trust_ratio, if p.smooth { ", smoothed" } else { "" }),
            FilterKind::Loess { span, degree } => format!("LOESS span {span:.2}, degree {degree}"),
        }
    }

    /// Checks the parameters that do not depend on the data.
    pub fn validate(&self, frame_rate: f64) -> Result<()> {
        match self {
            FilterKind::Butterworth { order, cutoff_hz } | FilterKind::ButterworthOnSpeed { order, cutoff_hz } => {
                butterworth::ButterworthLowpass::design(*order, *cutoff_hz, frame_rate).map(|_| ())
            }
            FilterKind::Median { kernel_size } => median::check_kernel(*kernel_size),
            FilterKind::Gaussian { sigma } => gaussian::check_sigma(*sigma),
            FilterKind::Kalman(p) => p.noise().map(|_| ()),
            FilterKind::Loess { span, degree } => loess::check_params(*span, *degree),
        }
    }

    /// Smooths one coordinate of one gap-free run. `None` leaves the run as is.
    fn filter_axis(&self, x: &[f64], frame_rate: f64) -> Result<Option<Vec<f64>>> {
        Ok(match self {
            FilterKind::Butterworth { order, cutoff_hz } => {
                Some(butterworth::zero_phase(x, *order, *cutoff_hz, frame_rate)?)
            }
            FilterKind::ButterworthOnSpeed { order, cutoff_hz } => {
                Some(butterworth::on_speed(x, *order, *cutoff_hz, frame_rate)?)
            }
            FilterKind::Median { kernel_size } => Some(median::median(x, *kernel_size)?),
            FilterKind::Gaussian { sigma } => Some(gaussian::gaussian(x, *sigma)?),
            FilterKind::Loess { span, degree } => loess::loess(x, *span, *degree)?,
            FilterKind::Kalman(_) => None,
        })
    }
}

/// Applies `kind` to the present samples of `series` inside `range`.
pub fn apply_filter(series: &MarkerSeries, range: FrameRange, kind: &FilterKind, frame_rate: f64) -> Result<MarkerSeries> {
    range.validate(series.len())?;
    kind.validate(frame_rate)?;
    if let FilterKind::Loess { span, degree } = kind {
        let count = series.valid_count(range);
        if span * (count as f64) < (*degree + 1) as f64 {
            return Err(StudioError::invalid(format!(
                "LOESS span {span} over {count} samples leaves fewer than {} points per fit",
                degree + 1
            )));
        }
    }

    let mut out: Vec<Sample> = series.samples()[range.start..=range.end].to_vec();
    match kind {
        FilterKind::Kalman(params) => {
            let measured: Vec<_> = out.iter().map(Sample::position).collect();
            let estimates = kalman::kalman(&measured, params)?;
            for (sample, est) in out.iter_mut().zip(estimates) {
                if let (false, Some(p)) = (sample.is_missing(), est) {
                    *sample = Sample::filtered(p);
                }
            }
        }
        _ => {
            for run in series.valid_runs(range) {
                let coords: Vec<[f64; 3]> = series.coords(run).into_iter().flatten().collect();
                let mut axes: [Vec<f64>; 3] = Default::default();
                for (axis, values) in axes.iter_mut().enumerate() {
                    let column: Vec<f64> = coords.iter().map(|c| c[axis]).collect();
                    match kind.filter_axis(&column, frame_rate)? {
                        Some(v) => *values = v,
                        None => break,
                    }
                }
                if axes.iter().any(|a| a.len() != run.len()) {
                    continue;
                }
                for (k, frame) in run.frames().enumerate() {
                    let p = nalgebra::Point3::new(axes[0][k], axes[1][k], axes[2][k]);
                    out[frame - range.start] = Sample::with_quality(p, Quality::Filtered);
                }
            }
        }
    }
    tracing::debug!(marker = series.name(), %range, filter = %kind.describe(), "filter applied");
    series.replace_range(range, &out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn noisy_with_gap() -> MarkerSeries {
        let samples = (0..60)
            .map(|i| {
                if (20..25).contains(&i) {
                    Sample::missing()
                } else {
                    let jitter = if i % 2 == 0 { 0.01 } else { -0.01 };
                    Sample::original(Point3::new(i as f64 * 0.1 + jitter, 1.0, -jitter))
                }
            })
            .collect();
        MarkerSeries::new("m", samples)
    }

    fn all_kinds() -> Vec<FilterKind> {
        vec![
            FilterKind::Butterworth { order: 4, cutoff_hz: 6.0 },
            FilterKind::ButterworthOnSpeed { order: 4, cutoff_hz: 6.0 },
            FilterKind::Median { kernel_size: 3 },
            FilterKind::Gaussian { sigma: 1.0 },
            FilterKind::Kalman(KalmanParams::default()),
            FilterKind::Loess { span: 0.2, degree: 1 },
        ]
    }

    #[test]
    fn filters_never_fill_gaps() {
        let s = noisy_with_gap();
        let full = FrameRange::full(s.len()).unwrap();
        for kind in all_kinds() {
            let out = apply_filter(&s, full, &kind, 60.0).unwrap();
            for f in 20..25 {
                assert_eq!(out.quality(f), Some(Quality::Missing), "{}", kind.describe());
            }
            assert_eq!(out.quality(10), Some(Quality::Filtered), "{}", kind.describe());
        }
    }

    #[test]
    fn samples_outside_range_are_untouched() {
        let s = noisy_with_gap();
        let out = apply_filter(&s, FrameRange::new(30, 50), &FilterKind::Gaussian { sigma: 2.0 }, 60.0).unwrap();
        assert_eq!(out.sample(29), s.sample(29));
        assert_eq!(out.sample(51), s.sample(51));
        assert_ne!(out.sample(40), s.sample(40));
    }

    #[test]
    fn loess_requires_enough_points_per_fit() {
        let s = noisy_with_gap();
        let err = apply_filter(&s, FrameRange::new(0, 9), &FilterKind::Loess { span: 0.1, degree: 2 }, 60.0);
        assert!(matches!(err, Err(StudioError::InvalidParameter(_))));
    }

    #[test]
    fn invalid_range_is_reported() {
        let s = noisy_with_gap();
        let err = apply_filter(&s, FrameRange::new(10, 60), &FilterKind::Median { kernel_size: 3 }, 60.0);
        assert!(matches!(err, Err(StudioError::Range { .. })));
    }

    #[test]
    fn filter_kind_serializes_with_tag() {
        let json = serde_json::to_string(&FilterKind::Median { kernel_size: 5 }).unwrap();
        assert_eq!(json, r#"{"kind":"median","kernel_size":5}"#);
    }
}
