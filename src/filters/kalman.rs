//! Constant-velocity Kalman filter over 3D positions, with optional
//! Rauch-Tung-Striebel smoothing.
//!
//! State vector: [x, y, z, vx, vy, vz]ᵀ. Time is measured in frames, so the
//! noise parameters are per-frame variances in the data's length unit.
//! Missing frames get a prediction step only; their estimate drives the
//! following frames but is never written out.

use nalgebra::{Matrix3, Point3, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};

type State = SVector<f64, 6>;
type Matrix6 = SMatrix<f64, 6, 6>;
type Matrix3x6 = SMatrix<f64, 3, 6>;
type Matrix6x3 = SMatrix<f64, 6, 3>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanParams {
    /// Measurement trust relative to the motion model (process / measurement noise).
    pub trust_ratio: f64,
    /// Run the backward smoothing pass.
    pub smooth: bool,
    /// Explicit process noise variance; defaults to 1.
    pub process_noise: Option<f64>,
    /// Explicit measurement noise variance; defaults to `process_noise / trust_ratio`.
    pub measurement_noise: Option<f64>,
}

impl Default for KalmanParams {
    fn default() -> Self {
        Self { trust_ratio: 20.0, smooth: true, process_noise: None, measurement_noise: None }
    }
}

impl KalmanParams {
    /// Resolved `(process, measurement)` noise variances.
    pub fn noise(&self) -> Result<(f64, f64)> {
        let q = self.process_noise.unwrap_or(1.0);
        if !q.is_finite() || q <= 0.0 {
            return Err(StudioError::invalid(format!("process noise must be positive, got {q}")));
        }
        let r = match self.measurement_noise {
            Some(r) => r,
            None => {
                if !self.trust_ratio.is_finite() || self.trust_ratio <= 0.0 {
                    return Err(StudioError::invalid(format!(
                        "trust ratio must be positive, got {}",
                        self.trust_ratio
                    )));
                }
                q / self.trust_ratio
            }
        };
        if !r.is_finite() || r <= 0.0 {
            return Err(StudioError::invalid(format!("measurement noise must be positive, got {r}")));
        }
        Ok((q, r))
    }
}

fn transition() -> Matrix6 {
    let mut f = Matrix6::identity();
    for i in 0..3 {
        f[(i, i + 3)] = 1.0;
    }
    f
}

/// Discrete white-noise-acceleration process covariance for dt = 1.
fn process_covariance(q: f64) -> Matrix6 {
    let mut m = Matrix6::zeros();
    for i in 0..3 {
        m[(i, i)] = 0.25 * q;
        m[(i, i + 3)] = 0.5 * q;
        m[(i + 3, i)] = 0.5 * q;
        m[(i + 3, i + 3)] = q;
    }
    m
}

fn observation() -> Matrix3x6 {
    let mut h = Matrix3x6::zeros();
    for i in 0..3 {
        h[(i, i)] = 1.0;
    }
    h
}

struct Step {
    predicted: State,
    predicted_cov: Matrix6,
    filtered: State,
    filtered_cov: Matrix6,
}

/// Filters a sequence of optional measurements. The output has the same
/// length; frames with no measurement stay `None`, as do frames before the
/// first measurement.
pub fn kalman(measurements: &[Option<Point3<f64>>], params: &KalmanParams) -> Result<Vec<Option<Point3<f64>>>> {
    let (q, r) = params.noise()?;
    let Some(first) = measurements.iter().position(Option::is_some) else {
        return Ok(vec![None; measurements.len()]);
    };

    let f = transition();
    let qm = process_covariance(q);
    let h = observation();
    let rm = Matrix3::identity() * r;

    let z0 = measurements[first].map(|p| p.coords).unwrap_or_else(Vector3::zeros);
    let mut x = State::zeros();
    x.fixed_rows_mut::<3>(0).copy_from(&z0);
    let mut p = Matrix6::identity() * r;
    for i in 3..6 {
        p[(i, i)] = 100.0 * (q + r);
    }

    let mut steps: Vec<Step> = Vec::with_capacity(measurements.len() - first);
    for (k, m) in measurements.iter().enumerate().skip(first) {
        let (xp, pp) = if k == first { (x, p) } else { (f * x, f * p * f.transpose() + qm) };
        let (xf, pf) = match m {
            Some(z) => {
                let s = h * pp * h.transpose() + rm;
                match s.try_inverse() {
                    Some(s_inv) => {
                        let gain: Matrix6x3 = pp * h.transpose() * s_inv;
                        let innovation = z.coords - h * xp;
                        (xp + gain * innovation, (Matrix6::identity() - gain * h) * pp)
                    }
                    None => (xp, pp),
                }
            }
            None => (xp, pp),
        };
        steps.push(Step { predicted: xp, predicted_cov: pp, filtered: xf, filtered_cov: pf });
        x = xf;
        p = pf;
    }

    let mut estimates: Vec<State> = steps.iter().map(|s| s.filtered).collect();
    if params.smooth && steps.len() > 1 {
        for k in (0..steps.len() - 1).rev() {
            let next = &steps[k + 1];
            let Some(pred_inv) = next.predicted_cov.try_inverse() else { continue };
            let c = steps[k].filtered_cov * f.transpose() * pred_inv;
            estimates[k] = steps[k].filtered + c * (estimates[k + 1] - next.predicted);
        }
    }

    let mut out = vec![None; measurements.len()];
    for (offset, est) in estimates.iter().enumerate() {
        let k = first + offset;
        if measurements[k].is_some() {
            out[k] = Some(Point3::new(est[0], est[1], est[2]));
        }
    }
    Ok(out)
}
