//! Butterworth low-pass design and zero-phase (forward-backward) application.
//!
//! The filter is realised as cascaded second-order sections obtained through
//! the bilinear transform with frequency prewarping. `order` is the order of
//! the overall zero-phase response, so the single-pass design uses half of it
//! (at least one), the same convention Pose2Sim follows.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};

/// One second-order (or first-order, with `b[2] == a[2] == 0`) IIR section.
/// Coefficients are normalised so that `a[0] == 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadParams {
    /// Feedforward coefficients b0,b1,b2
    pub b: [f64; 3],
    /// Feedback coefficients a0,a1,a2
    pub a: [f64; 3],
}

impl BiquadParams {
    /// Gain at DC (z = 1).
    pub fn dc_gain(&self) -> f64 {
        let den = self.a[0] + self.a[1] + self.a[2];
        if den.abs() < 1e-15 {
            return 1.0;
        }
        (self.b[0] + self.b[1] + self.b[2]) / den
    }

    /// Transposed direct form II state that holds the section at rest for a
    /// constant input `level`.
    fn steady_state(&self, level: f64) -> [f64; 2] {
        let g = self.dc_gain();
        let z2 = (self.b[2] - self.a[2] * g) * level;
        let z1 = (self.b[1] - self.a[1] * g) * level + z2;
        [z1, z2]
    }

    fn run(&self, x: &[f64], mut z: [f64; 2]) -> Vec<f64> {
        let [b0, b1, b2] = self.b;
        let [_, a1, a2] = self.a;
        x.iter()
            .map(|&xi| {
                let y = b0 * xi + z[0];
                z[0] = b1 * xi - a1 * y + z[1];
                z[1] = b2 * xi - a2 * y;
                y
            })
            .collect()
    }
}

/// Low-pass Butterworth filter as a cascade of sections.
#[derive(Debug, Clone, PartialEq)]
pub struct ButterworthLowpass {
    sections: Vec<BiquadParams>,
}

impl ButterworthLowpass {
    /// Designs a filter whose forward-backward response has order `order`.
    ///
    /// Fails when the order is zero, or the cutoff is not inside `(0, fs/2)`.
    pub fn design(order: usize, cutoff_hz: f64, frame_rate: f64) -> Result<Self> {
        if order == 0 {
            return Err(StudioError::invalid("Butterworth order must be at least 1"));
        }
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(StudioError::invalid(format!("frame rate must be positive, got {frame_rate}")));
        }
        let nyquist = frame_rate / 2.0;
        if !cutoff_hz.is_finite() || cutoff_hz <= 0.0 {
            return Err(StudioError::invalid(format!("cutoff must be positive, got {cutoff_hz} Hz")));
        }
        if cutoff_hz >= nyquist {
            return Err(StudioError::invalid(format!(
                "cutoff {cutoff_hz} Hz must be below the Nyquist frequency {nyquist} Hz"
            )));
        }

        let n = (order / 2).max(1);
        let k = (PI * cutoff_hz / frame_rate).tan();
        let k2 = k * k;
        let mut sections = Vec::with_capacity(n / 2 + 1);
        // Normalised prototype factors: s^2 + 2 sin((2i-1)pi/2n) s + 1, plus (s + 1) for odd n.
        for i in 1..=n / 2 {
            let damping = 2.0 * ((2 * i - 1) as f64 * PI / (2 * n) as f64).sin();
            let a0 = 1.0 + damping * k + k2;
            sections.push(BiquadParams {
                b: [k2 / a0, 2.0 * k2 / a0, k2 / a0],
                a: [1.0, 2.0 * (k2 - 1.0) / a0, (1.0 - damping * k + k2) / a0],
            });
        }
        if n % 2 == 1 {
            let a0 = 1.0 + k;
            sections.push(BiquadParams { b: [k / a0, k / a0, 0.0], a: [1.0, (k - 1.0) / a0, 0.0] });
        }
        Ok(Self { sections })
    }

    pub fn sections(&self) -> &[BiquadParams] {
        &self.sections
    }

    /// Single causal pass, initialised at steady state for the first sample.
    pub fn lfilter(&self, x: &[f64]) -> Vec<f64> {
        let Some(&first) = x.first() else { return Vec::new() };
        let mut level = first;
        let mut y = x.to_vec();
        for s in &self.sections {
            y = s.run(&y, s.steady_state(level));
            level *= s.dc_gain();
        }
        y
    }

    /// Zero-phase filtering with odd-symmetric edge extension.
    pub fn filtfilt(&self, x: &[f64]) -> Vec<f64> {
        let n = x.len();
        if n == 0 {
            return Vec::new();
        }
        let padlen = (3 * (2 * self.sections.len() + 1)).min(n - 1);
        let mut ext = Vec::with_capacity(n + 2 * padlen);
        ext.extend((1..=padlen).rev().map(|k| 2.0 * x[0] - x[k]));
        ext.extend_from_slice(x);
        ext.extend((1..=padlen).map(|k| 2.0 * x[n - 1] - x[n - 1 - k]));

        let mut y = self.lfilter(&ext);
        y.reverse();
        let mut y = self.lfilter(&y);
        y.reverse();
        y[padlen..padlen + n].to_vec()
    }
}

/// Zero-phase Butterworth low-pass of one coordinate.
pub fn zero_phase(x: &[f64], order: usize, cutoff_hz: f64, frame_rate: f64) -> Result<Vec<f64>> {
    Ok(ButterworthLowpass::design(order, cutoff_hz, frame_rate)?.filtfilt(x))
}

/// Filters the frame-to-frame displacement instead of the position, then
/// integrates back from the first sample so the absolute position is kept.
pub fn on_speed(x: &[f64], order: usize, cutoff_hz: f64, frame_rate: f64) -> Result<Vec<f64>> {
    let filter = ButterworthLowpass::design(order, cutoff_hz, frame_rate)?;
    if x.len() < 2 {
        return Ok(x.to_vec());
    }
    let steps: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let smoothed = filter.filtfilt(&steps);
    let mut out = Vec::with_capacity(x.len());
    let mut acc = x[0];
    out.push(acc);
    for d in smoothed {
        acc += d;
        out.push(acc);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| (2.0 * PI * freq * i as f64 / fs).sin()).collect()
    }

    fn rms_middle(x: &[f64]) -> f64 {
        let mid = &x[x.len() / 4..3 * x.len() / 4];
        (mid.iter().map(|v| v * v).sum::<f64>() / mid.len() as f64).sqrt()
    }

    #[test]
    fn sections_have_unity_dc_gain() {
        for order in 1..=8 {
            let f = ButterworthLowpass::design(order, 6.0, 100.0).unwrap();
            let g: f64 = f.sections().iter().map(|s| s.dc_gain()).product();
            assert!((g - 1.0).abs() < 1e-12, "order {order}: gain {g}");
        }
    }

    #[test]
    fn rejects_cutoff_at_or_above_nyquist() {
        assert!(matches!(ButterworthLowpass::design(4, 50.0, 100.0), Err(StudioError::InvalidParameter(_))));
        assert!(matches!(ButterworthLowpass::design(4, 0.0, 100.0), Err(StudioError::InvalidParameter(_))));
        assert!(matches!(ButterworthLowpass::design(0, 5.0, 100.0), Err(StudioError::InvalidParameter(_))));
    }

    #[test]
    fn constant_signal_is_fixed_point() {
        let x = vec![3.25; 50];
        let once = zero_phase(&x, 4, 6.0, 100.0).unwrap();
        let twice = zero_phase(&once, 4, 6.0, 100.0).unwrap();
        for v in twice {
            assert!((v - 3.25).abs() < 1e-9);
        }
    }

    #[test]
    fn lower_cutoff_attenuates_more() {
        let x = sine(20.0, 200.0, 400);
        let mut last = rms_middle(&x);
        for cutoff in [30.0, 18.0, 10.0, 5.0] {
            let y = zero_phase(&x, 4, cutoff, 200.0).unwrap();
            let r = rms_middle(&y);
            assert!(r < last, "cutoff {cutoff}: {r} !< {last}");
            last = r;
        }
    }

    #[test]
    fn speed_variant_keeps_first_sample_and_ramp() {
        let x: Vec<f64> = (0..40).map(|i| 0.5 * i as f64 + 2.0).collect();
        let y = on_speed(&x, 4, 6.0, 100.0).unwrap();
        assert_eq!(y[0], 2.0);
        for (a, b) in x.iter().zip(&y) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
