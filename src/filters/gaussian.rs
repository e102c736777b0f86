//! Gaussian smoothing with weights renormalised where the kernel leaves the run.

use crate::error::{Result, StudioError};

/// Kernel support in standard deviations.
const TRUNCATE: f64 = 4.0;

pub fn check_sigma(sigma: f64) -> Result<()> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(StudioError::invalid(format!("Gaussian sigma must be positive, got {sigma}")));
    }
    Ok(())
}

/// Weights for offsets `-radius..=radius`, with the radius capped at `max_radius`.
fn kernel(sigma: f64, max_radius: i64) -> Vec<f64> {
    let radius = ((TRUNCATE * sigma).ceil() as i64).clamp(0, max_radius.max(0));
    (-radius..=radius).map(|k| (-0.5 * (k as f64 / sigma).powi(2)).exp()).collect()
}

/// `sigma` is expressed in frames.
pub fn gaussian(x: &[f64], sigma: f64) -> Result<Vec<f64>> {
    check_sigma(sigma)?;
    let n = x.len() as i64;
    // Offsets beyond the run never contribute.
    let w = kernel(sigma, n - 1);
    let radius = (w.len() / 2) as i64;
    Ok((0..n)
        .map(|i| {
            let (mut acc, mut norm) = (0.0, 0.0);
            for (j, wk) in w.iter().enumerate() {
                let idx = i + j as i64 - radius;
                if idx >= 0 && idx < n {
                    acc += wk * x[idx as usize];
                    norm += wk;
                }
            }
            acc / norm
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_are_not_dimmed() {
        let x = vec![5.0; 12];
        let y = gaussian(&x, 2.0).unwrap();
        for v in y {
            assert!((v - 5.0).abs() < 1e-12);
        }
    }

    #[test]
    fn spreads_an_impulse_symmetrically() {
        let mut x = vec![0.0; 21];
        x[10] = 1.0;
        let y = gaussian(&x, 1.5).unwrap();
        assert!(y[10] < 1.0);
        assert!((y[9] - y[11]).abs() < 1e-12);
        assert!(y[9] > y[8]);
    }

    #[test]
    fn tiny_sigma_leaves_the_signal_unchanged() {
        let x = [1.0, 2.0, 3.0];
        assert_eq!(gaussian(&x, 1e-200).unwrap(), x);
    }

    #[test]
    fn huge_sigma_averages_the_whole_run() {
        let y = gaussian(&[1.0, 2.0, 3.0, 6.0], 1e12).unwrap();
        for v in y {
            assert!((v - 3.0).abs() < 1e-9, "{v}");
        }
        assert!(gaussian(&[], 1e300).unwrap().is_empty());
    }

    #[test]
    fn non_positive_sigma_is_rejected() {
        assert!(gaussian(&[1.0], 0.0).is_err());
        assert!(gaussian(&[1.0], f64::NAN).is_err());
    }
}
