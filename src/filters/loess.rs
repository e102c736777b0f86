//! Locally weighted polynomial regression (LOESS) with tricube weights.

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, StudioError};

pub fn check_params(span: f64, degree: usize) -> Result<()> {
    if !span.is_finite() || span <= 0.0 || span > 1.0 {
        return Err(StudioError::invalid(format!("LOESS span must be in (0, 1], got {span}")));
    }
    if !(1..=2).contains(&degree) {
        return Err(StudioError::invalid(format!("LOESS degree must be 1 or 2, got {degree}")));
    }
    Ok(())
}

/// Number of neighbours used per local fit for `n` samples.
pub fn neighbours(span: f64, degree: usize, n: usize) -> usize {
    ((span * n as f64).ceil() as usize).max(degree + 1).min(n)
}

fn tricube(u: f64) -> f64 {
    let t = 1.0 - u.abs().powi(3);
    if t <= 0.0 {
        0.0
    } else {
        t * t * t
    }
}

/// Start of the `k`-wide window nearest to `i` in a sequence of `n` samples.
fn window_start(i: usize, k: usize, n: usize) -> usize {
    let mut lo = i.saturating_sub(k / 2).min(n - k);
    loop {
        let hi = lo + k - 1;
        if lo > 0 && i - (lo - 1) < hi - i {
            lo -= 1;
        } else if hi + 1 < n && (hi + 1) - i < i - lo {
            lo += 1;
        } else {
            return lo;
        }
    }
}

fn local_fit(x: &[f64], i: usize, lo: usize, k: usize, degree: usize) -> f64 {
    let hi = lo + k - 1;
    let reach = (i - lo).max(hi - i) as f64 + 1.0;
    let terms = degree + 1;
    let mut normal = DMatrix::<f64>::zeros(terms, terms);
    let mut rhs = DVector::<f64>::zeros(terms);
    let (mut wsum, mut wy) = (0.0, 0.0);
    for (j, &y) in x.iter().enumerate().take(hi + 1).skip(lo) {
        let d = j as f64 - i as f64;
        let w = tricube(d / reach);
        let powers: Vec<f64> = (0..2 * terms).map(|p| d.powi(p as i32)).collect();
        for a in 0..terms {
            rhs[a] += w * powers[a] * y;
            for b in 0..terms {
                normal[(a, b)] += w * powers[a + b];
            }
        }
        wsum += w;
        wy += w * y;
    }
    match normal.lu().solve(&rhs) {
        Some(coef) if coef[0].is_finite() => coef[0],
        _ => wy / wsum,
    }
}

/// Smooths `x` with neighbourhoods covering `span` of the samples. Returns
/// `None` when there are fewer samples than the polynomial needs.
pub fn loess(x: &[f64], span: f64, degree: usize) -> Result<Option<Vec<f64>>> {
    check_params(span, degree)?;
    let n = x.len();
    if n < degree + 1 {
        return Ok(None);
    }
    let k = neighbours(span, degree, n);
    Ok(Some((0..n).map(|i| local_fit(x, i, window_start(i, k, n), k, degree)).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reproduces_polynomials_of_its_degree() {
        let line: Vec<f64> = (0..30).map(|i| 3.0 - 0.5 * i as f64).collect();
        let y = loess(&line, 0.3, 1).unwrap().unwrap();
        for (a, b) in line.iter().zip(&y) {
            assert!((a - b).abs() < 1e-8);
        }
        let parabola: Vec<f64> = (0..30).map(|i| (i as f64 - 10.0).powi(2)).collect();
        let y = loess(&parabola, 0.3, 2).unwrap().unwrap();
        for (a, b) in parabola.iter().zip(&y) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn windows_stay_inside_the_sequence() {
        assert_eq!(window_start(0, 5, 20), 0);
        assert_eq!(window_start(19, 5, 20), 15);
        assert_eq!(window_start(10, 5, 20), 8);
    }

    #[test]
    fn too_few_samples_is_a_no_op() {
        assert_eq!(loess(&[1.0, 2.0], 1.0, 2).unwrap(), None);
        assert!(loess(&[1.0], 0.0, 1).is_err());
        assert!(loess(&[1.0], 0.5, 3).is_err());
    }
}
