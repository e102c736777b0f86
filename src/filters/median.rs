//! Sliding median with windows truncated at the run boundaries.

use crate::error::{Result, StudioError};

pub fn check_kernel(kernel_size: usize) -> Result<()> {
    if kernel_size == 0 || kernel_size % 2 == 0 {
        return Err(StudioError::invalid(format!("median kernel size must be odd and positive, got {kernel_size}")));
    }
    Ok(())
}

fn median_of(window: &mut [f64]) -> f64 {
    window.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let len = window.len();
    if len % 2 == 0 {
        (window[len / 2 - 1] + window[len / 2]) / 2.0
    } else {
        window[len / 2]
    }
}

pub fn median(x: &[f64], kernel_size: usize) -> Result<Vec<f64>> {
    check_kernel(kernel_size)?;
    let half = kernel_size / 2;
    let n = x.len();
    let mut scratch = Vec::with_capacity(kernel_size.min(n));
    Ok((0..n)
        .map(|i| {
            scratch.clear();
            scratch.extend_from_slice(&x[i.saturating_sub(half)..i.saturating_add(half).saturating_add(1).min(n)]);
            median_of(&mut scratch)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_isolated_spike() {
        let x = [1.0, 1.0, 1.0, 50.0, 1.0, 1.0, 1.0];
        for k in [3, 5, 7] {
            let y = median(&x, k).unwrap();
            assert_eq!(y[3], 1.0, "kernel {k}");
        }
    }

    #[test]
    fn truncates_at_edges_instead_of_wrapping() {
        let x = [10.0, 0.0, 0.0, 0.0, 20.0];
        let y = median(&x, 3).unwrap();
        assert_eq!(y[0], 5.0);
        assert_eq!(y[4], 10.0);
    }

    #[test]
    fn kernel_wider_than_the_run_uses_the_whole_run() {
        assert_eq!(median(&[1.0, 2.0, 3.0], usize::MAX).unwrap(), [2.0, 2.0, 2.0]);
        assert_eq!(median(&[4.0, 1.0], 101).unwrap(), [2.5, 2.5]);
    }

    #[test]
    fn even_kernel_is_rejected() {
        assert!(matches!(median(&[1.0], 4), Err(StudioError::InvalidParameter(_))));
        assert!(matches!(median(&[1.0], 0), Err(StudioError::InvalidParameter(_))));
    }
}
