//! Finite-difference velocity and acceleration of marker trajectories.

use nalgebra::Vector3;

use super::series::MarkerSeries;

/// Central-difference velocity `(x[i+1] - x[i-1]) / 2dt`. `None` where a neighbour is missing
/// and at both series ends.
pub fn velocity(series: &MarkerSeries, frame_rate: f64) -> Vec<Option<Vector3<f64>>> {
    let n = series.len();
    (0..n)
        .map(|i| {
            if i == 0 || i + 1 >= n {
                return None;
            }
            let prev = series.position(i - 1)?;
            series.position(i)?;
            let next = series.position(i + 1)?;
            Some((next - prev) * (frame_rate * 0.5))
        })
        .collect()
}

/// Magnitude of [`velocity`].
pub fn speed(series: &MarkerSeries, frame_rate: f64) -> Vec<Option<f64>> {
    velocity(series, frame_rate).into_iter().map(|v| v.map(|v| v.norm())).collect()
}

/// Backward-difference speed `|x[i] - x[i-1]| / dt`, attributed to frame `i`.
pub fn step_speed(series: &MarkerSeries, frame_rate: f64) -> Vec<Option<f64>> {
    (0..series.len())
        .map(|i| {
            if i == 0 {
                return None;
            }
            let prev = series.position(i - 1)?;
            let cur = series.position(i)?;
            Some((cur - prev).norm() * frame_rate)
        })
        .collect()
}

/// Second-difference acceleration magnitude `|x[i+1] - 2x[i] + x[i-1]| / dt²`.
pub fn acceleration(series: &MarkerSeries, frame_rate: f64) -> Vec<Option<f64>> {
    let n = series.len();
    let fr2 = frame_rate * frame_rate;
    (0..n)
        .map(|i| {
            if i == 0 || i + 1 >= n {
                return None;
            }
            let prev = series.position(i - 1)?.coords;
            let cur = series.position(i)?.coords;
            let next = series.position(i + 1)?.coords;
            Some((next - cur * 2.0 + prev).norm() * fr2)
        })
        .collect()
}
