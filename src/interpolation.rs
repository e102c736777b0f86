//! Gap filling: pattern-matched interpolation from reference markers, with
//! numeric fallbacks.
//!
//! A gap is a maximal run of missing samples inside the requested range. It is
//! anchored by the nearest present samples before and after it; a gap without
//! both anchors touches a series boundary and cannot be filled.

use nalgebra::{DMatrix, DVector, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::data::sample::Sample;
use crate::data::series::{FrameRange, MarkerSeries};
use crate::error::{Result, StudioError};

/// Numeric method used when no reference marker matches well enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackKind {
    /// Straight line between the two anchors.
    Linear,
    /// Each missing frame copies the nearer anchor; ties take the earlier one.
    Nearest,
    /// Natural cubic spline through the samples in the surrounding windows.
    CubicSpline,
    /// Least-squares polynomial through the samples in the surrounding
    /// windows. The degree is capped at the number of samples minus one.
    Polynomial { order: usize },
}

impl FallbackKind {
    pub fn validate(&self) -> Result<()> {
        if let FallbackKind::Polynomial { order: 0 } = self {
            return Err(StudioError::invalid("polynomial fallback order must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternOptions {
    /// Frames before the gap (anchor included) used to compare trajectories.
    pub lookback: usize,
    /// Frames after the gap (anchor included) used to compare trajectories.
    pub lookahead: usize,
    /// Minimum shape similarity in `(-inf, 1]` a reference must reach.
    pub min_similarity: f64,
    pub fallback: FallbackKind,
}

impl Default for PatternOptions {
    fn default() -> Self {
        Self { lookback: 10, lookahead: 10, min_similarity: 0.8, fallback: FallbackKind::CubicSpline }
    }
}

impl PatternOptions {
    pub fn validate(&self) -> Result<()> {
        if self.lookback == 0 || self.lookahead == 0 {
            return Err(StudioError::invalid("pattern windows must cover at least one frame"));
        }
        if !self.min_similarity.is_finite() || self.min_similarity > 1.0 {
            return Err(StudioError::invalid(format!(
                "minimum similarity must be finite and at most 1, got {}",
                self.min_similarity
            )));
        }
        self.fallback.validate()
    }
}

/// How one gap was filled.
#[derive(Debug, Clone, PartialEq)]
pub enum FillMethod {
    Pattern { reference: String, similarity: f64 },
    Fallback(FallbackKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GapFill {
    pub gap: FrameRange,
    pub method: FillMethod,
}

/// New series version plus a record of what happened to each gap.
#[derive(Debug, Clone)]
pub struct Interpolation {
    pub series: MarkerSeries,
    pub fills: Vec<GapFill>,
}

#[derive(Debug, Clone, Copy)]
struct Anchored {
    gap: FrameRange,
    before: usize,
    after: usize,
}

fn anchored_gaps(series: &MarkerSeries, range: FrameRange) -> Result<Vec<Anchored>> {
    range.validate(series.len())?;
    series
        .missing_runs(range)
        .into_iter()
        .map(|gap| match (series.prev_valid(gap.start), series.next_valid(gap.end)) {
            (Some(before), Some(after)) => Ok(Anchored { gap, before, after }),
            _ => Err(StudioError::UnboundedGap { marker: series.name().to_string(), gap }),
        })
        .collect()
}

/// Frames of the comparison windows around a gap anchored at `a` and `b`.
fn window_frames(a: usize, b: usize, len: usize, options: &PatternOptions) -> impl Iterator<Item = usize> {
    let pre = a.saturating_sub(options.lookback - 1)..=a;
    let post = b..=(b + options.lookahead - 1).min(len - 1);
    pre.chain(post)
}

/// Shape similarity of `target` and `reference` around a gap: one minus the
/// residual of the best-fit translation relative to the target's own spread.
fn similarity(target: &MarkerSeries, reference: &MarkerSeries, at: Anchored, options: &PatternOptions) -> Option<f64> {
    let pairs: Vec<(Vector3<f64>, Vector3<f64>)> = window_frames(at.before, at.after, target.len(), options)
        .filter_map(|f| Some((target.position(f)?.coords, reference.position(f)?.coords)))
        .collect();
    if pairs.is_empty() {
        return None;
    }
    let n = pairs.len() as f64;
    let offset = pairs.iter().map(|(t, r)| t - r).sum::<Vector3<f64>>() / n;
    let mean = pairs.iter().map(|(t, _)| *t).sum::<Vector3<f64>>() / n;
    let ssd: f64 = pairs.iter().map(|(t, r)| (t - r - offset).norm_squared()).sum();
    let sst: f64 = pairs.iter().map(|(t, _)| (t - mean).norm_squared()).sum();
    const EPS: f64 = 1e-12;
    if sst <= EPS {
        return Some(if ssd <= EPS { 1.0 } else { 0.0 });
    }
    Some(1.0 - ssd / sst)
}

fn spans_gap(reference: &MarkerSeries, at: Anchored) -> bool {
    (at.before..=at.after).all(|f| reference.position(f).is_some())
}

/// Natural cubic spline through `(x, y)` knots with strictly increasing `x`.
struct NaturalSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    second: Vec<f64>,
}

impl NaturalSpline {
    fn fit(xs: Vec<f64>, ys: Vec<f64>) -> Self {
        let n = xs.len();
        let mut second = vec![0.0; n];
        if n > 2 {
            // Thomas algorithm over the interior knots.
            let m = n - 2;
            let mut diag = vec![0.0; m];
            let mut upper = vec![0.0; m];
            let mut rhs = vec![0.0; m];
            for k in 0..m {
                let i = k + 1;
                let h0 = xs[i] - xs[i - 1];
                let h1 = xs[i + 1] - xs[i];
                diag[k] = 2.0 * (h0 + h1);
                upper[k] = h1;
                rhs[k] = 6.0 * ((ys[i + 1] - ys[i]) / h1 - (ys[i] - ys[i - 1]) / h0);
                if k > 0 {
                    let w = h0 / diag[k - 1];
                    diag[k] -= w * upper[k - 1];
                    rhs[k] -= w * rhs[k - 1];
                }
            }
            for k in (0..m).rev() {
                let next = if k + 1 < m { second[k + 2] } else { 0.0 };
                second[k + 1] = (rhs[k] - upper[k] * next) / diag[k];
            }
        }
        Self { xs, ys, second }
    }

    fn eval(&self, x: f64) -> f64 {
        let last = self.xs.len() - 1;
        let i = match self.xs.iter().rposition(|&k| k <= x) {
            Some(i) if i < last => i,
            Some(_) => last - 1,
            None => 0,
        };
        let (x0, x1) = (self.xs[i], self.xs[i + 1]);
        let (y0, y1) = (self.ys[i], self.ys[i + 1]);
        let (m0, m1) = (self.second[i], self.second[i + 1]);
        let h = x1 - x0;
        let (l, r) = (x1 - x, x - x0);
        m0 * l.powi(3) / (6.0 * h) + m1 * r.powi(3) / (6.0 * h) + (y0 / h - m0 * h / 6.0) * l + (y1 / h - m1 * h / 6.0) * r
    }
}

/// Least-squares polynomial over an abscissa centred and scaled to `[-1, 1]`.
struct Polynomial {
    center: f64,
    scale: f64,
    coef: Vec<f64>,
}

impl Polynomial {
    /// `None` if the normal equations are singular.
    fn fit(xs: &[f64], ys: &[f64], order: usize) -> Option<Self> {
        let (lo, hi) = (*xs.first()?, *xs.last()?);
        let center = (lo + hi) / 2.0;
        let scale = ((hi - lo) / 2.0).max(1.0);
        let terms = order.min(xs.len() - 1) + 1;
        let mut normal = DMatrix::<f64>::zeros(terms, terms);
        let mut rhs = DVector::<f64>::zeros(terms);
        for (&x, &y) in xs.iter().zip(ys) {
            let t = (x - center) / scale;
            let powers: Vec<f64> = (0..2 * terms).map(|p| t.powi(p as i32)).collect();
            for a in 0..terms {
                rhs[a] += powers[a] * y;
                for b in 0..terms {
                    normal[(a, b)] += powers[a + b];
                }
            }
        }
        let coef = normal.lu().solve(&rhs)?;
        coef.iter().all(|c| c.is_finite()).then(|| Self { center, scale, coef: coef.iter().copied().collect() })
    }

    fn eval(&self, x: f64) -> f64 {
        let t = (x - self.center) / self.scale;
        self.coef.iter().rev().fold(0.0, |acc, c| acc * t + c)
    }
}

enum Curve {
    Spline(NaturalSpline),
    Polynomial(Polynomial),
}

impl Curve {
    fn fit(xs: &[f64], ys: Vec<f64>, kind: FallbackKind) -> Self {
        if let FallbackKind::Polynomial { order } = kind {
            match Polynomial::fit(xs, &ys, order) {
                Some(p) => return Curve::Polynomial(p),
                None => tracing::debug!(order, "singular polynomial fit, using a spline"),
            }
        }
        Curve::Spline(NaturalSpline::fit(xs.to_vec(), ys))
    }

    fn eval(&self, x: f64) -> f64 {
        match self {
            Curve::Spline(s) => s.eval(x),
            Curve::Polynomial(p) => p.eval(x),
        }
    }
}

fn numeric_fill(series: &MarkerSeries, at: Anchored, kind: FallbackKind, options: &PatternOptions) -> Vec<Point3<f64>> {
    let knots: Vec<(usize, Point3<f64>)> = match kind {
        FallbackKind::Nearest => {
            return at
                .gap
                .frames()
                .filter_map(|f| series.position(if f - at.before <= at.after - f { at.before } else { at.after }))
                .collect();
        }
        FallbackKind::Linear => [at.before, at.after].iter().filter_map(|&f| Some((f, series.position(f)?))).collect(),
        FallbackKind::CubicSpline | FallbackKind::Polynomial { .. } => window_frames(at.before, at.after, series.len(), options)
            .filter_map(|f| Some((f, series.position(f)?)))
            .collect(),
    };
    let xs: Vec<f64> = knots.iter().map(|(f, _)| *f as f64).collect();
    let curves: Vec<Curve> = (0..3).map(|axis| Curve::fit(&xs, knots.iter().map(|(_, p)| p[axis]).collect(), kind)).collect();
    at.gap
        .frames()
        .map(|f| Point3::new(curves[0].eval(f as f64), curves[1].eval(f as f64), curves[2].eval(f as f64)))
        .collect()
}

fn pattern_fill(target: &MarkerSeries, reference: &MarkerSeries, at: Anchored) -> Option<Vec<Point3<f64>>> {
    let base = target.position(at.before)?;
    let origin = reference.position(at.before)?;
    at.gap.frames().map(|f| Some(base + (reference.position(f)? - origin))).collect()
}

fn write_gap(out: &mut [Sample], range: FrameRange, gap: FrameRange, points: Vec<Point3<f64>>) {
    for (f, p) in gap.frames().zip(points) {
        out[f - range.start] = Sample::interpolated(p);
    }
}

/// Fills every gap inside `range` of `target`, preferring the best-matching
/// reference trajectory and falling back to `options.fallback`.
///
/// Fails with [`StudioError::UnboundedGap`] if any gap in the range touches a
/// series boundary; in that case nothing is filled.
pub fn interpolate(
    target: &MarkerSeries,
    range: FrameRange,
    references: &[&MarkerSeries],
    options: &PatternOptions,
) -> Result<Interpolation> {
    options.validate()?;
    let gaps = anchored_gaps(target, range)?;
    let mut out: Vec<Sample> = target.samples()[range.start..=range.end].to_vec();
    let mut fills = Vec::with_capacity(gaps.len());

    for at in gaps {
        let best = references
            .iter()
            .filter(|r| r.name() != target.name() && r.len() == target.len() && spans_gap(r, at))
            .filter_map(|r| similarity(target, r, at, options).map(|s| (*r, s)))
            .filter(|(_, s)| *s >= options.min_similarity)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        let patterned = best.and_then(|(r, s)| pattern_fill(target, r, at).map(|pts| (r, s, pts)));
        let method = match patterned {
            Some((reference, similarity, points)) => {
                write_gap(&mut out, range, at.gap, points);
                tracing::debug!(marker = target.name(), gap = %at.gap, reference = reference.name(), similarity, "pattern fill");
                FillMethod::Pattern { reference: reference.name().to_string(), similarity }
            }
            None => {
                write_gap(&mut out, range, at.gap, numeric_fill(target, at, options.fallback, options));
                tracing::debug!(marker = target.name(), gap = %at.gap, fallback = ?options.fallback, "no matching reference");
                FillMethod::Fallback(options.fallback)
            }
        };
        fills.push(GapFill { gap: at.gap, method });
    }

    Ok(Interpolation { series: target.replace_range(range, &out)?, fills })
}

/// Fills every gap inside `range` numerically, without reference markers.
pub fn fill_gap(target: &MarkerSeries, range: FrameRange, kind: FallbackKind, options: &PatternOptions) -> Result<Interpolation> {
    options.validate()?;
    kind.validate()?;
    let gaps = anchored_gaps(target, range)?;
    let mut out: Vec<Sample> = target.samples()[range.start..=range.end].to_vec();
    let fills = gaps
        .into_iter()
        .map(|at| {
            write_gap(&mut out, range, at.gap, numeric_fill(target, at, kind, options));
            GapFill { gap: at.gap, method: FillMethod::Fallback(kind) }
        })
        .collect();
    Ok(Interpolation { series: target.replace_range(range, &out)?, fills })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::Quality;

    fn series(name: &str, n: usize, gap: Option<FrameRange>, f: impl Fn(usize) -> Point3<f64>) -> MarkerSeries {
        let samples = (0..n)
            .map(|i| match gap {
                Some(g) if g.contains(i) => Sample::missing(),
                _ => Sample::original(f(i)),
            })
            .collect();
        MarkerSeries::new(name, samples)
    }

    #[test]
    fn spline_through_line_is_linear() {
        let s = NaturalSpline::fit(vec![0.0, 1.0, 4.0, 5.0], vec![1.0, 3.0, 9.0, 11.0]);
        assert!((s.eval(2.0) - 5.0).abs() < 1e-9);
        assert!((s.eval(3.0) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn pattern_copies_reference_displacement() {
        let wave = |i: usize| Point3::new((i as f64 * 0.3).sin(), i as f64 * 0.01, 0.0);
        let target = series("T", 40, Some(FrameRange::new(15, 19)), |i| wave(i) + Vector3::new(0.0, 0.0, 1.0));
        let reference = series("R", 40, None, wave);
        let out = interpolate(&target, FrameRange::new(10, 25), &[&reference], &PatternOptions::default()).unwrap();
        assert!(matches!(out.fills[0].method, FillMethod::Pattern { ref reference, .. } if reference == "R"));
        for f in 15..=19 {
            let expected = wave(f) + Vector3::new(0.0, 0.0, 1.0);
            assert!((out.series.position(f).unwrap() - expected).norm() < 1e-9);
            assert_eq!(out.series.quality(f), Some(Quality::Interpolated));
        }
    }

    #[test]
    fn dissimilar_reference_falls_back() {
        let target = series("T", 30, Some(FrameRange::new(10, 12)), |i| Point3::new(i as f64, 0.0, 0.0));
        let reference = series("R", 30, None, |i| Point3::new(0.0, if i % 2 == 0 { 5.0 } else { -5.0 }, 0.0));
        let out = interpolate(&target, FrameRange::new(10, 12), &[&reference], &PatternOptions::default()).unwrap();
        assert_eq!(out.fills[0].method, FillMethod::Fallback(FallbackKind::CubicSpline));
        assert!((out.series.position(11).unwrap().x - 11.0).abs() < 1e-9);
    }

    #[test]
    fn boundary_gap_is_rejected() {
        let target = series("T", 20, Some(FrameRange::new(0, 3)), |i| Point3::new(i as f64, 0.0, 0.0));
        let err = fill_gap(&target, FrameRange::new(0, 5), FallbackKind::Linear, &PatternOptions::default());
        assert!(matches!(err, Err(StudioError::UnboundedGap { .. })));
    }

    #[test]
    fn linear_fill_between_anchors() {
        let target = series("T", 10, Some(FrameRange::new(3, 5)), |i| Point3::new(i as f64 * i as f64, 0.0, 0.0));
        let out = fill_gap(&target, FrameRange::new(3, 5), FallbackKind::Linear, &PatternOptions::default()).unwrap();
        // anchors at 2 (4.0) and 6 (36.0)
        assert!((out.series.position(4).unwrap().x - 20.0).abs() < 1e-9);
    }

    #[test]
    fn polynomial_degree_is_capped_by_the_samples() {
        let target = series("T", 10, Some(FrameRange::new(3, 5)), |i| Point3::new(i as f64 * i as f64, 0.0, 0.0));
        let options = PatternOptions { lookback: 1, lookahead: 1, ..Default::default() };
        let kind = FallbackKind::Polynomial { order: 5 };
        let out = fill_gap(&target, FrameRange::new(3, 5), kind, &options).unwrap();
        // Only the two anchors are available, so the fit is a line.
        assert!((out.series.position(4).unwrap().x - 20.0).abs() < 1e-9);
    }

    #[test]
    fn zero_order_polynomial_is_rejected() {
        assert!(FallbackKind::Polynomial { order: 0 }.validate().is_err());
        let options = PatternOptions { fallback: FallbackKind::Polynomial { order: 0 }, ..Default::default() };
        assert!(matches!(options.validate(), Err(StudioError::InvalidParameter(_))));
    }
}
