//! Distances and angles between picked markers at one frame.
//!
//! Segment angle sign convention: for reference axis `u` and segment vector
//! `v`, the two remaining axes are taken in cyclic order (X→Y→Z→X). The one on
//! which `v` has the larger absolute component (the first one on ties) spans
//! the dominant plane together with `u`; the third axis `n` is its normal. The
//! angle is positive when `(u × v) · n >= 0`. A segment parallel to `u` has no
//! dominant plane: it measures 0° or 180° and is flagged `degenerate`. A
//! zero-length segment (both picks at the same position) measures 0° and is
//! flagged `degenerate` as well.

use std::fmt;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};

/// Relative size below which the off-axis part of a segment counts as zero.
const PARALLEL_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Axis {
    #[default]
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Next axis in the X → Y → Z → X cycle.
    pub fn next(self) -> Axis {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::Z,
            Axis::Z => Axis::X,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn unit(self) -> Vector3<f64> {
        let mut v = Vector3::zeros();
        v[self.index()] = 1.0;
        v
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentAngle {
    pub axis: Axis,
    /// Signed angle in degrees, within [-180, 180].
    pub degrees: f64,
    /// Segment parallel to the axis or of zero length; the sign carries no
    /// information.
    pub degenerate: bool,
}

impl SegmentAngle {
    pub fn unsigned(&self) -> f64 {
        self.degrees.abs()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMeasurement {
    pub from: String,
    pub to: String,
    pub frame: usize,
    pub distance: f64,
    pub angle: SegmentAngle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointMeasurement {
    pub first: String,
    pub vertex: String,
    pub last: String,
    pub frame: usize,
    /// Angle at the vertex in degrees, within [0, 180].
    pub degrees: f64,
}

/// Outcome of measuring a two- or three-point selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MeasurementResult {
    Segment(SegmentMeasurement),
    Joint(JointMeasurement),
}

impl MeasurementResult {
    pub fn frame(&self) -> usize {
        match self {
            MeasurementResult::Segment(s) => s.frame,
            MeasurementResult::Joint(j) => j.frame,
        }
    }
}

pub fn distance(a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    (b - a).norm()
}

fn unit_or_err(v: Vector3<f64>, what: &str) -> Result<Vector3<f64>> {
    let n = v.norm();
    if !n.is_finite() || n <= f64::EPSILON {
        return Err(StudioError::invalid(format!("{what} has zero length")));
    }
    Ok(v / n)
}

/// Angle between the segment `a → b` and `axis`, signed as described in the module docs.
pub fn segment_angle(a: &Point3<f64>, b: &Point3<f64>, axis: Axis) -> Result<SegmentAngle> {
    let v = b - a;
    let n = v.norm();
    if !n.is_finite() {
        return Err(StudioError::invalid("segment endpoints are not finite"));
    }
    if n <= f64::EPSILON {
        return Ok(SegmentAngle { axis, degrees: 0.0, degenerate: true });
    }
    let dir = v / n;
    let u = axis.unit();
    let unsigned = dir.dot(&u).clamp(-1.0, 1.0).acos().to_degrees();

    let j = axis.next();
    let k = j.next();
    let (vj, vk) = (dir[j.index()].abs(), dir[k.index()].abs());
    if vj.max(vk) <= PARALLEL_EPS {
        let degrees = if dir.dot(&u) >= 0.0 { 0.0 } else { 180.0 };
        return Ok(SegmentAngle { axis, degrees, degenerate: true });
    }
    let normal = if vk > vj { j } else { k };
    let sign = if u.cross(&dir).dot(&normal.unit()) >= 0.0 { 1.0 } else { -1.0 };
    Ok(SegmentAngle { axis, degrees: sign * unsigned, degenerate: false })
}

/// Angle at `vertex` between the arms towards `a` and `c`, in degrees.
pub fn joint_angle(a: &Point3<f64>, vertex: &Point3<f64>, c: &Point3<f64>) -> Result<f64> {
    let ba = unit_or_err(a - vertex, "first arm")?;
    let bc = unit_or_err(c - vertex, "second arm")?;
    Ok(ba.dot(&bc).clamp(-1.0, 1.0).acos().to_degrees())
}

/// Measures two or three `(marker, position)` picks at `frame`.
pub fn measure(points: &[(&str, Point3<f64>)], frame: usize, axis: Axis) -> Result<MeasurementResult> {
    match points {
        [(from, a), (to, b)] => Ok(MeasurementResult::Segment(SegmentMeasurement {
            from: from.to_string(),
            to: to.to_string(),
            frame,
            distance: distance(a, b),
            angle: segment_angle(a, b, axis)?,
        })),
        [(first, a), (vertex, b), (last, c)] => Ok(MeasurementResult::Joint(JointMeasurement {
            first: first.to_string(),
            vertex: vertex.to_string(),
            last: last.to_string(),
            frame,
            degrees: joint_angle(a, b, c)?,
        })),
        _ => Err(StudioError::invalid(format!("measurement needs 2 or 3 points, got {}", points.len()))),
    }
}
