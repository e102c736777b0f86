//! A single marker's trajectory and the frame-range type used to address it.

use std::fmt;
use std::ops::RangeInclusive;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use super::sample::{Quality, Sample};
use crate::error::{Result, StudioError};

/// Inclusive frame range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: usize,
    pub end: usize,
}

impl FrameRange {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub const fn single(frame: usize) -> Self {
        Self { start: frame, end: frame }
    }

    /// The range covering every frame of a series of `frame_count` frames.
    /// Returns `None` for an empty series.
    pub fn full(frame_count: usize) -> Option<Self> {
        frame_count.checked_sub(1).map(|last| Self::new(0, last))
    }

    /// Number of frames covered (at least 1 for a well-formed range).
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn contains(&self, frame: usize) -> bool {
        frame >= self.start && frame <= self.end
    }

    pub fn overlaps(&self, other: &FrameRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn frames(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }

    /// Fails with [`StudioError::Range`] when inverted or past the last frame.
    pub fn validate(&self, frame_count: usize) -> Result<()> {
        if self.start > self.end || self.end >= frame_count {
            return Err(StudioError::Range { range: *self, frame_count });
        }
        Ok(())
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Trajectory of one marker over all frames of a dataset.
///
/// Series are treated as immutable values: every edit returns a new series
/// with a bumped `version`, leaving the previous value intact for anyone who
/// still holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerSeries {
    name: String,
    samples: Vec<Sample>,
    version: u64,
}

impl MarkerSeries {
    pub fn new(name: impl Into<String>, samples: Vec<Sample>) -> Self {
        Self { name: name.into(), samples, version: 0 }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn sample(&self, frame: usize) -> Option<&Sample> {
        self.samples.get(frame)
    }

    pub fn position(&self, frame: usize) -> Option<Point3<f64>> {
        self.samples.get(frame).and_then(|s| s.position())
    }

    pub fn quality(&self, frame: usize) -> Option<Quality> {
        self.samples.get(frame).map(|s| s.quality())
    }

    /// Positions within `range` as `[x, y, z]`; `None` for gaps.
    pub fn coords(&self, range: FrameRange) -> Vec<Option<[f64; 3]>> {
        range.frames().map(|f| self.samples.get(f).and_then(Sample::xyz)).collect()
    }

    /// Number of present samples inside `range`.
    pub fn valid_count(&self, range: FrameRange) -> usize {
        range.frames().filter(|&f| self.position(f).is_some()).count()
    }

    /// Maximal runs of present samples inside `range`.
    pub fn valid_runs(&self, range: FrameRange) -> Vec<FrameRange> {
        self.runs(range, true)
    }

    /// Maximal runs of missing samples inside `range`.
    pub fn missing_runs(&self, range: FrameRange) -> Vec<FrameRange> {
        self.runs(range, false)
    }

    fn runs(&self, range: FrameRange, present: bool) -> Vec<FrameRange> {
        let mut out = Vec::new();
        let mut open: Option<usize> = None;
        let last = range.end.min(self.samples.len().saturating_sub(1));
        if self.samples.is_empty() || range.start > last {
            return out;
        }
        for f in range.start..=last {
            let matches = self.samples[f].position().is_some() == present;
            match (matches, open) {
                (true, None) => open = Some(f),
                (false, Some(s)) => {
                    out.push(FrameRange::new(s, f - 1));
                    open = None;
                }
                _ => {}
            }
        }
        if let Some(s) = open {
            out.push(FrameRange::new(s, last));
        }
        out
    }

    /// Nearest frame strictly before `frame` holding a position.
    pub fn prev_valid(&self, frame: usize) -> Option<usize> {
        (0..frame.min(self.samples.len())).rev().find(|&f| self.samples[f].position().is_some())
    }

    /// Nearest frame strictly after `frame` holding a position.
    pub fn next_valid(&self, frame: usize) -> Option<usize> {
        (frame + 1..self.samples.len()).find(|&f| self.samples[f].position().is_some())
    }

    /// Returns a new version of this series with `range` replaced by `new_samples`.
    pub fn replace_range(&self, range: FrameRange, new_samples: &[Sample]) -> Result<MarkerSeries> {
        range.validate(self.samples.len())?;
        if new_samples.len() != range.len() {
            return Err(StudioError::invalid(format!(
                "replacement for {range} needs {} samples, got {}",
                range.len(),
                new_samples.len()
            )));
        }
        let mut samples = self.samples.clone();
        samples[range.start..=range.end].copy_from_slice(new_samples);
        Ok(MarkerSeries { name: self.name.clone(), samples, version: self.version + 1 })
    }

    /// Applies `f` to every sample in `range`, producing a new version.
    pub fn map_range(&self, range: FrameRange, mut f: impl FnMut(usize, Sample) -> Sample) -> Result<MarkerSeries> {
        range.validate(self.samples.len())?;
        let replaced: Vec<Sample> = range.frames().map(|i| f(i, self.samples[i])).collect();
        self.replace_range(range, &replaced)
    }

    /// Last `length` present positions up to and including `frame`, oldest first.
    pub fn trail(&self, frame: usize, length: usize) -> Vec<Point3<f64>> {
        if self.samples.is_empty() || length == 0 {
            return Vec::new();
        }
        let end = frame.min(self.samples.len() - 1);
        let start = end.saturating_sub(length - 1);
        self.samples[start..=end].iter().filter_map(Sample::position).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(pattern: &str) -> MarkerSeries {
        let samples = pattern
            .chars()
            .enumerate()
            .map(|(i, c)| if c == '.' { Sample::missing() } else { Sample::original(Point3::new(i as f64, 0.0, 0.0)) })
            .collect();
        MarkerSeries::new("m", samples)
    }

    #[test]
    fn runs_split_on_gaps() {
        let s = series("xx..x.xxx");
        let full = FrameRange::full(s.len()).unwrap();
        assert_eq!(s.valid_runs(full), vec![FrameRange::new(0, 1), FrameRange::new(4, 4), FrameRange::new(6, 8)]);
        assert_eq!(s.missing_runs(full), vec![FrameRange::new(2, 3), FrameRange::new(5, 5)]);
        assert_eq!(s.valid_runs(FrameRange::new(3, 6)), vec![FrameRange::new(4, 4), FrameRange::new(6, 6)]);
    }

    #[test]
    fn replace_range_bumps_version_and_keeps_source() {
        let s = series("xxxx");
        let out = s.replace_range(FrameRange::new(1, 2), &[Sample::missing(), Sample::missing()]).unwrap();
        assert_eq!(out.version(), 1);
        assert!(out.position(1).is_none());
        assert!(s.position(1).is_some());
    }

    #[test]
    fn replace_range_rejects_out_of_bounds_and_inverted() {
        let s = series("xxxx");
        assert!(matches!(s.replace_range(FrameRange::new(3, 4), &[Sample::missing(); 2]), Err(StudioError::Range { .. })));
        assert!(matches!(s.replace_range(FrameRange::new(2, 1), &[]), Err(StudioError::Range { .. })));
    }

    #[test]
    fn neighbours_skip_gaps() {
        let s = series("x..x");
        assert_eq!(s.prev_valid(2), Some(0));
        assert_eq!(s.next_valid(1), Some(3));
        assert_eq!(s.prev_valid(0), None);
        assert_eq!(s.next_valid(3), None);
    }

    #[test]
    fn trail_skips_missing_frames() {
        let s = series("xx.xx");
        assert_eq!(s.trail(4, 3).len(), 2);
        assert_eq!(s.trail(1, 10).len(), 2);
    }
}
