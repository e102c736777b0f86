//! Loaded marker datasets and the raw interchange model used for import/export.
//!
//! A [`Dataset`] is an immutable value: the current version of every marker
//! plus a shared, never-mutated snapshot of what was loaded. Edits produce new
//! series; reverting copies samples back out of the snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use super::sample::Sample;
use super::series::MarkerSeries;
pub use super::series::FrameRange;
use crate::error::{Result, StudioError};

/// Frame-major trajectory table exchanged with file readers/writers (TRC, C3D).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTrajectoryData {
    /// Capture rate in frames per second.
    pub frame_rate: f64,
    /// Marker labels in column order.
    pub marker_names: Vec<String>,
    /// `frames[frame][marker]`; `None` (or a short row) marks missing data.
    pub frames: Vec<Vec<Option<[f64; 3]>>>,
    /// Length unit of the coordinates, if the source declared one.
    #[serde(default)]
    pub units: Option<String>,
}

/// Snapshot of the data exactly as loaded.
#[derive(Debug)]
pub struct OriginalSnapshot {
    series: HashMap<String, MarkerSeries>,
    units: Option<String>,
}

impl OriginalSnapshot {
    pub fn series(&self, name: &str) -> Option<&MarkerSeries> {
        self.series.get(name)
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    frame_rate: f64,
    frame_count: usize,
    marker_order: Vec<String>,
    series: HashMap<String, Arc<MarkerSeries>>,
    original: Arc<OriginalSnapshot>,
}

impl Dataset {
    /// Builds one series per marker from a raw frame table.
    pub fn load(raw: &RawTrajectoryData) -> Result<Dataset> {
        if !raw.frame_rate.is_finite() || raw.frame_rate <= 0.0 {
            return Err(StudioError::FileFormat(format!("invalid frame rate {}", raw.frame_rate)));
        }
        if raw.marker_names.is_empty() {
            return Err(StudioError::FileFormat("no markers declared".into()));
        }
        if raw.frames.is_empty() {
            return Err(StudioError::FileFormat("no frames".into()));
        }
        let mut marker_order: Vec<String> = Vec::with_capacity(raw.marker_names.len());
        for name in &raw.marker_names {
            let name = name.trim();
            if name.is_empty() {
                return Err(StudioError::FileFormat("empty marker label".into()));
            }
            if marker_order.iter().any(|n| n == name) {
                return Err(StudioError::FileFormat(format!("duplicate marker label '{name}'")));
            }
            marker_order.push(name.to_string());
        }
        let n_markers = marker_order.len();
        let mut columns: Vec<Vec<Sample>> = vec![Vec::with_capacity(raw.frames.len()); n_markers];
        for (i, row) in raw.frames.iter().enumerate() {
            if row.len() > n_markers {
                return Err(StudioError::FileFormat(format!(
                    "frame {i} has {} entries for {n_markers} markers",
                    row.len()
                )));
            }
            for (m, column) in columns.iter_mut().enumerate() {
                column.push(Sample::from_xyz(row.get(m).copied().flatten()));
            }
        }

        let frame_count = raw.frames.len();
        let mut originals = HashMap::with_capacity(n_markers);
        let mut series = HashMap::with_capacity(n_markers);
        for (name, samples) in marker_order.iter().zip(columns) {
            let s = MarkerSeries::new(name.clone(), samples);
            series.insert(name.clone(), Arc::new(s.clone()));
            originals.insert(name.clone(), s);
        }
        tracing::info!(markers = n_markers, frames = frame_count, rate = raw.frame_rate, "dataset loaded");
        Ok(Dataset {
            frame_rate: raw.frame_rate,
            frame_count,
            marker_order,
            series,
            original: Arc::new(OriginalSnapshot { series: originals, units: raw.units.clone() }),
        })
    }

    pub(crate) fn from_parts(
        frame_rate: f64,
        frame_count: usize,
        marker_order: Vec<String>,
        series: HashMap<String, Arc<MarkerSeries>>,
        original: Arc<OriginalSnapshot>,
    ) -> Self {
        Self { frame_rate, frame_count, marker_order, series, original }
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn marker_names(&self) -> &[String] {
        &self.marker_order
    }

    pub fn contains(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }

    pub fn full_range(&self) -> FrameRange {
        FrameRange::new(0, self.frame_count - 1)
    }

    pub fn series(&self, name: &str) -> Result<&Arc<MarkerSeries>> {
        self.series.get(name).ok_or_else(|| StudioError::NotFound(name.to_string()))
    }

    pub fn original(&self) -> &Arc<OriginalSnapshot> {
        &self.original
    }

    pub fn original_series(&self, name: &str) -> Result<&MarkerSeries> {
        self.original.series(name).ok_or_else(|| StudioError::NotFound(name.to_string()))
    }

    /// Position of `name` at `frame`; `Ok(None)` for a gap.
    pub fn position(&self, name: &str, frame: usize) -> Result<Option<Point3<f64>>> {
        let s = self.series(name)?;
        if frame >= self.frame_count {
            return Err(StudioError::Range { range: FrameRange::single(frame), frame_count: self.frame_count });
        }
        Ok(s.position(frame))
    }

    /// All markers that have a position at `frame`, in marker order.
    pub fn frame_positions(&self, frame: usize) -> Vec<(&str, Point3<f64>)> {
        self.marker_order
            .iter()
            .filter_map(|n| self.series.get(n).and_then(|s| s.position(frame)).map(|p| (n.as_str(), p)))
            .collect()
    }

    /// New version of `name` with `range` replaced; the dataset itself is unchanged.
    pub fn replace_range(&self, name: &str, range: FrameRange, samples: &[Sample]) -> Result<MarkerSeries> {
        range.validate(self.frame_count)?;
        self.series(name)?.replace_range(range, samples)
    }

    /// New version of `name` with `range` copied back from the original snapshot.
    pub fn revert_range(&self, name: &str, range: FrameRange) -> Result<MarkerSeries> {
        range.validate(self.frame_count)?;
        let original = self.original_series(name)?;
        let current = self.series(name)?;
        current.replace_range(range, &original.samples()[range.start..=range.end])
    }

    /// A dataset sharing everything with `self` except the given series.
    pub fn with_series(&self, series: MarkerSeries) -> Result<Dataset> {
        if !self.series.contains_key(series.name()) {
            return Err(StudioError::NotFound(series.name().to_string()));
        }
        if series.len() != self.frame_count {
            return Err(StudioError::invalid(format!(
                "series '{}' has {} frames, dataset has {}",
                series.name(),
                series.len(),
                self.frame_count
            )));
        }
        let mut next = self.clone();
        next.series.insert(series.name().to_string(), Arc::new(series));
        Ok(next)
    }

    /// Converts the current versions back to the raw frame-major table.
    pub fn export(&self) -> RawTrajectoryData {
        let columns: Vec<&Arc<MarkerSeries>> = self.marker_order.iter().filter_map(|n| self.series.get(n)).collect();
        let frames = (0..self.frame_count)
            .map(|f| columns.iter().map(|s| s.sample(f).and_then(Sample::xyz)).collect())
            .collect();
        RawTrajectoryData {
            frame_rate: self.frame_rate,
            marker_names: self.marker_order.clone(),
            frames,
            units: self.original.units.clone(),
        }
    }
}
