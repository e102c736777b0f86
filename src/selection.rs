//! Analysis-mode marker selection: up to three picks and their measurement.
//!
//! Picks advance `Empty → One → Two → Three`; a pick in `Three` starts a new
//! set holding only that pick. Entering `Two` or `Three` measures the set
//! immediately. The result is cached and only recomputed when the frame, the
//! reference axis or one of the picked positions changes.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::data::dataset::Dataset;
use crate::error::{Result, StudioError};
use crate::measurement::{self, Axis, MeasurementResult};

pub const MAX_PICKS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PickedPoint {
    pub marker: String,
    pub frame: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectionState {
    Empty,
    One,
    Two,
    Three,
}

/// Ordered picks of the current selection, at most [`MAX_PICKS`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSet {
    points: Vec<PickedPoint>,
}

impl SelectionSet {
    pub fn points(&self) -> &[PickedPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn contains(&self, marker: &str) -> bool {
        self.points.iter().any(|p| p.marker == marker)
    }

    pub fn markers(&self) -> impl Iterator<Item = &str> {
        self.points.iter().map(|p| p.marker.as_str())
    }

    pub fn state(&self) -> SelectionState {
        match self.points.len() {
            0 => SelectionState::Empty,
            1 => SelectionState::One,
            2 => SelectionState::Two,
            _ => SelectionState::Three,
        }
    }
}

/// Returned by every pick: the resulting set and, in `Two`/`Three`, its measurement.
#[derive(Debug)]
pub struct SelectionUpdate {
    pub selection: SelectionSet,
    pub measurement: Option<Result<MeasurementResult>>,
}

#[derive(Debug, Clone, PartialEq)]
struct CacheKey {
    set: SelectionSet,
    frame: usize,
    axis: Axis,
    positions: Vec<Point3<f64>>,
}

#[derive(Debug)]
pub struct SelectionMachine {
    set: SelectionSet,
    axis: Axis,
    /// Frame the current set was started at.
    anchor_frame: Option<usize>,
    frame: usize,
    frame_tolerance: usize,
    cache: Option<(CacheKey, MeasurementResult)>,
}

impl SelectionMachine {
    pub fn new(frame_tolerance: usize) -> Self {
        Self { set: SelectionSet::default(), axis: Axis::X, anchor_frame: None, frame: 0, frame_tolerance, cache: None }
    }

    pub fn state(&self) -> SelectionState {
        self.set.state()
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.set
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Forces the machine back to `Empty`.
    pub fn clear(&mut self) {
        self.set.points.clear();
        self.anchor_frame = None;
        self.cache = None;
    }

    pub fn deactivate(&mut self) {
        self.clear();
    }

    pub fn dataset_reloaded(&mut self) {
        self.clear();
        self.frame = 0;
    }

    /// Moves the current frame. Returns `true` if the move exceeded the
    /// tolerance and the selection was cleared.
    pub fn frame_changed(&mut self, frame: usize) -> bool {
        self.frame = frame;
        match self.anchor_frame {
            Some(anchor) if anchor.abs_diff(frame) > self.frame_tolerance => {
                self.clear();
                true
            }
            _ => false,
        }
    }

    /// Records a pick of `marker` at `frame`. A pick of a marker already in
    /// the current set is not accepted and leaves the state unchanged.
    pub fn record_pick(&mut self, marker: &str, frame: usize, dataset: &Dataset) -> Result<SelectionUpdate> {
        if !dataset.contains(marker) {
            return Err(StudioError::NotFound(marker.to_string()));
        }
        self.frame_changed(frame);
        if self.set.len() >= MAX_PICKS {
            self.clear();
        }
        if !self.set.contains(marker) {
            if self.set.is_empty() {
                self.anchor_frame = Some(frame);
            }
            self.set.points.push(PickedPoint { marker: marker.to_string(), frame });
        }
        Ok(self.update(dataset))
    }

    /// Advances the segment reference axis. Only meaningful in `Two`;
    /// returns the refreshed update there and `None` otherwise.
    pub fn cycle_axis(&mut self, dataset: &Dataset) -> Option<SelectionUpdate> {
        if self.state() != SelectionState::Two {
            return None;
        }
        self.axis = self.axis.next();
        Some(self.update(dataset))
    }

    fn update(&mut self, dataset: &Dataset) -> SelectionUpdate {
        let measurement = match self.state() {
            SelectionState::Two | SelectionState::Three => Some(self.measurement(dataset)),
            _ => None,
        };
        SelectionUpdate { selection: self.set.clone(), measurement }
    }

    /// Measurement of the current set at the current frame, served from the
    /// cache when nothing it depends on has changed.
    pub fn measurement(&mut self, dataset: &Dataset) -> Result<MeasurementResult> {
        let mut positions = Vec::with_capacity(self.set.len());
        for p in self.set.points() {
            match dataset.position(&p.marker, self.frame)? {
                Some(pos) => positions.push(pos),
                None => return Err(StudioError::IncompleteSelection { marker: p.marker.clone(), frame: self.frame }),
            }
        }
        let key = CacheKey { set: self.set.clone(), frame: self.frame, axis: self.axis, positions };
        if let Some((cached_key, result)) = &self.cache {
            if *cached_key == key {
                return Ok(result.clone());
            }
        }
        let named: Vec<(&str, Point3<f64>)> = self.set.markers().zip(key.positions.iter().copied()).collect();
        let result = measurement::measure(&named, self.frame, self.axis)?;
        tracing::debug!(frame = self.frame, axis = %self.axis, "measurement updated");
        self.cache = Some((key, result.clone()));
        Ok(result)
    }

    #[cfg(test)]
    fn is_cached(&self) -> bool {
        self.cache.is_some()
    }
}
