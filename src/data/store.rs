//! Thread-safe trajectory store with per-marker write serialization.
//!
//! Each marker lives in its own slot guarded by a mutex, so edits on different
//! markers never contend. Every write is tied to a [`RequestToken`]; only the
//! most recently issued token for a marker may commit, which makes background
//! computations last-request-wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::dataset::{Dataset, OriginalSnapshot, RawTrajectoryData};
use super::sample::Sample;
use super::series::{FrameRange, MarkerSeries};
use crate::error::{Result, StudioError};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Monotonically increasing ticket identifying one edit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    fn next() -> Self {
        RequestToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Result of trying to commit a computed series.
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    Applied(Arc<MarkerSeries>),
    /// A newer request for the same marker was issued; nothing was written.
    Superseded { token: RequestToken, latest: RequestToken },
}

impl CommitOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CommitOutcome::Applied(_))
    }
}

struct SlotState {
    series: Arc<MarkerSeries>,
    latest: RequestToken,
}

pub struct TrajectoryStore {
    frame_rate: f64,
    frame_count: usize,
    marker_order: Vec<String>,
    original: Arc<OriginalSnapshot>,
    slots: HashMap<String, Mutex<SlotState>>,
}

impl TrajectoryStore {
    pub fn new(dataset: &Dataset) -> Self {
        let mut slots = HashMap::with_capacity(dataset.marker_names().len());
        for name in dataset.marker_names() {
            if let Ok(series) = dataset.series(name) {
                slots.insert(
                    name.clone(),
                    Mutex::new(SlotState { series: Arc::clone(series), latest: RequestToken::next() }),
                );
            }
        }
        Self {
            frame_rate: dataset.frame_rate(),
            frame_count: dataset.frame_count(),
            marker_order: dataset.marker_names().to_vec(),
            original: Arc::clone(dataset.original()),
            slots,
        }
    }

    pub fn load(raw: &RawTrajectoryData) -> Result<Self> {
        Ok(Self::new(&Dataset::load(raw)?))
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

    fn slot(&self, name: &str) -> Result<&Mutex<SlotState>> {
        self.slots.get(name).ok_or_else(|| StudioError::NotFound(name.to_string()))
    }

    /// Consistent immutable view of all current series.
    pub fn snapshot(&self) -> Dataset {
        let series = self
            .slots
            .iter()
            .map(|(name, slot)| (name.clone(), Arc::clone(&slot.lock().series)))
            .collect();
        Dataset::from_parts(self.frame_rate, self.frame_count, self.marker_order.clone(), series, Arc::clone(&self.original))
    }

    pub fn series(&self, name: &str) -> Result<Arc<MarkerSeries>> {
        Ok(Arc::clone(&self.slot(name)?.lock().series))
    }

    /// Issues a new token for `name`; any older outstanding token becomes stale.
    pub fn begin(&self, name: &str) -> Result<RequestToken> {
        let mut slot = self.slot(name)?.lock();
        let token = RequestToken::next();
        slot.latest = token;
        Ok(token)
    }

    pub fn is_current(&self, name: &str, token: RequestToken) -> bool {
        self.slots.get(name).map(|s| s.lock().latest == token).unwrap_or(false)
    }

    /// Stores `series` if `token` is still the latest request for its marker.
    pub fn commit(&self, token: RequestToken, series: MarkerSeries) -> Result<CommitOutcome> {
        let name = series.name().to_string();
        if series.len() != self.frame_count {
            return Err(StudioError::invalid(format!(
                "series '{name}' has {} frames, store has {}",
                series.len(),
                self.frame_count
            )));
        }
        let mut slot = self.slot(&name)?.lock();
        if slot.latest != token {
            tracing::debug!(marker = %name, token = token.0, latest = slot.latest.0, "dropping superseded result");
            return Ok(CommitOutcome::Superseded { token, latest: slot.latest });
        }
        let series = Arc::new(series);
        slot.series = Arc::clone(&series);
        Ok(CommitOutcome::Applied(series))
    }

    /// Runs `edit` inside the marker's exclusive section and stores its result.
    ///
    /// Any background request still outstanding for the marker is superseded.
    /// On error the stored series is left as it was.
    pub fn update<F>(&self, name: &str, edit: F) -> Result<Arc<MarkerSeries>>
    where
        F: FnOnce(&MarkerSeries) -> Result<MarkerSeries>,
    {
        let mut slot = self.slot(name)?.lock();
        slot.latest = RequestToken::next();
        let next = edit(&slot.series)?;
        if next.len() != self.frame_count || next.name() != name {
            return Err(StudioError::invalid(format!("edit of '{name}' changed the series shape")));
        }
        let next = Arc::new(next);
        slot.series = Arc::clone(&next);
        Ok(next)
    }

    pub fn replace_range(&self, name: &str, range: FrameRange, samples: &[Sample]) -> Result<Arc<MarkerSeries>> {
        range.validate(self.frame_count)?;
        self.update(name, |s| s.replace_range(range, samples))
    }

    /// Restores `range` of `name` from the original snapshot.
    pub fn revert_range(&self, name: &str, range: FrameRange) -> Result<Arc<MarkerSeries>> {
        range.validate(self.frame_count)?;
        let original = self.original.series(name).ok_or_else(|| StudioError::NotFound(name.to_string()))?;
        self.update(name, |s| s.replace_range(range, &original.samples()[range.start..=range.end]))
    }

    /// Turns `range` of `name` into a gap.
    pub fn delete_range(&self, name: &str, range: FrameRange) -> Result<Arc<MarkerSeries>> {
        range.validate(self.frame_count)?;
        self.update(name, |s| s.replace_range(range, &vec![Sample::missing(); range.len()]))
    }

    pub fn revert_all(&self) {
        let Some(full) = FrameRange::full(self.frame_count) else { return };
        for name in &self.marker_order {
            if let Err(e) = self.revert_range(name, full) {
                tracing::warn!(marker = %name, error = %e, "revert failed");
            }
        }
    }
}
