//! Event notifications for a marker analysis session.
//!
//! Subscribers receive [`StudioEvent`]s via [`EventController`]. Each event
//! carries a set of [`EventKind`] flags (bitflags-style) so that a single
//! occurrence can match multiple categories (e.g. a reload that dropped an
//! active selection is *also* a `SELECTION_CLEARED` event).
//!
//! The caller specifies an [`EventFilter`] to receive only the events they
//! care about. The filter is a simple OR mask: an event is delivered when
//! `(event.kinds & filter) != 0`.

use std::collections::BTreeSet;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::data::series::FrameRange;
use crate::measurement::MeasurementResult;

// ─────────────────────────────────────────────────────────────────────────────
// EventKind – bitflags
// ─────────────────────────────────────────────────────────────────────────────

/// Bitflags describing the *categories* an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKind(pub u64);

impl EventKind {
    // ── Data ────────────────────────────────────────────────────────────
    /// A dataset was loaded (or reloaded), replacing all series.
    pub const DATASET_LOADED: Self = Self(1 << 0);
    /// A series got a new version from a filter, interpolation or deletion.
    pub const SERIES_EDITED: Self = Self(1 << 1);
    /// Samples were restored from the original snapshot.
    pub const SERIES_REVERTED: Self = Self(1 << 2);
    /// Outlier flags were recomputed for a marker.
    pub const OUTLIERS_DETECTED: Self = Self(1 << 3);

    // ── Picking / selection ─────────────────────────────────────────────
    /// A marker was picked in the 3D view.
    pub const MARKER_PICKED: Self = Self(1 << 4);
    /// A two- or three-point selection produced a measurement.
    pub const MEASUREMENT_COMPLETE: Self = Self(1 << 5);
    /// The analysis selection returned to empty.
    pub const SELECTION_CLEARED: Self = Self(1 << 6);

    // ── Background jobs ─────────────────────────────────────────────────
    /// A background result was discarded because a newer request exists.
    pub const JOB_SUPERSEDED: Self = Self(1 << 7);

    // ── Resources ───────────────────────────────────────────────────────
    /// Picking resources were released.
    pub const PICKING_RELEASED: Self = Self(1 << 8);

    /// Wildcard: matches *every* event kind.
    pub const ALL: Self = Self(u64::MAX);

    /// Combine two event kinds (bitwise OR).
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Check whether `self` contains all bits in `other`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Check whether `self` intersects with `other` (at least one bit in common).
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for EventKind {
    type Output = Self;
    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for EventKind {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::ops::BitAnd for EventKind {
    type Output = Self;
    #[inline]
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

const NAMED_KINDS: &[(EventKind, &str)] = &[
    (EventKind::DATASET_LOADED, "DATASET_LOADED"),
    (EventKind::SERIES_EDITED, "SERIES_EDITED"),
    (EventKind::SERIES_REVERTED, "SERIES_REVERTED"),
    (EventKind::OUTLIERS_DETECTED, "OUTLIERS_DETECTED"),
    (EventKind::MARKER_PICKED, "MARKER_PICKED"),
    (EventKind::MEASUREMENT_COMPLETE, "MEASUREMENT_COMPLETE"),
    (EventKind::SELECTION_CLEARED, "SELECTION_CLEARED"),
    (EventKind::JOB_SUPERSEDED, "JOB_SUPERSEDED"),
    (EventKind::PICKING_RELEASED, "PICKING_RELEASED"),
];

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "EMPTY");
        }
        if *self == EventKind::ALL {
            return write!(f, "ALL");
        }

        let mut names = Vec::new();
        let mut known_bits: u64 = 0;
        for (kind, name) in NAMED_KINDS {
            known_bits |= kind.0;
            if self.contains(*kind) {
                names.push((*name).to_string());
            }
        }
        let extra = self.0 & !known_bits;
        if extra != 0 {
            names.push(format!("0x{:x}", extra));
        }
        write!(f, "{}", names.join("|"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Metadata – per-event-type payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Metadata for dataset load events.
#[derive(Debug, Clone)]
pub struct DatasetMeta {
    pub marker_count: usize,
    pub frame_count: usize,
    pub frame_rate: f64,
}

/// Metadata for series edit / revert events.
#[derive(Debug, Clone)]
pub struct EditMeta {
    pub marker: String,
    pub range: FrameRange,
    /// Version of the series after the edit.
    pub version: u64,
    /// Short description of the operation ("filter: median, 3 frames", ...).
    pub operation: String,
}

/// Metadata for outlier detection events.
#[derive(Debug, Clone)]
pub struct OutlierMeta {
    pub marker: String,
    pub frames: BTreeSet<usize>,
}

/// Metadata for a pick that hit a marker.
#[derive(Debug, Clone)]
pub struct PickMeta {
    /// Cursor position in view pixels.
    pub cursor: [f32; 2],
    pub marker: String,
    pub frame: usize,
}

/// Metadata for superseded background jobs.
#[derive(Debug, Clone)]
pub struct JobMeta {
    pub marker: String,
    pub token: u64,
    pub latest: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// StudioEvent – the top-level event type
// ─────────────────────────────────────────────────────────────────────────────

/// An event emitted by an analysis session.
///
/// `kinds` is a bitflag set of [`EventKind`] categories. The various
/// `Option<…Meta>` fields carry metadata relevant to the kinds that are set.
#[derive(Debug, Clone)]
pub struct StudioEvent {
    pub kinds: EventKind,
    /// Seconds since the controller was created; set on emit.
    pub timestamp: f64,

    pub dataset: Option<DatasetMeta>,
    pub edit: Option<EditMeta>,
    pub outliers: Option<OutlierMeta>,
    pub pick: Option<PickMeta>,
    pub measurement: Option<MeasurementResult>,
    pub job: Option<JobMeta>,
}

impl StudioEvent {
    pub fn new(kinds: EventKind) -> Self {
        Self { kinds, timestamp: 0.0, dataset: None, edit: None, outliers: None, pick: None, measurement: None, job: None }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EventFilter
// ─────────────────────────────────────────────────────────────────────────────

/// A filter that selects which event categories a subscriber receives.
#[derive(Debug, Clone, Copy)]
pub struct EventFilter {
    pub mask: EventKind,
}

impl EventFilter {
    pub const fn all() -> Self {
        Self { mask: EventKind::ALL }
    }

    pub const fn only(mask: EventKind) -> Self {
        Self { mask }
    }

    #[inline]
    pub fn matches(&self, event: &StudioEvent) -> bool {
        event.kinds.intersects(self.mask)
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EventController
// ─────────────────────────────────────────────────────────────────────────────

struct Subscriber {
    filter: EventFilter,
    sender: Sender<StudioEvent>,
}

struct EventCtrlInner {
    subscribers: Vec<Subscriber>,
    start_instant: std::time::Instant,
}

/// Collects and distributes session events to subscribers.
///
/// Cloning the controller shares the subscriber list.
#[derive(Clone)]
pub struct EventController {
    inner: Arc<Mutex<EventCtrlInner>>,
}

impl EventController {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(EventCtrlInner {
                subscribers: Vec::new(),
                start_instant: std::time::Instant::now(),
            })),
        }
    }

    /// Subscribe to events matching the given filter.
    pub fn subscribe(&self, filter: EventFilter) -> Receiver<StudioEvent> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.inner.lock().subscribers.push(Subscriber { filter, sender: tx });
        rx
    }

    pub fn subscribe_all(&self) -> Receiver<StudioEvent> {
        self.subscribe(EventFilter::all())
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Sends `event` to every matching subscriber. Subscribers whose
    /// receiver was dropped are removed when an event is delivered to them.
    pub fn emit(&self, mut event: StudioEvent) {
        let mut inner = self.inner.lock();
        event.timestamp = inner.start_instant.elapsed().as_secs_f64();
        inner.subscribers.retain(|sub| !sub.filter.matches(&event) || sub.sender.send(event.clone()).is_ok());
    }
}

impl Default for EventController {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_union_and_intersection() {
        let combined = EventKind::MARKER_PICKED | EventKind::MEASUREMENT_COMPLETE;
        assert!(combined.contains(EventKind::MARKER_PICKED));
        assert!(combined.intersects(EventKind::MEASUREMENT_COMPLETE));
        assert!(!EventKind::SERIES_EDITED.intersects(combined));
        assert_eq!(EventKind::SERIES_EDITED.union(EventKind::SERIES_REVERTED), EventKind(0b110));
    }

    #[test]
    fn event_filter_matches() {
        let filter = EventFilter::only(EventKind::SERIES_EDITED | EventKind::SERIES_REVERTED);
        assert!(filter.matches(&StudioEvent::new(EventKind::SERIES_REVERTED)));
        assert!(!filter.matches(&StudioEvent::new(EventKind::MARKER_PICKED)));
        assert!(EventFilter::all().matches(&StudioEvent::new(EventKind::PICKING_RELEASED)));
    }

    #[test]
    fn event_controller_subscribe_and_emit() {
        let ctrl = EventController::new();
        let rx_all = ctrl.subscribe_all();
        let rx_edits = ctrl.subscribe(EventFilter::only(EventKind::SERIES_EDITED));
        let rx_picks = ctrl.subscribe(EventFilter::only(EventKind::MARKER_PICKED));

        ctrl.emit(StudioEvent::new(EventKind::SERIES_EDITED));

        assert!(rx_all.try_recv().is_ok());
        assert!(rx_edits.try_recv().is_ok());
        assert!(rx_picks.try_recv().is_err());
    }

    #[test]
    fn event_kind_display() {
        assert_eq!(format!("{}", EventKind::MARKER_PICKED), "MARKER_PICKED");
        let combo = EventKind::MARKER_PICKED | EventKind::MEASUREMENT_COMPLETE;
        assert_eq!(format!("{}", combo), "MARKER_PICKED|MEASUREMENT_COMPLETE");
        assert_eq!(format!("{}", EventKind::ALL), "ALL");
        assert!(format!("{}", EventKind(1 << 63)).starts_with("0x"));
    }

    #[test]
    fn event_kinds_do_not_overlap() {
        for (i, (a, _)) in NAMED_KINDS.iter().enumerate() {
            for (j, (b, _)) in NAMED_KINDS.iter().enumerate() {
                if i != j {
                    assert!(!a.intersects(*b), "EventKind bits {i} and {j} overlap");
                }
            }
        }
    }

    #[test]
    fn dropped_receiver_is_cleaned_up() {
        let ctrl = EventController::new();
        let rx1 = ctrl.subscribe_all();
        let rx2 = ctrl.subscribe_all();
        drop(rx1);

        ctrl.emit(StudioEvent::new(EventKind::DATASET_LOADED));
        assert!(rx2.try_recv().is_ok());
        assert_eq!(ctrl.subscriber_count(), 1);
    }
}
