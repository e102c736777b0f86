//! One interactive analysis session: the entry point used by the
//! presentation and file I/O layers.
//!
//! The session owns the trajectory store, the analysis selection, the picking
//! subsystem and an optional background worker. It is meant to live on the
//! rendering thread; only the store is shared with the worker, through
//! immutable series snapshots and request tokens.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use egui::Pos2;
use nalgebra::Point3;
use parking_lot::Mutex;

use crate::config::StudioConfig;
use crate::data::dataset::{Dataset, RawTrajectoryData};
use crate::data::kinematics;
use crate::data::sample::Quality;
use crate::data::series::{FrameRange, MarkerSeries};
use crate::data::store::{CommitOutcome, RequestToken, TrajectoryStore};
use crate::error::{Result, StudioError};
use crate::events::{
    DatasetMeta, EditMeta, EventController, EventKind, JobMeta, OutlierMeta, PickMeta, StudioEvent,
};
use crate::filters::{self, FilterKind};
use crate::interpolation::{self, FallbackKind, FillMethod, GapFill, PatternOptions};
use crate::jobs::{FilterWorker, Job, JobKind, JobResult};
use crate::outliers::{self, OutlierThresholds};
use crate::picking::{Camera, PickScene, PickingState, PickingSubsystem, RenderContext};
use crate::selection::{SelectionMachine, SelectionSet, SelectionState, SelectionUpdate};

/// What a click in the 3D view does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionMode {
    /// Clicking a marker makes it the current marker (clicking it again clears it).
    #[default]
    Navigate,
    /// Clicks feed the measurement selection.
    Analysis,
    /// Clicks toggle reference markers for pattern interpolation.
    PatternSelection,
}

/// Effect of a click, depending on the interaction mode.
#[derive(Debug)]
pub enum ClickOutcome {
    /// Nothing under the cursor, or picking unavailable.
    Nothing,
    CurrentMarker(Option<String>),
    PatternToggled { marker: String, selected: bool },
    Selection(SelectionUpdate),
}

/// Outcome of a finished background job once it reached the store.
#[derive(Debug)]
pub enum JobReport {
    Applied { marker: String, token: RequestToken, series: Arc<MarkerSeries> },
    Superseded { marker: String, token: RequestToken, latest: RequestToken },
    Failed { marker: String, token: RequestToken, error: StudioError },
}

pub struct AnalysisSession {
    config: StudioConfig,
    store: Option<TrajectoryStore>,
    events: EventController,
    selection: SelectionMachine,
    picking: PickingSubsystem,
    camera: Camera,
    frame: usize,
    mode: InteractionMode,
    current_marker: Option<String>,
    pattern_markers: BTreeSet<String>,
    /// Tag each sample had before the detector flagged it, per marker.
    outlier_priors: Mutex<HashMap<String, BTreeMap<usize, Quality>>>,
    worker: Option<FilterWorker>,
}

fn edit_event(kind: EventKind, series: &MarkerSeries, range: FrameRange, operation: String) -> StudioEvent {
    let mut evt = StudioEvent::new(kind);
    evt.edit = Some(EditMeta { marker: series.name().to_string(), range, version: series.version(), operation });
    evt
}

impl AnalysisSession {
    pub fn new(config: StudioConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            selection: SelectionMachine::new(config.selection.frame_tolerance),
            picking: PickingSubsystem::new(config.picking.marker_radius_px),
            camera: Camera::from_config(&config.picking, [800, 600]),
            config,
            store: None,
            events: EventController::new(),
            frame: 0,
            mode: InteractionMode::Navigate,
            current_marker: None,
            pattern_markers: BTreeSet::new(),
            outlier_priors: Mutex::new(HashMap::new()),
            worker: None,
        })
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn events(&self) -> &EventController {
        &self.events
    }

    fn store(&self) -> Result<&TrajectoryStore> {
        self.store.as_ref().ok_or_else(|| StudioError::ResourceUnavailable("no dataset loaded".into()))
    }

    // ── Dataset ─────────────────────────────────────────────────────────

    /// Replaces the session's data. Selection, pattern markers and the
    /// current marker are reset; results of older background jobs will be
    /// rejected on commit.
    pub fn load_dataset(&mut self, raw: &RawTrajectoryData) -> Result<Dataset> {
        let store = TrajectoryStore::load(raw)?;
        let snapshot = store.snapshot();
        self.store = Some(store);
        let had_selection = !self.selection.selection().is_empty();
        self.selection.dataset_reloaded();
        self.frame = 0;
        self.current_marker = None;
        self.pattern_markers.clear();
        self.outlier_priors.get_mut().clear();

        let mut evt = StudioEvent::new(EventKind::DATASET_LOADED);
        if had_selection {
            evt.kinds |= EventKind::SELECTION_CLEARED;
        }
        evt.dataset = Some(DatasetMeta {
            marker_count: snapshot.marker_names().len(),
            frame_count: snapshot.frame_count(),
            frame_rate: snapshot.frame_rate(),
        });
        self.events.emit(evt);
        Ok(snapshot)
    }

    /// Immutable view of the current versions of all series.
    pub fn dataset(&self) -> Result<Dataset> {
        Ok(self.store()?.snapshot())
    }

    pub fn series(&self, marker: &str) -> Result<Arc<MarkerSeries>> {
        self.store()?.series(marker)
    }

    pub fn export_dataset(&self) -> Result<RawTrajectoryData> {
        Ok(self.dataset()?.export())
    }

    // ── Editing ─────────────────────────────────────────────────────────

    pub fn apply_filter(&self, marker: &str, range: FrameRange, kind: &FilterKind) -> Result<Arc<MarkerSeries>> {
        let store = self.store()?;
        let rate = store.frame_rate();
        let series = store.update(marker, |s| filters::apply_filter(s, range, kind, rate))?;
        self.events.emit(edit_event(EventKind::SERIES_EDITED, &series, range, format!("filter: {}", kind.describe())));
        Ok(series)
    }

    fn reference_series(&self, marker: &str, references: &[&str]) -> Result<Vec<Arc<MarkerSeries>>> {
        let store = self.store()?;
        let names: Vec<&str> = if references.is_empty() {
            self.pattern_markers.iter().map(String::as_str).collect()
        } else {
            references.to_vec()
        };
        names.into_iter().filter(|n| *n != marker).map(|n| store.series(n)).collect()
    }

    /// Fills the gaps of `marker` inside `range`. With no explicit
    /// `references`, the markers toggled in pattern-selection mode are used.
    pub fn interpolate_gap(
        &self,
        marker: &str,
        range: FrameRange,
        references: &[&str],
        options: Option<&PatternOptions>,
    ) -> Result<Arc<MarkerSeries>> {
        let options = options.copied().unwrap_or(self.config.pattern);
        let refs = self.reference_series(marker, references)?;
        let ref_views: Vec<&MarkerSeries> = refs.iter().map(Arc::as_ref).collect();
        let mut fills: Vec<GapFill> = Vec::new();
        let series = self.store()?.update(marker, |s| {
            let out = interpolation::interpolate(s, range, &ref_views, &options)?;
            fills = out.fills;
            Ok(out.series)
        })?;
        for fill in &fills {
            match &fill.method {
                FillMethod::Pattern { reference, similarity } => {
                    tracing::info!(marker, gap = %fill.gap, reference = %reference, similarity, "gap filled from reference")
                }
                FillMethod::Fallback(kind) => tracing::info!(marker, gap = %fill.gap, method = ?kind, "gap filled numerically"),
            }
        }
        self.events.emit(edit_event(EventKind::SERIES_EDITED, &series, range, format!("interpolate: {} gap(s)", fills.len())));
        Ok(series)
    }

    /// Fills the gaps of `marker` inside `range` without reference markers.
    pub fn fill_gap(&self, marker: &str, range: FrameRange, kind: FallbackKind) -> Result<Arc<MarkerSeries>> {
        let options = self.config.pattern;
        let series = self.store()?.update(marker, |s| interpolation::fill_gap(s, range, kind, &options).map(|i| i.series))?;
        self.events.emit(edit_event(EventKind::SERIES_EDITED, &series, range, format!("fill: {kind:?}")));
        Ok(series)
    }

    /// Turns `range` of `marker` into a gap.
    pub fn delete_range(&self, marker: &str, range: FrameRange) -> Result<Arc<MarkerSeries>> {
        let series = self.store()?.delete_range(marker, range)?;
        self.events.emit(edit_event(EventKind::SERIES_EDITED, &series, range, "delete".into()));
        Ok(series)
    }

    /// Restores `range` of `marker` from the data as loaded.
    pub fn revert(&self, marker: &str, range: FrameRange) -> Result<Arc<MarkerSeries>> {
        let series = self.store()?.revert_range(marker, range)?;
        self.events.emit(edit_event(EventKind::SERIES_REVERTED, &series, range, "revert".into()));
        Ok(series)
    }

    pub fn revert_all(&self) -> Result<()> {
        let store = self.store()?;
        store.revert_all();
        let mut evt = StudioEvent::new(EventKind::SERIES_REVERTED);
        if let Some(range) = FrameRange::full(store.frame_count()) {
            evt.edit = Some(EditMeta { marker: String::new(), range, version: 0, operation: "revert all".into() });
        }
        self.events.emit(evt);
        Ok(())
    }

    // ── Outliers and kinematics ─────────────────────────────────────────

    /// Flags suspicious frames of `marker` inside `range` and tags them
    /// [`Quality::Outlier`]. Includes segment-length jumps for configured
    /// skeleton pairs the marker belongs to.
    ///
    /// Flags from an earlier run inside `range` are replaced: a sample that
    /// is no longer flagged gets back the tag it had before.
    pub fn detect_outliers(
        &self,
        marker: &str,
        range: FrameRange,
        thresholds: Option<&OutlierThresholds>,
    ) -> Result<BTreeSet<usize>> {
        let store = self.store()?;
        let th = thresholds.copied().unwrap_or(self.config.outliers);
        let mut partners: HashMap<&str, Arc<MarkerSeries>> = HashMap::new();
        for (a, b) in &self.config.skeleton.pairs {
            let other = if a == marker {
                b
            } else if b == marker {
                a
            } else {
                continue;
            };
            match store.series(other) {
                Ok(s) => {
                    partners.insert(other.as_str(), s);
                }
                Err(_) => tracing::debug!(marker, partner = %other, "skeleton partner not in dataset"),
            }
        }

        let dataset = store.snapshot();
        let original = dataset.original_series(marker)?;
        let mut guard = self.outlier_priors.lock();
        let priors = guard.entry(marker.to_string()).or_default();
        let mut flagged = BTreeSet::new();
        store.update(marker, |s| {
            flagged = outliers::detect(s, range, &th)?;
            for partner in partners.values() {
                flagged.extend(outliers::segment_outliers(s, partner, range, th.segment_ratio)?);
            }
            s.map_range(range, |f, sample| match (flagged.contains(&f), sample.quality()) {
                (true, Quality::Outlier) | (_, Quality::Missing) => sample,
                (true, quality) => {
                    priors.insert(f, quality);
                    sample.retagged(Quality::Outlier)
                }
                (false, Quality::Outlier) => {
                    let prior = priors.remove(&f).unwrap_or_else(|| {
                        if original.position(f) == sample.position() {
                            Quality::Original
                        } else {
                            Quality::Filtered
                        }
                    });
                    sample.retagged(prior)
                }
                (false, _) => sample,
            })
        })?;
        drop(guard);

        let mut evt = StudioEvent::new(EventKind::OUTLIERS_DETECTED);
        evt.outliers = Some(OutlierMeta { marker: marker.to_string(), frames: flagged.clone() });
        self.events.emit(evt);
        Ok(flagged)
    }

    /// Per-frame speed of `marker` in length units per second.
    pub fn speed(&self, marker: &str) -> Result<Vec<Option<f64>>> {
        let store = self.store()?;
        let series = store.series(marker)?;
        Ok(kinematics::speed(&series, store.frame_rate()))
    }

    /// Per-frame acceleration magnitude of `marker` in length units per second².
    pub fn acceleration(&self, marker: &str) -> Result<Vec<Option<f64>>> {
        let store = self.store()?;
        let series = store.series(marker)?;
        Ok(kinematics::acceleration(&series, store.frame_rate()))
    }

    /// Last `length` positions of `marker` up to `frame`, oldest first.
    pub fn trail(&self, marker: &str, frame: usize, length: usize) -> Result<Vec<Point3<f64>>> {
        Ok(self.store()?.series(marker)?.trail(frame, length))
    }

    // ── Frame and modes ─────────────────────────────────────────────────

    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Moves the current frame; a selection started too far away is cleared.
    pub fn set_frame(&mut self, frame: usize) -> Result<()> {
        let count = self.store()?.frame_count();
        if frame >= count {
            return Err(StudioError::Range { range: FrameRange::single(frame), frame_count: count });
        }
        self.frame = frame;
        if self.selection.frame_changed(frame) {
            self.events.emit(StudioEvent::new(EventKind::SELECTION_CLEARED));
        }
        Ok(())
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn activate_analysis(&mut self) {
        self.mode = InteractionMode::Analysis;
    }

    /// Leaves analysis mode and clears the selection.
    pub fn deactivate_analysis(&mut self) {
        if self.mode == InteractionMode::Analysis {
            self.mode = InteractionMode::Navigate;
        }
        let had_selection = !self.selection.selection().is_empty();
        self.selection.deactivate();
        if had_selection {
            self.events.emit(StudioEvent::new(EventKind::SELECTION_CLEARED));
        }
    }

    /// Enters or leaves pattern-selection mode. Leaving it keeps the chosen
    /// markers for the next interpolation.
    pub fn set_pattern_selection(&mut self, active: bool) {
        if active {
            self.mode = InteractionMode::PatternSelection;
        } else if self.mode == InteractionMode::PatternSelection {
            self.mode = InteractionMode::Navigate;
        }
    }

    pub fn pattern_markers(&self) -> &BTreeSet<String> {
        &self.pattern_markers
    }

    /// Adds or removes `marker` from the pattern references; returns whether it is now selected.
    pub fn toggle_pattern_marker(&mut self, marker: &str) -> Result<bool> {
        self.store()?.series(marker)?;
        if self.pattern_markers.remove(marker) {
            Ok(false)
        } else {
            self.pattern_markers.insert(marker.to_string());
            Ok(true)
        }
    }

    pub fn clear_pattern_markers(&mut self) {
        self.pattern_markers.clear();
    }

    pub fn current_marker(&self) -> Option<&str> {
        self.current_marker.as_deref()
    }

    // ── Selection ───────────────────────────────────────────────────────

    pub fn selection(&self) -> &SelectionSet {
        self.selection.selection()
    }

    pub fn selection_state(&self) -> SelectionState {
        self.selection.state()
    }

    /// Adds a pick of `marker` at `frame` to the analysis selection.
    pub fn record_pick(&mut self, marker: &str, frame: usize) -> Result<SelectionUpdate> {
        let dataset = self.dataset()?;
        if frame >= dataset.frame_count() {
            return Err(StudioError::Range { range: FrameRange::single(frame), frame_count: dataset.frame_count() });
        }
        self.frame = frame;
        let update = self.selection.record_pick(marker, frame, &dataset)?;
        self.emit_measurement(&update);
        Ok(update)
    }

    /// Cycles the segment reference axis; only has an effect with two picks.
    pub fn cycle_axis(&mut self) -> Result<Option<SelectionUpdate>> {
        let dataset = self.dataset()?;
        let update = self.selection.cycle_axis(&dataset);
        if let Some(u) = &update {
            self.emit_measurement(u);
        }
        Ok(update)
    }

    fn emit_measurement(&self, update: &SelectionUpdate) {
        if let Some(Ok(result)) = &update.measurement {
            let mut evt = StudioEvent::new(EventKind::MEASUREMENT_COMPLETE);
            evt.measurement = Some(result.clone());
            self.events.emit(evt);
        }
    }

    // ── Picking ─────────────────────────────────────────────────────────

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn picking_state(&self) -> PickingState {
        self.picking.state()
    }

    /// Marker under `cursor` at the current frame, or `None`. Failures are
    /// reported as nothing picked. Only hits emit `MARKER_PICKED`.
    pub fn pick(&mut self, ctx: &mut dyn RenderContext, cursor: Pos2) -> Option<String> {
        let dataset = match self.dataset() {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(error = %e, "pick without data");
                return None;
            }
        };
        let markers = dataset.frame_positions(self.frame);
        self.camera.viewport = ctx.viewport_size();
        let scene = PickScene { markers: &markers, occluders: &[] };
        let picked = match self.picking.pick(ctx, &self.camera, scene, cursor) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "pick failed");
                None
            }
        }?;
        let mut evt = StudioEvent::new(EventKind::MARKER_PICKED);
        evt.pick = Some(PickMeta { cursor: [cursor.x, cursor.y], marker: picked.clone(), frame: self.frame });
        self.events.emit(evt);
        Some(picked)
    }

    /// Picks under `cursor` and applies the result according to the mode.
    pub fn click(&mut self, ctx: &mut dyn RenderContext, cursor: Pos2) -> ClickOutcome {
        let Some(marker) = self.pick(ctx, cursor) else { return ClickOutcome::Nothing };
        match self.mode {
            InteractionMode::Navigate => {
                self.current_marker = if self.current_marker.as_deref() == Some(marker.as_str()) { None } else { Some(marker) };
                ClickOutcome::CurrentMarker(self.current_marker.clone())
            }
            InteractionMode::PatternSelection => match self.toggle_pattern_marker(&marker) {
                Ok(selected) => ClickOutcome::PatternToggled { marker, selected },
                Err(e) => {
                    tracing::debug!(error = %e, "pattern toggle failed");
                    ClickOutcome::Nothing
                }
            },
            InteractionMode::Analysis => match self.record_pick(&marker, self.frame) {
                Ok(update) => ClickOutcome::Selection(update),
                Err(e) => {
                    tracing::debug!(error = %e, "selection pick failed");
                    ClickOutcome::Nothing
                }
            },
        }
    }

    /// Frees picking resources; safe to call repeatedly and after context loss.
    pub fn release_picking(&mut self, ctx: &mut dyn RenderContext) {
        let was_ready = self.picking.state() == PickingState::Ready;
        self.picking.release(ctx);
        if was_ready {
            self.events.emit(StudioEvent::new(EventKind::PICKING_RELEASED));
        }
    }

    /// Notifies the session that the view's graphics context is gone.
    pub fn context_lost(&mut self) {
        let was_ready = self.picking.state() == PickingState::Ready;
        self.picking.context_lost();
        if was_ready {
            self.events.emit(StudioEvent::new(EventKind::PICKING_RELEASED));
        }
    }

    // ── Background jobs ─────────────────────────────────────────────────

    fn worker(&mut self) -> Result<&FilterWorker> {
        if self.worker.is_none() {
            self.worker = Some(FilterWorker::spawn()?);
        }
        self.worker.as_ref().ok_or_else(|| StudioError::ResourceUnavailable("filter worker".into()))
    }

    fn submit(&mut self, marker: &str, range: FrameRange, kind: JobKind) -> Result<RequestToken> {
        let store = self.store()?;
        range.validate(store.frame_count())?;
        let series = store.series(marker)?;
        let token = store.begin(marker)?;
        let job = Job { token, range, series, kind };
        self.worker()?.submit(job)?;
        Ok(token)
    }

    /// Queues a filter run on the worker thread. Any earlier request for the
    /// same marker that has not been committed yet becomes stale.
    pub fn submit_filter(&mut self, marker: &str, range: FrameRange, kind: FilterKind) -> Result<RequestToken> {
        let frame_rate = self.store()?.frame_rate();
        kind.validate(frame_rate)?;
        self.submit(marker, range, JobKind::Filter { kind, frame_rate })
    }

    /// Queues a pattern interpolation on the worker thread.
    pub fn submit_interpolation(
        &mut self,
        marker: &str,
        range: FrameRange,
        references: &[&str],
        options: Option<&PatternOptions>,
    ) -> Result<RequestToken> {
        let options = options.copied().unwrap_or(self.config.pattern);
        options.validate()?;
        let references = self.reference_series(marker, references)?;
        self.submit(marker, range, JobKind::Interpolate { references, options })
    }

    fn commit_result(&self, result: JobResult) -> JobReport {
        let JobResult { token, marker, range, operation, outcome } = result;
        let series = match outcome {
            Ok(s) => s,
            Err(error) => {
                tracing::warn!(marker = %marker, error = %error, "background job failed");
                return JobReport::Failed { marker, token, error };
            }
        };
        let committed = self.store().and_then(|store| store.commit(token, series));
        match committed {
            Ok(CommitOutcome::Applied(series)) => {
                self.events.emit(edit_event(EventKind::SERIES_EDITED, &series, range, operation));
                JobReport::Applied { marker, token, series }
            }
            Ok(CommitOutcome::Superseded { token, latest }) => {
                let mut evt = StudioEvent::new(EventKind::JOB_SUPERSEDED);
                evt.job = Some(JobMeta { marker: marker.clone(), token: token.value(), latest: latest.value() });
                self.events.emit(evt);
                JobReport::Superseded { marker, token, latest }
            }
            Err(error) => JobReport::Failed { marker, token, error },
        }
    }

    /// Commits every finished background result that is still current.
    pub fn poll_jobs(&mut self) -> Vec<JobReport> {
        let results = match &self.worker {
            Some(w) => w.try_results(),
            None => return Vec::new(),
        };
        results.into_iter().map(|r| self.commit_result(r)).collect()
    }

    /// Waits up to `timeout` for the next background result and commits it.
    pub fn wait_job(&mut self, timeout: Duration) -> Option<JobReport> {
        let result = self.worker.as_ref()?.wait_result(timeout)?;
        Some(self.commit_result(result))
    }
}
