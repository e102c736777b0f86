//! Marker Studio crate root: module wiring and re-exports.
//!
//! Processing and interaction engine for motion-capture marker trajectories:
//! - `data`: samples, per-marker series, datasets and the versioned store
//! - `filters`: gap-aware smoothing (Butterworth, median, Gaussian, Kalman, LOESS)
//! - `interpolation`: pattern-based and numeric gap filling
//! - `outliers`: robust speed/acceleration and segment-length flags
//! - `measurement` / `selection`: distances and angles over up to three picks
//! - `picking`: color-coded identity buffer and its resource lifecycle
//! - `jobs`: background filter worker with stale-result rejection
//! - `session`: the façade tying the above together for a UI layer

pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod filters;
pub mod interpolation;
pub mod jobs;
pub mod measurement;
pub mod outliers;
pub mod persistence;
pub mod picking;
pub mod selection;
pub mod session;

// Public re-exports for a compact external API
pub use config::StudioConfig;
pub use data::dataset::{Dataset, RawTrajectoryData};
pub use data::sample::{Quality, Sample};
pub use data::series::{FrameRange, MarkerSeries};
pub use data::store::{CommitOutcome, RequestToken, TrajectoryStore};
pub use error::{Result, StudioError};
pub use events::{EventController, EventFilter, EventKind, StudioEvent};
pub use filters::{apply_filter, FilterKind};
pub use interpolation::{fill_gap, interpolate, FallbackKind, PatternOptions};
pub use measurement::{Axis, MeasurementResult};
pub use outliers::OutlierThresholds;
pub use picking::{Camera, PickingState, PickingSubsystem, RenderContext, SoftwareContext};
pub use selection::{SelectionMachine, SelectionState};
pub use session::{AnalysisSession, ClickOutcome, InteractionMode, JobReport};
