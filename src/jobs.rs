//! Background execution of filter and interpolation requests.
//!
//! Jobs carry an immutable snapshot of the series they work on plus the
//! [`RequestToken`] issued when they were submitted. The worker never touches
//! the store: finished results travel back over a channel and the owner
//! commits them, at which point stale tokens are rejected.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::data::series::{FrameRange, MarkerSeries};
use crate::data::store::RequestToken;
use crate::error::{Result, StudioError};
use crate::filters::{self, FilterKind};
use crate::interpolation::{self, PatternOptions};

/// Work to perform on a series snapshot.
#[derive(Debug, Clone)]
pub enum JobKind {
    Filter { kind: FilterKind, frame_rate: f64 },
    Interpolate { references: Vec<Arc<MarkerSeries>>, options: PatternOptions },
}

impl JobKind {
    pub fn describe(&self) -> String {
        match self {
            JobKind::Filter { kind, .. } => format!("filter: {}", kind.describe()),
            JobKind::Interpolate { references, .. } => format!("interpolate from {} reference(s)", references.len()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub token: RequestToken,
    pub range: FrameRange,
    pub series: Arc<MarkerSeries>,
    pub kind: JobKind,
}

impl Job {
    /// Runs the job on the calling thread.
    pub fn run(&self) -> Result<MarkerSeries> {
        match &self.kind {
            JobKind::Filter { kind, frame_rate } => filters::apply_filter(&self.series, self.range, kind, *frame_rate),
            JobKind::Interpolate { references, options } => {
                let refs: Vec<&MarkerSeries> = references.iter().map(Arc::as_ref).collect();
                interpolation::interpolate(&self.series, self.range, &refs, options).map(|i| i.series)
            }
        }
    }
}

/// A finished job.
#[derive(Debug)]
pub struct JobResult {
    pub token: RequestToken,
    pub marker: String,
    pub range: FrameRange,
    pub operation: String,
    pub outcome: Result<MarkerSeries>,
}

enum JobCommand {
    Run(Job),
    Shutdown,
}

/// Dedicated worker thread consuming jobs in submission order.
pub struct FilterWorker {
    commands: Sender<JobCommand>,
    results: Receiver<JobResult>,
    handle: Option<JoinHandle<()>>,
}

impl FilterWorker {
    pub fn spawn() -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<JobCommand>();
        let (res_tx, res_rx) = mpsc::channel::<JobResult>();
        let handle = std::thread::Builder::new().name("marker-filter-worker".into()).spawn(move || {
            while let Ok(JobCommand::Run(job)) = cmd_rx.recv() {
                let outcome = job.run();
                let result = JobResult {
                    token: job.token,
                    marker: job.series.name().to_string(),
                    range: job.range,
                    operation: job.kind.describe(),
                    outcome,
                };
                if res_tx.send(result).is_err() {
                    break;
                }
            }
            tracing::debug!("filter worker stopped");
        })?;
        Ok(Self { commands: cmd_tx, results: res_rx, handle: Some(handle) })
    }

    pub fn submit(&self, job: Job) -> Result<()> {
        self.commands
            .send(JobCommand::Run(job))
            .map_err(|_| StudioError::ResourceUnavailable("filter worker has stopped".into()))
    }

    /// Finished results available right now.
    pub fn try_results(&self) -> Vec<JobResult> {
        self.results.try_iter().collect()
    }

    /// Waits up to `timeout` for the next finished result.
    pub fn wait_result(&self, timeout: Duration) -> Option<JobResult> {
        self.results.recv_timeout(timeout).ok()
    }
}

impl Drop for FilterWorker {
    fn drop(&mut self) {
        let _ = self.commands.send(JobCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("filter worker panicked");
            }
        }
    }
}
