//! Background execution of filter-list runs.
//!
//! Each [`FilterList`](crate::FilterList) owns one runner thread. A run
//! is planned under the list's lock (stale stages are snapshotted along
//! with the cached image feeding the first of them) and then executed
//! on the runner without holding any lock. Results are committed back
//! only if the run was not cancelled in the meantime.
//!
//! When several jobs are queued, the runner skips straight to the most
//! recent one and reports the skipped runs as cancelled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::diagnostics::{RunDiagnostics, StageAction, StageDiagnostics};
use crate::filter::ImageFilter;
use crate::types::{Image, PipelineError};

/// Identifies one requested run. Ids increase per list.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RunId(u64);

impl RunId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared cancellation flag, checked by the runner between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Whether both tokens share one flag.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Every stage ran; the list's output image was replaced.
    Completed {
        image: Arc<Image>,
        diagnostics: RunDiagnostics,
    },
    /// A filter failed. Caches upstream of `stage` were kept.
    Failed {
        stage: usize,
        filter_id: String,
        reason: String,
    },
    /// The run was cancelled or superseded; nothing was committed.
    Cancelled,
}

impl RunOutcome {
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The final image of a completed run.
    #[must_use]
    pub const fn image(&self) -> Option<&Arc<Image>> {
        match self {
            Self::Completed { image, .. } => Some(image),
            _ => None,
        }
    }
}

/// Notifications broadcast to [`FilterList::subscribe`](crate::FilterList::subscribe)
/// receivers. Every run emits zero or more `Progress` events followed by
/// exactly one terminal event.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Progress {
        run: RunId,
        /// Stages finished so far in this run.
        completed: usize,
        /// Stages scheduled for this run (cached stages excluded).
        total: usize,
    },
    Completed {
        run: RunId,
        image: Arc<Image>,
        diagnostics: RunDiagnostics,
    },
    Failed {
        run: RunId,
        stage: usize,
        filter_id: String,
        reason: String,
    },
    Cancelled {
        run: RunId,
    },
}

impl PipelineEvent {
    fn finished(run: RunId, outcome: &RunOutcome) -> Self {
        match outcome.clone() {
            RunOutcome::Completed { image, diagnostics } => Self::Completed {
                run,
                image,
                diagnostics,
            },
            RunOutcome::Failed {
                stage,
                filter_id,
                reason,
            } => Self::Failed {
                run,
                stage,
                filter_id,
                reason,
            },
            RunOutcome::Cancelled => Self::Cancelled { run },
        }
    }

    #[must_use]
    pub const fn run(&self) -> RunId {
        match self {
            Self::Progress { run, .. }
            | Self::Completed { run, .. }
            | Self::Failed { run, .. }
            | Self::Cancelled { run } => *run,
        }
    }

    /// Whether this is the last event of its run.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }

    /// Progress as a whole percentage, for `Progress` events.
    #[must_use]
    pub fn percent(&self) -> Option<u8> {
        match *self {
            Self::Progress {
                completed, total, ..
            } => Some(if total == 0 {
                100
            } else {
                u8::try_from(completed.min(total) * 100 / total).unwrap_or(100)
            }),
            _ => None,
        }
    }
}

/// Caller's side of a requested run.
///
/// Dropping the handle does not cancel the run.
#[derive(Debug)]
pub struct RunHandle {
    run: RunId,
    token: CancelToken,
    outcome: Receiver<RunOutcome>,
}

impl RunHandle {
    #[must_use]
    pub const fn id(&self) -> RunId {
        self.run
    }

    /// Request cancellation. Takes effect at the next stage boundary;
    /// a cancelled run never commits.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Block until the run ends.
    #[must_use]
    pub fn wait(self) -> RunOutcome {
        self.outcome.recv().unwrap_or(RunOutcome::Cancelled)
    }

    /// Block for at most `timeout`. `None` if the run is still going.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<RunOutcome> {
        match self.outcome.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(RunOutcome::Cancelled),
        }
    }
}

pub(crate) enum StageWork {
    Process(Box<dyn ImageFilter>),
    Bypass,
    Broken,
}

pub(crate) struct PlannedStage {
    pub(crate) index: usize,
    pub(crate) filter_id: String,
    pub(crate) work: StageWork,
}

/// Everything about a job except the stage work itself.
pub(crate) struct JobHeader {
    pub(crate) run: RunId,
    /// List version the plan was taken at.
    pub(crate) version: u64,
    /// Index of the first planned stage.
    pub(crate) start: usize,
    pub(crate) stage_count: usize,
    pub(crate) source: Arc<Image>,
    pub(crate) token: CancelToken,
    outcome: Sender<RunOutcome>,
}

impl JobHeader {
    fn finish(&self, target: &impl RunTarget, outcome: RunOutcome) {
        target.emit(PipelineEvent::finished(self.run, &outcome));
        // The handle may have been dropped.
        let _ = self.outcome.send(outcome);
    }
}

pub(crate) struct Job {
    pub(crate) header: JobHeader,
    pub(crate) stages: Vec<PlannedStage>,
}

impl Job {
    /// Build a job and the matching caller handle.
    pub(crate) fn new(
        run: RunId,
        version: u64,
        start: usize,
        stage_count: usize,
        source: Arc<Image>,
        stages: Vec<PlannedStage>,
        token: CancelToken,
    ) -> (Self, RunHandle) {
        let (sender, receiver) = mpsc::channel();
        let handle = RunHandle {
            run,
            token: token.clone(),
            outcome: receiver,
        };
        let job = Self {
            header: JobHeader {
                run,
                version,
                start,
                stage_count,
                source,
                token,
                outcome: sender,
            },
            stages,
        };
        (job, handle)
    }
}

/// The list side of a run: where results land.
pub(crate) trait RunTarget: Send + Sync + 'static {
    /// Store stage outputs (and the final image when `finished` is set)
    /// if the job is still current. Returns `false` if it was cancelled.
    fn commit(&self, job: &JobHeader, outputs: &[Arc<Image>], finished: Option<&Arc<Image>>)
    -> bool;

    fn emit(&self, event: PipelineEvent);
}

/// Owns the runner thread. Dropping closes the queue and joins.
pub(crate) struct Runner {
    jobs: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl Runner {
    pub(crate) fn spawn<T: RunTarget>(target: Arc<T>) -> Result<Self, PipelineError> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let thread = thread::Builder::new()
            .name("tonestack-runner".to_owned())
            .spawn(move || run_loop(target.as_ref(), &receiver))?;
        Ok(Self {
            jobs: Some(sender),
            thread: Some(thread),
        })
    }

    pub(crate) fn submit(&self, job: Job) -> Result<(), PipelineError> {
        self.jobs
            .as_ref()
            .ok_or(PipelineError::RunnerStopped)?
            .send(job)
            .map_err(|_| PipelineError::RunnerStopped)
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        drop(self.jobs.take());
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::error!("filter list runner thread panicked");
        }
    }
}

fn run_loop<T: RunTarget>(target: &T, jobs: &Receiver<Job>) {
    log::debug!("filter list runner started");
    while let Ok(mut job) = jobs.recv() {
        while let Ok(newer) = jobs.try_recv() {
            let superseded = std::mem::replace(&mut job, newer);
            log::trace!(
                "run {} superseded by run {}",
                superseded.header.run,
                job.header.run
            );
            superseded.header.finish(target, RunOutcome::Cancelled);
        }
        execute(target, job);
    }
    log::debug!("filter list runner stopped");
}

fn execute<T: RunTarget>(target: &T, job: Job) {
    let Job { header, stages } = job;
    let started = Instant::now();
    let total = stages.len();
    let mut current = Arc::clone(&header.source);
    let mut outputs: Vec<Arc<Image>> = Vec::with_capacity(total);
    let mut diagnostics = Vec::with_capacity(total);
    log::debug!(
        "run {}: {total} of {} stages from stage {}",
        header.run,
        header.stage_count,
        header.start
    );

    for (done, planned) in stages.iter().enumerate() {
        if header.token.is_cancelled() {
            log::debug!("run {} cancelled before stage {}", header.run, planned.index);
            header.finish(target, RunOutcome::Cancelled);
            return;
        }
        let stage_started = Instant::now();
        let (result, action) = match &planned.work {
            StageWork::Process(filter) => (
                process_checked(filter.as_ref(), &current),
                StageAction::Processed,
            ),
            StageWork::Bypass => (Ok(Arc::clone(&current)), StageAction::Bypassed),
            StageWork::Broken => (Ok(Arc::clone(&current)), StageAction::Broken),
        };
        match result {
            Ok(output) => {
                diagnostics.push(StageDiagnostics {
                    index: planned.index,
                    filter_id: planned.filter_id.clone(),
                    action,
                    duration: stage_started.elapsed(),
                });
                current = Arc::clone(&output);
                outputs.push(output);
                target.emit(PipelineEvent::Progress {
                    run: header.run,
                    completed: done + 1,
                    total,
                });
            }
            Err(reason) => {
                log::warn!(
                    "run {}: stage {} (`{}`) failed: {reason}",
                    header.run,
                    planned.index,
                    planned.filter_id
                );
                let outcome = if target.commit(&header, &outputs, None) {
                    RunOutcome::Failed {
                        stage: planned.index,
                        filter_id: planned.filter_id.clone(),
                        reason,
                    }
                } else {
                    RunOutcome::Cancelled
                };
                header.finish(target, outcome);
                return;
            }
        }
    }

    let outcome = if target.commit(&header, &outputs, Some(&current)) {
        let diagnostics = RunDiagnostics {
            run: header.run,
            start_stage: header.start,
            stage_count: header.stage_count,
            image_width: current.width(),
            image_height: current.height(),
            stages: diagnostics,
            total_duration: started.elapsed(),
        };
        log::debug!(
            "run {} completed in {:.3}ms",
            header.run,
            diagnostics.total_duration.as_secs_f64() * 1000.0
        );
        RunOutcome::Completed {
            image: current,
            diagnostics,
        }
    } else {
        RunOutcome::Cancelled
    };
    header.finish(target, outcome);
}

fn process_checked(filter: &dyn ImageFilter, input: &Image) -> Result<Arc<Image>, String> {
    let output = filter.process(input).map_err(|e| e.to_string())?;
    if output.dimensions() != input.dimensions() {
        return Err(format!(
            "output is {}x{}, expected {}x{}",
            output.width(),
            output.height(),
            input.width(),
            input.height()
        ));
    }
    Ok(Arc::new(output))
}
