//! Run lifecycle controller
//!
//! Owns the arena of [`JobRecord`]s for one run together with the shared
//! counters, the run state and the concurrency slots. Stream-data and exit
//! notifications arrive from per-job tasks; every mutation goes through the
//! single lock held here, and events are emitted while that lock is held so
//! the sink observes them in mutation order.

use crate::events::{EventSink, RunEvent};
use crate::job::{JobPhase, JobRecord, JobSnapshot, ProcessHandle};
use crate::progress_line::{classify_line, LineKind};
use crate::run_state::RunState;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Work chained after every job of a run has succeeded.
///
/// Receives the output paths of all jobs, in job order. When registered it runs
/// instead of the `Finished` event.
pub type Continuation = Box<dyn FnOnce(Vec<PathBuf>) + Send + 'static>;

/// Why a run stopped short of finishing
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RunError {
    /// The tool could not be started
    #[error("Failed to launch job {index}: {message}")]
    LaunchFailure { index: usize, message: String },

    /// An `ERROR` marker appeared in a diagnostic stream
    #[error("Tool reported an error: {0}")]
    RuntimeError(String),

    /// A process exited with a failure status
    #[error("Job {index} exited with {}", describe_code(.code))]
    NonZeroExit { index: usize, code: Option<i32> },

    /// The caller cancelled the run
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}

/// How a job's process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    /// Non-zero exit code, or `None` when terminated by a signal
    Failure(Option<i32>),
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            ExitOutcome::Success
        } else {
            ExitOutcome::Failure(status.code())
        }
    }
}

/// Counters of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Processes currently running
    pub running: usize,
    /// Highest value `running` ever reached
    pub peak_running: usize,
    /// Processes spawned so far
    pub launched: usize,
    /// Jobs that exited successfully
    pub finished: usize,
    /// Jobs in the run
    pub total: usize,
}

/// Result of asking the controller to launch a job
pub(crate) enum LaunchOutcome<C> {
    Launched {
        child: C,
        kill_rx: oneshot::Receiver<oneshot::Sender<()>>,
    },
    /// Run is no longer accepting launches
    Halted,
}

/// Live process picked up by cancellation
#[derive(Debug)]
pub(crate) struct CancelTarget {
    pub index: usize,
    pub process: Option<ProcessHandle>,
    pub output_path: PathBuf,
}

struct RunInner {
    state: RunState,
    jobs: Vec<JobRecord>,
    stats: RunStats,
    last_line: Option<String>,
    failure: Option<RunError>,
    continuation: Option<Continuation>,
}

/// State of one run, shared by the launch loop, the per-job watchers and
/// cancellation.
pub struct LifecycleController {
    run_id: Uuid,
    inner: Mutex<RunInner>,
    slots: Arc<Semaphore>,
    sink: Arc<dyn EventSink>,
}

impl LifecycleController {
    /// Wrap `jobs` in an idle run allowing `slots` concurrent processes
    pub fn new(jobs: Vec<JobRecord>, slots: usize, sink: Arc<dyn EventSink>) -> Self {
        let total = jobs.len();
        Self {
            run_id: Uuid::new_v4(),
            inner: Mutex::new(RunInner {
                state: RunState::Idle,
                jobs,
                stats: RunStats {
                    total,
                    ..RunStats::default()
                },
                last_line: None,
                failure: None,
                continuation: None,
            }),
            slots: Arc::new(Semaphore::new(slots)),
            sink,
        }
    }

    /// Id attached to every log line of this run
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Current run state
    pub async fn state(&self) -> RunState {
        self.inner.lock().await.state
    }

    /// Copy of the run counters
    pub async fn stats(&self) -> RunStats {
        self.inner.lock().await.stats
    }

    /// Why the run stopped short, if it did
    pub async fn failure(&self) -> Option<RunError> {
        self.inner.lock().await.failure.clone()
    }

    /// Snapshots of all jobs; empty once the run finished or was cancelled
    pub async fn jobs(&self) -> Vec<JobSnapshot> {
        self.inner
            .lock()
            .await
            .jobs
            .iter()
            .map(JobRecord::snapshot)
            .collect()
    }

    /// Register work to run instead of `Finished` once every job succeeded
    pub async fn set_continuation(&self, continuation: Continuation) {
        self.inner.lock().await.continuation = Some(continuation);
    }

    /// Idle -> Running. Emits `Started` and returns the job count.
    ///
    /// A run without jobs completes immediately.
    pub async fn begin(&self, label: &str) -> Option<usize> {
        let continuation = {
            let mut inner = self.inner.lock().await;
            if !inner.state.start() {
                return None;
            }
            let total = inner.stats.total;
            info!(run_id = %self.run_id, jobs = total, label, "run started");
            self.sink.emit(RunEvent::Started {
                label: label.to_string(),
            });

            if total > 0 {
                return Some(total);
            }
            self.complete(&mut inner)
        };
        run_continuation(continuation);
        Some(0)
    }

    /// Wait for a free slot. `None` once the run has stopped accepting launches.
    pub(crate) async fn acquire_slot(&self) -> Option<OwnedSemaphorePermit> {
        self.slots.clone().acquire_owned().await.ok()
    }

    /// Start job `index` with `spawn`, unless the run has stopped.
    ///
    /// `spawn` returns the child and its pid. A spawn error fails the run.
    pub(crate) async fn launch<C, F>(&self, index: usize, spawn: F) -> LaunchOutcome<C>
    where
        F: FnOnce(&JobRecord) -> std::io::Result<(C, Option<u32>)>,
    {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if !inner.state.is_running() {
            return LaunchOutcome::Halted;
        }
        let Some(job) = inner.jobs.get_mut(index) else {
            return LaunchOutcome::Halted;
        };

        match spawn(&*job) {
            Ok((child, pid)) => {
                let (kill_tx, kill_rx) = oneshot::channel();
                job.process = Some(ProcessHandle { pid, kill: kill_tx });
                job.phase = JobPhase::Launched;

                inner.stats.running += 1;
                inner.stats.launched += 1;
                inner.stats.peak_running = inner.stats.peak_running.max(inner.stats.running);
                info!(run_id = %self.run_id, job = index, pid, "job launched");

                LaunchOutcome::Launched { child, kill_rx }
            }
            Err(e) => {
                let error = RunError::LaunchFailure {
                    index,
                    message: e.to_string(),
                };
                warn!(run_id = %self.run_id, job = index, error = %error, "launch failed");
                self.fail(inner, error, e.to_string());
                LaunchOutcome::Halted
            }
        }
    }

    /// Handle one diagnostic line from job `index`.
    pub async fn on_line(&self, index: usize, line: &str) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if !inner.state.is_running() {
            return;
        }
        let Some(job) = inner.jobs.get_mut(index) else {
            return;
        };
        if job.finished {
            return;
        }

        // Report the raw line against the state before this line is applied
        self.sink.emit(RunEvent::Progress {
            job_index: index,
            percentage: job.percentage(),
            line: line.to_string(),
        });

        let kind = classify_line(line);
        if kind == LineKind::StreamComplete {
            return;
        }
        inner.last_line = Some(line.to_string());

        match kind {
            LineKind::Error => {
                self.fail(inner, RunError::RuntimeError(line.to_string()), line.to_string());
            }
            LineKind::Duration(duration) => {
                if job.record_duration(duration) {
                    debug!(run_id = %self.run_id, job = index, ?duration, "duration declared");
                }
            }
            LineKind::Progress(position) => {
                job.advance_position(position);
                let percentage = job.percentage();
                self.sink.emit(RunEvent::Progress {
                    job_index: index,
                    percentage,
                    line: line.to_string(),
                });
                if percentage >= 100.0 && !job.finished {
                    self.sink.emit(RunEvent::Progress {
                        job_index: index,
                        percentage: 100.0,
                        line: line.to_string(),
                    });
                }
            }
            LineKind::StreamComplete | LineKind::Unclassified => {}
        }
    }

    /// Handle the exit of job `index`'s process.
    pub async fn on_exit(&self, index: usize, outcome: ExitOutcome) {
        let continuation = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;

            if let Some(job) = inner.jobs.get_mut(index) {
                job.process = None;
                if job.phase.is_running() {
                    job.phase = JobPhase::Exited;
                    inner.stats.running = inner.stats.running.saturating_sub(1);
                }
            }

            if !inner.state.is_running() {
                debug!(
                    run_id = %self.run_id,
                    job = index,
                    ?outcome,
                    state = inner.state.as_str(),
                    "exit after run stopped"
                );
                return;
            }

            if let ExitOutcome::Failure(code) = outcome {
                let error = RunError::NonZeroExit { index, code };
                let message = inner.last_line.clone().unwrap_or_else(|| error.to_string());
                warn!(run_id = %self.run_id, job = index, ?code, "job failed");
                self.fail(inner, error, message);
                return;
            }

            inner.stats.finished += 1;
            if let Some(job) = inner.jobs.get_mut(index) {
                job.mark_finished();
            }
            info!(
                run_id = %self.run_id,
                job = index,
                finished = inner.stats.finished,
                total = inner.stats.total,
                "job finished"
            );
            self.sink.emit(RunEvent::Progress {
                job_index: index,
                percentage: 100.0,
                line: String::new(),
            });

            if inner.stats.finished < inner.stats.total {
                return;
            }
            self.complete(inner)
        };
        run_continuation(continuation);
    }

    /// Running -> Cancelled. Returns the live processes to tear down.
    pub(crate) async fn begin_cancel(&self, reason: &str) -> Option<Vec<CancelTarget>> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if !inner.state.cancel() {
            return None;
        }
        self.slots.close();
        inner.failure = Some(RunError::Cancelled(reason.to_string()));
        info!(run_id = %self.run_id, reason, "run cancelled");

        let targets = inner
            .jobs
            .iter_mut()
            .filter(|job| job.phase.is_running())
            .map(|job| {
                debug!(run_id = %self.run_id, job = job.index, phase = job.phase.as_str(), "stopping job");
                job.phase = JobPhase::Exited;
                CancelTarget {
                    index: job.index,
                    process: job.process.take(),
                    output_path: job.output_path.clone(),
                }
            })
            .collect();
        inner.stats.running = 0;
        Some(targets)
    }

    /// Emit the cancelled terminal event and discard job state.
    pub(crate) async fn complete_cancel(&self, reason: &str) {
        let mut inner = self.inner.lock().await;
        self.sink.emit(RunEvent::Finished {
            cancelled: true,
            message: Some(reason.to_string()),
        });
        inner.jobs.clear();
    }

    fn fail(&self, inner: &mut RunInner, error: RunError, message: String) {
        if !inner.state.fail() {
            return;
        }
        self.slots.close();
        info!(run_id = %self.run_id, error = %error, "run failed");
        inner.failure = Some(error);
        self.sink.emit(RunEvent::Error { message });
    }

    /// Running -> Finished; hands back the continuation, if any, to run unlocked.
    fn complete(&self, inner: &mut RunInner) -> Option<(Continuation, Vec<PathBuf>)> {
        if !inner.state.finish() {
            return None;
        }
        self.slots.close();
        info!(run_id = %self.run_id, jobs = inner.stats.total, "run finished");

        let outputs: Vec<PathBuf> = inner.jobs.iter().map(|j| j.output_path.clone()).collect();
        inner.jobs.clear();

        match inner.continuation.take() {
            Some(continuation) => Some((continuation, outputs)),
            None => {
                self.sink.emit(RunEvent::Finished {
                    cancelled: false,
                    message: None,
                });
                None
            }
        }
    }
}

fn run_continuation(continuation: Option<(Continuation, Vec<PathBuf>)>) {
    if let Some((continuation, outputs)) = continuation {
        continuation(outputs);
    }
}
