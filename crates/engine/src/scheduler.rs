//! Job scheduler
//!
//! Launches the jobs of a run against the media tool with at most
//! [`ConcurrencyPlan::slots`] processes alive at once. Each launched process
//! gets a watcher task that owns the child, forwards its stderr to the
//! [`LifecycleController`] and reports its exit. The watcher holds the slot
//! permit until the exit has been handled.

use crate::cancel::terminate_and_clean;
use crate::concurrency::ConcurrencyPlan;
use crate::config::Config;
use crate::events::EventSink;
use crate::job::{JobRecord, JobSnapshot};
use crate::lifecycle::{
    Continuation, ExitOutcome, LaunchOutcome, LifecycleController, RunError, RunStats,
};
use crate::provider::JobSpecProvider;
use crate::run_state::RunState;
use crate::stream::pump_lines;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, OwnedSemaphorePermit};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long a job's stderr may stay open after its process exited.
///
/// A grandchild that inherited the pipe can hold it open indefinitely; lines
/// still unread when this elapses are dropped.
const STREAM_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors from preparing or starting a run
#[derive(Debug, Error, PartialEq)]
pub enum SchedulerError {
    /// `setup` or `start_all` while a run is in progress or already started
    #[error("A run is already in progress")]
    AlreadyStarted,

    /// `start_all` or `set_continuation` before `setup`
    #[error("No jobs have been set up")]
    NotReady,

    /// Two jobs would write the same output file
    #[error("More than one job writes {}", .0.display())]
    DuplicateOutput(PathBuf),
}

/// Runs one batch of jobs of a single kind against the media tool.
///
/// `setup` turns work items into jobs, `start_all` launches them and `cancel`
/// tears the run down. Progress is reported through the event sink.
pub struct Scheduler<P: JobSpecProvider> {
    tool_path: PathBuf,
    plan: ConcurrencyPlan,
    provider: P,
    sink: Arc<dyn EventSink>,
    run: Option<Arc<LifecycleController>>,
}

impl<P: JobSpecProvider> Scheduler<P> {
    /// Create a scheduler for the tool at `tool_path`; slots and cancel grace
    /// come from `cfg`.
    pub fn new(cfg: &Config, tool_path: PathBuf, provider: P, sink: Arc<dyn EventSink>) -> Self {
        Self {
            tool_path,
            plan: ConcurrencyPlan::derive(cfg),
            provider,
            sink,
            run: None,
        }
    }

    /// Slot count and cancel grace in effect
    pub fn plan(&self) -> &ConcurrencyPlan {
        &self.plan
    }

    /// Binary launched for every job
    pub fn tool_path(&self) -> &Path {
        &self.tool_path
    }

    /// Build one job per work item, in order. Replaces any previous run.
    ///
    /// Fails with [`SchedulerError::DuplicateOutput`] when two items map to the
    /// same output path; no run is prepared in that case.
    pub async fn setup(&mut self, items: Vec<P::Item>) -> Result<usize, SchedulerError> {
        if let Some(run) = &self.run {
            if run.state().await.is_running() {
                return Err(SchedulerError::AlreadyStarted);
            }
        }

        let jobs: Vec<JobRecord> = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let output = self.provider.output_path(item, index);
                let arguments = self.provider.arguments(item, index, &output);
                JobRecord::new(index, output, arguments, self.provider.duration_hint(item))
            })
            .collect();

        let mut outputs = HashSet::new();
        if let Some(job) = jobs.iter().find(|job| !outputs.insert(&job.output_path)) {
            return Err(SchedulerError::DuplicateOutput(job.output_path.clone()));
        }
        let count = jobs.len();

        let run = LifecycleController::new(jobs, self.plan.slots, self.sink.clone());
        debug!(
            run_id = %run.run_id(),
            jobs = count,
            slots = self.plan.slots,
            tool = %self.tool_path().display(),
            "run prepared"
        );
        self.run = Some(Arc::new(run));
        Ok(count)
    }

    /// Register work to run once every job has succeeded
    pub async fn set_continuation(&self, continuation: Continuation) -> Result<(), SchedulerError> {
        let run = self.run.as_ref().ok_or(SchedulerError::NotReady)?;
        run.set_continuation(continuation).await;
        Ok(())
    }

    /// Emit `Started` and launch the jobs in the background.
    ///
    /// The returned handle resolves once every launched process has been
    /// reaped.
    pub async fn start_all(&self, label: &str) -> Result<JoinHandle<()>, SchedulerError> {
        let run = self.run.clone().ok_or(SchedulerError::NotReady)?;
        let total = run.begin(label).await.ok_or(SchedulerError::AlreadyStarted)?;
        let tool = self.tool_path.clone();
        Ok(tokio::spawn(launch_loop(run, tool, total)))
    }

    /// Stop the run, killing live processes and removing their outputs.
    ///
    /// Returns false when there was no running run to cancel.
    pub async fn cancel(&self, reason: &str) -> bool {
        let Some(run) = &self.run else {
            return false;
        };
        let Some(targets) = run.begin_cancel(reason).await else {
            return false;
        };
        terminate_and_clean(targets, self.plan.cancel_grace).await;
        run.complete_cancel(reason).await;
        true
    }

    /// Id of the prepared run, if any
    pub fn run_id(&self) -> Option<Uuid> {
        self.run.as_ref().map(|run| run.run_id())
    }

    /// Current run state; `Idle` before `setup`
    pub async fn state(&self) -> RunState {
        match &self.run {
            Some(run) => run.state().await,
            None => RunState::Idle,
        }
    }

    /// Counters of the prepared run
    pub async fn stats(&self) -> RunStats {
        match &self.run {
            Some(run) => run.stats().await,
            None => RunStats::default(),
        }
    }

    /// Why the run stopped, once it failed or was cancelled
    pub async fn failure(&self) -> Option<RunError> {
        match &self.run {
            Some(run) => run.failure().await,
            None => None,
        }
    }

    /// Snapshots of every job, in order. Empty once the run has ended.
    pub async fn jobs(&self) -> Vec<JobSnapshot> {
        match &self.run {
            Some(run) => run.jobs().await,
            None => Vec::new(),
        }
    }
}

async fn launch_loop(run: Arc<LifecycleController>, tool: PathBuf, total: usize) {
    let mut watchers = JoinSet::new();

    for index in 0..total {
        // Closed once the run fails, is cancelled or finishes
        let Some(permit) = run.acquire_slot().await else {
            break;
        };
        match run.launch(index, |job| spawn_tool(&tool, job)).await {
            LaunchOutcome::Launched { child, kill_rx } => {
                watchers.spawn(watch_job(run.clone(), index, child, kill_rx, permit));
            }
            LaunchOutcome::Halted => break,
        }
    }

    while let Some(joined) = watchers.join_next().await {
        if let Err(e) = joined {
            warn!(run_id = %run.run_id(), error = %e, "job watcher panicked");
        }
    }
    debug!(run_id = %run.run_id(), "launch loop done");
}

fn spawn_tool(tool: &Path, job: &JobRecord) -> std::io::Result<(Child, Option<u32>)> {
    let child = Command::new(tool)
        .args(&job.arguments)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;
    let pid = child.id();
    Ok((child, pid))
}

enum Ending {
    Exited(std::io::Result<ExitStatus>),
    Killed(oneshot::Sender<()>),
}

async fn watch_job(
    run: Arc<LifecycleController>,
    index: usize,
    mut child: Child,
    mut kill_rx: oneshot::Receiver<oneshot::Sender<()>>,
    permit: OwnedSemaphorePermit,
) {
    let reader = child.stderr.take().map(|stderr| {
        let run = run.clone();
        tokio::spawn(async move { pump_lines(&run, index, stderr).await })
    });

    let ending = tokio::select! {
        status = child.wait() => Ending::Exited(status),
        request = &mut kill_rx => match request {
            Ok(ack) => Ending::Killed(ack),
            // Handle dropped without a kill request
            Err(_) => Ending::Exited(child.wait().await),
        },
    };

    match ending {
        Ending::Killed(ack) => {
            if let Err(e) = child.kill().await {
                warn!(run_id = %run.run_id(), job = index, error = %e, "kill failed");
            }
            if let Some(reader) = reader {
                reader.abort();
            }
            let _ = ack.send(());
        }
        Ending::Exited(status) => {
            // A cancel arriving from here on finds the process already gone
            drop(kill_rx);

            let outcome = match status {
                Ok(status) => {
                    info!(run_id = %run.run_id(), job = index, code = status.code(), "process exited");
                    ExitOutcome::from(status)
                }
                Err(e) => {
                    warn!(run_id = %run.run_id(), job = index, error = %e, "wait failed");
                    ExitOutcome::Failure(None)
                }
            };

            // Every line is delivered before the exit is handled
            if let Some(mut reader) = reader {
                if tokio::time::timeout(STREAM_DRAIN_TIMEOUT, &mut reader).await.is_err() {
                    warn!(run_id = %run.run_id(), job = index, "stderr still open after exit, dropping the rest");
                    reader.abort();
                }
            }
            run.on_exit(index, outcome).await;
        }
    }

    drop(permit);
}
