//! Per-job state tracked while a run is in flight

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::oneshot;

/// Where a single job is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Waiting for a free slot
    Pending,
    /// Process spawned, no progress line seen yet
    Launched,
    /// At least one progress update received
    Progressing,
    /// Process exited or was killed
    Exited,
}

impl JobPhase {
    pub fn as_str(&self) -> &str {
        match self {
            JobPhase::Pending => "pending",
            JobPhase::Launched => "launched",
            JobPhase::Progressing => "progressing",
            JobPhase::Exited => "exited",
        }
    }

    /// Launched or progressing
    pub fn is_running(&self) -> bool {
        matches!(self, JobPhase::Launched | JobPhase::Progressing)
    }
}

/// Handle to a live child process.
///
/// The child itself is owned by its exit watcher task; this handle asks the
/// watcher to kill it and resolves the inner sender once the child is reaped.
#[derive(Debug)]
pub(crate) struct ProcessHandle {
    pub pid: Option<u32>,
    pub kill: oneshot::Sender<oneshot::Sender<()>>,
}

/// Mutable state of one job
#[derive(Debug)]
pub struct JobRecord {
    /// Position in the run, stable for the lifetime of the run
    pub index: usize,
    /// File the tool writes to
    pub output_path: PathBuf,
    /// Arguments passed to the tool
    pub arguments: Vec<String>,
    /// Encode position reported so far
    pub current_position: Duration,
    /// Total media length, from the provider hint or the first declaration line
    pub total_duration: Option<Duration>,
    /// Set once the process has exited successfully
    pub finished: bool,
    pub phase: JobPhase,
    pub(crate) process: Option<ProcessHandle>,
}

impl JobRecord {
    pub fn new(
        index: usize,
        output_path: PathBuf,
        arguments: Vec<String>,
        total_duration: Option<Duration>,
    ) -> Self {
        Self {
            index,
            output_path,
            arguments,
            current_position: Duration::ZERO,
            total_duration,
            finished: false,
            phase: JobPhase::Pending,
            process: None,
        }
    }

    /// Progress in percent; 0 while the total duration is unknown or zero
    pub fn percentage(&self) -> f64 {
        match self.total_duration {
            Some(total) if !total.is_zero() => {
                self.current_position.as_secs_f64() / total.as_secs_f64() * 100.0
            }
            _ => 0.0,
        }
    }

    /// Record the total duration unless one is already known.
    ///
    /// Returns true if the value was taken.
    pub fn record_duration(&mut self, duration: Duration) -> bool {
        if self.total_duration.is_some() {
            return false;
        }
        self.total_duration = Some(duration);
        true
    }

    /// Move the encode position forward; earlier timestamps are ignored.
    pub fn advance_position(&mut self, position: Duration) {
        if position > self.current_position {
            self.current_position = position;
        }
        if self.phase == JobPhase::Launched {
            self.phase = JobPhase::Progressing;
        }
    }

    /// Mark the job finished. Returns false if it already was.
    pub fn mark_finished(&mut self) -> bool {
        if self.finished {
            return false;
        }
        self.finished = true;
        true
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            index: self.index,
            output_path: self.output_path.clone(),
            phase: self.phase,
            percentage: self.percentage(),
            current_position_secs: self.current_position.as_secs_f64(),
            total_duration_secs: self.total_duration.map(|d| d.as_secs_f64()),
            finished: self.finished,
            pid: self.process.as_ref().and_then(|p| p.pid),
        }
    }
}

/// Read-only copy of a [`JobRecord`] for display and inspection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSnapshot {
    pub index: usize,
    pub output_path: PathBuf,
    pub phase: JobPhase,
    pub percentage: f64,
    pub current_position_secs: f64,
    pub total_duration_secs: Option<f64>,
    pub finished: bool,
    pub pid: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(total: Option<Duration>) -> JobRecord {
        JobRecord::new(0, PathBuf::from("/tmp/out.mkv"), Vec::new(), total)
    }

    #[test]
    fn test_new_record_is_pending() {
        let job = record(None);
        assert_eq!(job.phase, JobPhase::Pending);
        assert!(!job.finished);
        assert_eq!(job.current_position, Duration::ZERO);
        assert_eq!(job.percentage(), 0.0);
    }

    #[test]
    fn test_percentage_against_known_duration() {
        let mut job = record(Some(Duration::from_millis(135_300)));
        job.advance_position(Duration::from_secs(4));
        assert!((job.percentage() - 2.956).abs() < 0.01);
    }

    #[test]
    fn test_zero_duration_reports_zero() {
        let mut job = record(Some(Duration::ZERO));
        job.advance_position(Duration::from_secs(4));
        assert_eq!(job.percentage(), 0.0);
    }

    #[test]
    fn test_duration_recorded_once() {
        let mut job = record(None);
        assert!(job.record_duration(Duration::from_secs(10)));
        assert!(!job.record_duration(Duration::from_secs(99)));
        assert_eq!(job.total_duration, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_hint_blocks_declaration() {
        let mut job = record(Some(Duration::from_secs(30)));
        assert!(!job.record_duration(Duration::from_secs(10)));
        assert_eq!(job.total_duration, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_first_progress_moves_phase() {
        let mut job = record(None);
        job.phase = JobPhase::Launched;
        job.advance_position(Duration::from_secs(1));
        assert_eq!(job.phase, JobPhase::Progressing);
    }

    #[test]
    fn test_mark_finished_once() {
        let mut job = record(None);
        assert!(job.mark_finished());
        assert!(!job.mark_finished());
        assert!(job.finished);
    }

    #[test]
    fn test_phase_names_match_serde() {
        for phase in [
            JobPhase::Pending,
            JobPhase::Launched,
            JobPhase::Progressing,
            JobPhase::Exited,
        ] {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json, format!("\"{}\"", phase.as_str()));
        }
    }

    #[test]
    fn test_snapshot_serializes_phase_snake_case() {
        let job = record(Some(Duration::from_secs(2)));
        let json = serde_json::to_string(&job.snapshot()).unwrap();
        assert!(json.contains("\"phase\":\"pending\""));
        assert!(json.contains("\"total_duration_secs\":2.0"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_percentage_matches_ratio(
            total_ms in 1u64..10_000_000,
            position_ms in 0u64..10_000_000,
        ) {
            let mut job = record(Some(Duration::from_millis(total_ms)));
            job.advance_position(Duration::from_millis(position_ms));

            let expected = position_ms as f64 / total_ms as f64 * 100.0;
            prop_assert!((job.percentage() - expected).abs() < 1e-6);
        }

        #[test]
        fn prop_position_never_decreases(
            positions in proptest::collection::vec(0u64..100_000, 1..20),
        ) {
            let mut job = record(None);
            let mut high = Duration::ZERO;
            for ms in positions {
                job.advance_position(Duration::from_millis(ms));
                high = high.max(Duration::from_millis(ms));
                prop_assert_eq!(job.current_position, high);
            }
        }
    }
}
