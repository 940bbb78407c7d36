//! Concurrency planning
//!
//! Derives the slot count and cancellation grace period from configuration.

use crate::config::Config;
use std::time::Duration;

/// Hard upper bound on simultaneously running tool processes
pub const MAX_RUNNING_JOBS: usize = 2;

/// Slot and timing plan for a run
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyPlan {
    /// Number of processes allowed to run at once
    pub slots: usize,
    /// How long cancellation waits for each killed process to be reaped
    pub cancel_grace: Duration,
}

impl ConcurrencyPlan {
    /// Derive a plan from configuration
    ///
    /// - `max_concurrent_jobs = 0` selects the default of [`MAX_RUNNING_JOBS`]
    /// - any other value is clamped to `[1, MAX_RUNNING_JOBS]`
    pub fn derive(cfg: &Config) -> Self {
        Self {
            slots: derive_slot_count(cfg.scheduler.max_concurrent_jobs),
            cancel_grace: Duration::from_millis(cfg.scheduler.cancel_grace_ms),
        }
    }
}

impl Default for ConcurrencyPlan {
    fn default() -> Self {
        Self::derive(&Config::default())
    }
}

fn derive_slot_count(requested: u32) -> usize {
    if requested == 0 {
        MAX_RUNNING_JOBS
    } else {
        (requested as usize).clamp(1, MAX_RUNNING_JOBS)
    }
}

/// Public function to derive a concurrency plan from configuration
pub fn derive_plan(cfg: &Config) -> ConcurrencyPlan {
    ConcurrencyPlan::derive(cfg)
}
