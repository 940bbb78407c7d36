//! Media Batch engine
//!
//! Runs batches of media tool jobs, at most two at a time, turning the tool's
//! diagnostic output into progress, error and completion events.

mod cancel;
pub mod concurrency;
pub mod events;
pub mod job;
pub mod lifecycle;
pub mod progress_line;
pub mod provider;
pub mod run_state;
pub mod scheduler;
pub mod stream;
pub mod tool;

pub use concurrency::{derive_plan, ConcurrencyPlan, MAX_RUNNING_JOBS};
pub use events::{ChannelSink, EventSink, RunEvent};
pub use job::{JobPhase, JobRecord, JobSnapshot};
pub use lifecycle::{Continuation, ExitOutcome, LifecycleController, RunError, RunStats};
pub use media_batch_config as config;
pub use media_batch_config::Config;
pub use progress_line::{classify_line, parse_timestamp, LineKind};
pub use provider::{ConvertProvider, JobSpecProvider};
pub use run_state::RunState;
pub use scheduler::{Scheduler, SchedulerError};
pub use stream::{LineSplitter, MAX_LINE_BYTES};
pub use tool::{check_tool_available, parse_tool_version, resolve_tool_path, ToolError};
