//! Teardown of a cancelled run
//!
//! Live processes are killed one at a time. Each kill waits (bounded by the
//! grace period) until the child has been reaped before its partially written
//! output file is removed, so a file is never deleted while still open for
//! writing. Outputs of jobs that already finished are left alone.

use crate::lifecycle::CancelTarget;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

pub(crate) async fn terminate_and_clean(targets: Vec<CancelTarget>, grace: Duration) {
    for target in targets {
        if let Some(process) = target.process {
            let (ack_tx, ack_rx) = oneshot::channel();
            // A closed channel means the watcher already saw the process exit
            if process.kill.send(ack_tx).is_ok() {
                match tokio::time::timeout(grace, ack_rx).await {
                    Ok(_) => debug!(job = target.index, pid = process.pid, "process terminated"),
                    Err(_) => warn!(
                        job = target.index,
                        pid = process.pid,
                        "process not reaped within grace period"
                    ),
                }
            }
        }

        remove_output(target.index, &target.output_path).await;
    }
}

/// Best-effort removal; failures are logged and swallowed.
async fn remove_output(index: usize, path: &Path) {
    if path.as_os_str().is_empty() {
        return;
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!(job = index, path = %path.display(), "removed partial output"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(job = index, path = %path.display(), error = %e, "could not remove partial output"),
    }
}
