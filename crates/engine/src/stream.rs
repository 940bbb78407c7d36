//! Diagnostic stream framing
//!
//! ffmpeg ends its periodic status line with a bare `\r` so a terminal can
//! redraw it in place, and everything else with `\n`. Both (and `\r\n`) end
//! a line here.

use crate::lifecycle::LifecycleController;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

const READ_CHUNK: usize = 4096;

/// Longest line kept intact; anything longer is split at this length
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Incremental splitter over raw stderr bytes
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
    last_was_cr: bool,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns the lines it completed. Empty lines are dropped.
    ///
    /// An unterminated run of [`MAX_LINE_BYTES`] bytes is cut off as a line of
    /// its own.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            match byte {
                b'\n' if self.last_was_cr => {
                    self.last_was_cr = false;
                }
                b'\r' | b'\n' => {
                    self.last_was_cr = byte == b'\r';
                    if let Some(line) = self.take_pending() {
                        lines.push(line);
                    }
                }
                _ => {
                    self.last_was_cr = false;
                    self.pending.push(byte);
                    if self.pending.len() >= MAX_LINE_BYTES {
                        lines.extend(self.take_pending());
                    }
                }
            }
        }
        lines
    }

    /// Flush a trailing line that had no terminator
    pub fn finish(&mut self) -> Option<String> {
        self.last_was_cr = false;
        self.take_pending()
    }

    fn take_pending(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}

/// Read a job's diagnostic stream to the end, forwarding each line.
pub(crate) async fn pump_lines<R>(controller: &LifecycleController, index: usize, mut reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(job = index, error = %e, "diagnostic stream read failed");
                break;
            }
        };
        for line in splitter.push(&buf[..n]) {
            controller.on_line(index, &line).await;
        }
    }

    if let Some(line) = splitter.finish() {
        controller.on_line(index, &line).await;
    }
}
