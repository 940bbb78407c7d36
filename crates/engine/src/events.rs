//! Observable surface of a run
//!
//! A run reports to a single [`EventSink`]. Exactly one `Started`, any number of
//! `Progress`, and one terminal `Error` or `Finished` event are produced per run.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Lifecycle event raised by a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        label: String,
    },
    Progress {
        job_index: usize,
        percentage: f64,
        line: String,
    },
    Error {
        message: String,
    },
    Finished {
        cancelled: bool,
        message: Option<String>,
    },
}

impl RunEvent {
    /// True for `Error` and `Finished`
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Error { .. } | RunEvent::Finished { .. })
    }

    /// Single-line JSON encoding
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Receiver of run events.
///
/// `emit` is called with the run's state lock held, so implementations must not
/// block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RunEvent);
}

/// Sink that forwards events into an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: RunEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

impl<F> EventSink for F
where
    F: Fn(RunEvent) + Send + Sync,
{
    fn emit(&self, event: RunEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_terminal_events() {
        assert!(RunEvent::Error { message: "x".into() }.is_terminal());
        assert!(RunEvent::Finished { cancelled: false, message: None }.is_terminal());
        assert!(!RunEvent::Started { label: "x".into() }.is_terminal());
        assert!(!RunEvent::Progress { job_index: 0, percentage: 0.0, line: String::new() }
            .is_terminal());
    }

    #[test]
    fn test_json_is_tagged() {
        let event = RunEvent::Progress {
            job_index: 1,
            percentage: 50.0,
            line: "frame=1".to_string(),
        };
        let json = event.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"event":"progress","job_index":1,"percentage":50.0,"line":"frame=1"}"#
        );

        let back: RunEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(RunEvent::Started { label: "Converting".into() });
        sink.emit(RunEvent::Finished { cancelled: true, message: Some("user".into()) });

        assert_eq!(rx.recv().await, Some(RunEvent::Started { label: "Converting".into() }));
        assert_eq!(
            rx.recv().await,
            Some(RunEvent::Finished { cancelled: true, message: Some("user".into()) })
        );
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(RunEvent::Error { message: "late".into() });
    }

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let sink = move |event: RunEvent| seen_clone.lock().unwrap().push(event);

        sink.emit(RunEvent::Started { label: "Merging".into() });
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
