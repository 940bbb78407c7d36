//! Console rendering of run events

use media_batch::{classify_line, LineKind, RunEvent};

/// Output format selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

/// Render one event, or `None` when it has nothing to show in this format.
///
/// Text output shows percentages only for status lines and job completion;
/// every other diagnostic line is left to the JSON stream.
pub fn render_event(event: &RunEvent, format: Format) -> Option<String> {
    if format == Format::Json {
        return event.to_json().ok();
    }

    match event {
        RunEvent::Started { label } => Some(format!("{}...", label)),
        RunEvent::Progress {
            job_index,
            percentage,
            line,
        } => {
            let is_status = line.is_empty() || matches!(classify_line(line), LineKind::Progress(_));
            is_status.then(|| format!("[job {}] {:5.1}%", job_index + 1, percentage))
        }
        RunEvent::Error { message } => Some(format!("Error: {}", message)),
        RunEvent::Finished {
            cancelled: false, ..
        } => Some("Finished".to_string()),
        RunEvent::Finished {
            cancelled: true,
            message,
        } => Some(format!(
            "Cancelled ({})",
            message.as_deref().unwrap_or("no reason given")
        )),
    }
}
