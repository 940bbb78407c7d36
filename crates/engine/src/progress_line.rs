//! Diagnostic line classification
//!
//! The media tool writes a line-oriented status stream to stderr. Each line is
//! classified into one of a handful of kinds; timestamps are read from the fixed
//! 11-character field that follows the `Duration: ` and `time=` tokens.

use std::time::Duration;

/// Token that precedes the total media length
pub const DURATION_TOKEN: &str = "Duration: ";
/// Token that precedes the current encode position
pub const TIME_TOKEN: &str = "time=";
/// Literal that marks a fatal error line
pub const ERROR_MARKER: &str = "ERROR";

const TIMESTAMP_WIDTH: usize = 11;

/// Classification of a single diagnostic line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// Line carries the `ERROR` marker
    Error,
    /// End-of-stream summary (`global headers:` + `muxing overhead:`)
    StreamComplete,
    /// Total media length declaration
    Duration(Duration),
    /// Periodic `frame=` / `fps=` / `time=` status line
    Progress(Duration),
    /// Anything else
    Unclassified,
}

/// Classify one raw diagnostic line.
///
/// Precedence is error, stream summary, duration declaration, progress update.
/// A declaration or progress line whose timestamp field cannot be parsed
/// (ffmpeg prints `Duration: N/A` for some inputs) is treated as unclassified.
pub fn classify_line(line: &str) -> LineKind {
    if line.contains(ERROR_MARKER) {
        return LineKind::Error;
    }

    if is_stream_complete(line) {
        return LineKind::StreamComplete;
    }

    if line.contains(DURATION_TOKEN) {
        return timestamp_after(line, DURATION_TOKEN)
            .map(LineKind::Duration)
            .unwrap_or(LineKind::Unclassified);
    }

    if is_progress(line) {
        return timestamp_after(line, TIME_TOKEN)
            .map(LineKind::Progress)
            .unwrap_or(LineKind::Unclassified);
    }

    LineKind::Unclassified
}

/// True for the periodic status line emitted while encoding
pub fn is_progress(line: &str) -> bool {
    line.contains("frame=") && line.contains("fps=") && line.contains(TIME_TOKEN)
}

/// True for the summary line printed once the output has been fully written
pub fn is_stream_complete(line: &str) -> bool {
    line.contains("global headers:") && line.contains("muxing overhead:")
}

/// Read the fixed-width timestamp that immediately follows `token`.
fn timestamp_after(line: &str, token: &str) -> Option<Duration> {
    let start = line.find(token)? + token.len();
    let field: String = line[start..].chars().take(TIMESTAMP_WIDTH).collect();
    parse_timestamp(&field)
}

/// Parse an `H:MM:SS.hh` timestamp.
///
/// Hours may have any number of digits and the fractional part is optional.
/// Trailing separators that spill into the fixed-width field (`,` or spaces when
/// the hour has a single digit) are ignored.
pub fn parse_timestamp(s: &str) -> Option<Duration> {
    let s = s.trim().trim_end_matches(|c: char| !c.is_ascii_digit());

    let mut parts = s.split(':');
    let hours = parse_digits(parts.next()?)?;
    let minutes = parse_digits(parts.next()?)?;
    let seconds_part = parts.next()?;
    if parts.next().is_some() || minutes >= 60 {
        return None;
    }

    let (whole, frac) = match seconds_part.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (seconds_part, ""),
    };
    let seconds = parse_digits(whole)?;
    if seconds >= 60 {
        return None;
    }

    let nanos = if frac.is_empty() {
        0
    } else {
        if frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let padded = format!("{:0<9}", frac);
        padded.parse::<u32>().ok()?
    };

    let total_secs = hours
        .checked_mul(3600)?
        .checked_add(minutes * 60)?
        .checked_add(seconds)?;
    Some(Duration::new(total_secs, nanos))
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
