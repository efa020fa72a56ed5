//! Recorded-trace reader: one JSON event per line.
//!
//! ```text
//! # comment lines and blank lines are ignored
//! {"type":"build_started","timestamp":"2019-04-15T01:17:11Z","environment":{"OS":"linux"}}
//! {"type":"project_started","timestamp":"2019-04-15T01:17:12Z","context_id":1}
//! ```
//!
//! Lines whose `type` tag is not modelled are not errors: they come back as
//! [`BuildEvent::Unsupported`] so the engine can log and skip them.

use serde_json::Value;
use tracing::debug;

use super::data::{BuildEvent, UnsupportedData};

/// Tag values understood by [`BuildEvent`]'s serde representation.
const KNOWN_TAGS: &[&str] = &[
    "build_started",
    "build_finished",
    "project_started",
    "project_finished",
    "unsupported",
];

/// Errors from parsing a single trace line.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The line is not valid JSON, or a known event has a malformed payload.
    #[error("invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The line is valid JSON but has no string `type` tag.
    #[error("event object has no \"type\" tag")]
    MissingTag,
}

/// Parse one trace line.
///
/// Returns `Ok(None)` for blank lines and `#` comments.
///
/// # Errors
///
/// Returns a [`ParseError`] if the line is not a well-formed event.
pub fn parse_line(line: &str) -> Result<Option<BuildEvent>, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(trimmed)?;
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingTag)?;

    if !KNOWN_TAGS.contains(&tag) {
        debug!(tag, "trace line has an unmodelled event type");
        return Ok(Some(BuildEvent::Unsupported(UnsupportedData {
            kind: tag.to_string(),
            len: u64::try_from(trimmed.len()).ok(),
        })));
    }

    Ok(Some(serde_json::from_value(value)?))
}

/// Parse multiple trace lines, skipping comments and blanks.
///
/// # Errors
///
/// Returns `(line_number, ParseError)` on the first malformed line. Line
/// numbers are 1-indexed.
pub fn parse_lines(input: &str) -> Result<Vec<BuildEvent>, (usize, ParseError)> {
    let mut events = Vec::new();
    for (i, line) in input.lines().enumerate() {
        match parse_line(line) {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(e) => return Err((i + 1, e)),
        }
    }
    Ok(events)
}
