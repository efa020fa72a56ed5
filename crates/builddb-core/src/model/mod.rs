//! Domain model shared by the ingestion components.

pub mod ids;

pub use ids::{BuildId, ContextId, DefinitionId, ProjectId, PropertyId};

use chrono::{DateTime, Utc};

/// Convert an event timestamp to the microsecond column representation.
#[must_use]
pub fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Convert a stored microsecond value back into a timestamp.
///
/// Returns `None` if the value is outside chrono's representable range.
#[must_use]
pub fn from_micros(us: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us)
}
