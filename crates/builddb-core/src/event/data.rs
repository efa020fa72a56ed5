//! Typed payloads for each event kind.
//!
//! Property bags are `BTreeMap`s: keys are unique within a bag and iteration
//! order is deterministic, so replaying the same trace writes rows in the
//! same order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::EventKind;
use crate::model::ContextId;

/// Ordered key/value property bag.
pub type PropertyMap = BTreeMap<String, String>;

/// Payload for [`EventKind::BuildStarted`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStartedData {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub environment: PropertyMap,
}

/// Payload for [`EventKind::BuildFinished`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFinishedData {
    pub timestamp: DateTime<Utc>,
    pub succeeded: bool,
}

/// Payload for [`EventKind::ProjectStarted`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStartedData {
    pub timestamp: DateTime<Utc>,
    pub context_id: ContextId,
    /// Zero or absent when the project has no parent.
    #[serde(default)]
    pub parent_context_id: ContextId,
    /// Semicolon-separated target list; empty means the default targets.
    #[serde(default)]
    pub target_names: String,
    #[serde(default)]
    pub tools_version: Option<String>,
    #[serde(default)]
    pub project_file: Option<String>,
    #[serde(default)]
    pub global_properties: PropertyMap,
    #[serde(default)]
    pub properties: PropertyMap,
}

impl ProjectStartedData {
    /// The parent context id, if this project was started by another.
    #[must_use]
    pub const fn parent(&self) -> Option<ContextId> {
        self.parent_context_id.present()
    }
}

/// Payload for [`EventKind::ProjectFinished`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFinishedData {
    pub timestamp: DateTime<Utc>,
    pub context_id: ContextId,
}

/// Payload for [`EventKind::Unsupported`]: anything the engine skips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedData {
    /// Source-side name of the skipped event or embedded blob.
    pub kind: String,
    /// Payload size in bytes, when the source reports it.
    #[serde(default)]
    pub len: Option<u64>,
}

/// One lifecycle event as delivered by the event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildEvent {
    BuildStarted(BuildStartedData),
    BuildFinished(BuildFinishedData),
    ProjectStarted(ProjectStartedData),
    ProjectFinished(ProjectFinishedData),
    Unsupported(UnsupportedData),
}

impl BuildEvent {
    /// The kind discriminant of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::BuildStarted(_) => EventKind::BuildStarted,
            Self::BuildFinished(_) => EventKind::BuildFinished,
            Self::ProjectStarted(_) => EventKind::ProjectStarted,
            Self::ProjectFinished(_) => EventKind::ProjectFinished,
            Self::Unsupported(_) => EventKind::Unsupported,
        }
    }

    /// The event timestamp, when the kind carries one.
    #[must_use]
    pub const fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::BuildStarted(data) => Some(data.timestamp),
            Self::BuildFinished(data) => Some(data.timestamp),
            Self::ProjectStarted(data) => Some(data.timestamp),
            Self::ProjectFinished(data) => Some(data.timestamp),
            Self::Unsupported(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn project_started_defaults_optional_fields() {
        let event: BuildEvent = serde_json::from_value(json!({
            "type": "project_started",
            "timestamp": "2019-04-15T01:17:11Z",
            "context_id": 4
        }))
        .expect("deserialize");

        let BuildEvent::ProjectStarted(data) = event else {
            panic!("expected ProjectStarted");
        };
        assert_eq!(data.context_id, ContextId(4));
        assert_eq!(data.parent(), None);
        assert!(data.target_names.is_empty());
        assert!(data.tools_version.is_none());
        assert!(data.properties.is_empty());
    }

    #[test]
    fn kind_tag_is_snake_case() {
        let event = BuildEvent::Unsupported(UnsupportedData {
            kind: "ProjectImports".into(),
            len: Some(512),
        });
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["type"], "unsupported");
        assert_eq!(event.kind(), EventKind::Unsupported);
        assert_eq!(event.timestamp(), None);
    }
}
