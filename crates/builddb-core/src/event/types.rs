//! Event kind enum covering the lifecycle events the engine models.
//!
//! The string form uses the `<entity>.<verb>` dotted convention; it is what
//! logs and error messages print.

use std::fmt;

/// The kinds of build lifecycle event delivered by the event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The build began; carries the environment snapshot.
    BuildStarted,
    /// The build ended with a success flag.
    BuildFinished,
    /// A project began building.
    ProjectStarted,
    /// A project finished building.
    ProjectFinished,
    /// A payload the engine does not model yet.
    Unsupported,
}

impl EventKind {
    /// Return the canonical dotted string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BuildStarted => "build.started",
            Self::BuildFinished => "build.finished",
            Self::ProjectStarted => "project.started",
            Self::ProjectFinished => "project.finished",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
