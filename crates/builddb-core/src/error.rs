use std::fmt;
use std::path::PathBuf;

use crate::event::types::EventKind;
use crate::model::ContextId;

/// Machine-readable error codes for scripted callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    DestinationUnavailable,
    ProjectNotStarted,
    InvalidStateTransition,
    EventAfterClose,
    CycleDetected,
    SessionAborted,
    StorageFailure,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::DestinationUnavailable => "E1002",
            Self::ProjectNotStarted => "E2001",
            Self::InvalidStateTransition => "E2002",
            Self::EventAfterClose => "E2003",
            Self::CycleDetected => "E2004",
            Self::SessionAborted => "E3001",
            Self::StorageFailure => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::DestinationUnavailable => "Build database destination unavailable",
            Self::ProjectNotStarted => "Project finished without being started",
            Self::InvalidStateTransition => "Invalid build lifecycle transition",
            Self::EventAfterClose => "Event received after the build finished",
            Self::CycleDetected => "Project parent link would create a cycle",
            Self::SessionAborted => "Ingestion session aborted",
            Self::StorageFailure => "SQLite storage failure",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix the syntax of the ingestion config file and retry."),
            Self::DestinationUnavailable => {
                Some("Check that the output directory exists and is writable.")
            }
            Self::ProjectNotStarted | Self::EventAfterClose | Self::CycleDetected => {
                Some("The recorded build trace is corrupt or out of order; re-record it.")
            }
            Self::InvalidStateTransition => {
                Some("A trace holds exactly one build: started -> projects -> finished.")
            }
            Self::SessionAborted => {
                Some("Inspect the first error of this session; later events were rejected.")
            }
            Self::StorageFailure => Some("Check disk space and write permissions."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised while ingesting build events.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// A finish event named a project that was never observed.
    #[error("project {context_id} finished but was never started")]
    ProjectNotStarted { context_id: ContextId },

    /// The event does not fit the current build lifecycle state.
    #[error("invalid build lifecycle transition: {0}")]
    InvalidState(String),

    /// An event arrived after the build finished.
    #[error("{kind} event received after the build finished")]
    SessionClosed { kind: EventKind },

    /// An earlier failure aborted the session.
    #[error("ingestion session aborted by an earlier failure")]
    SessionAborted,

    /// Linking `context_id` under `parent` would make the hierarchy cyclic.
    #[error("project {context_id} cannot have parent {parent}: cycle in project hierarchy")]
    ParentCycle {
        context_id: ContextId,
        parent: ContextId,
    },

    /// The destination artifact could not be created or written.
    #[error("build database destination {}: {source:#}", path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The ingestion config is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// The persistence backend rejected a statement or commit.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IngestError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ProjectNotStarted { .. } => ErrorCode::ProjectNotStarted,
            Self::InvalidState(_) => ErrorCode::InvalidStateTransition,
            Self::SessionClosed { .. } => ErrorCode::EventAfterClose,
            Self::SessionAborted => ErrorCode::SessionAborted,
            Self::ParentCycle { .. } => ErrorCode::CycleDetected,
            Self::Destination { .. } => ErrorCode::DestinationUnavailable,
            Self::Config(_) => ErrorCode::ConfigParseError,
            Self::Storage(_) => ErrorCode::StorageFailure,
            Self::Other(_) => ErrorCode::InternalUnexpected,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    /// True when the event stream itself is inconsistent.
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::ProjectNotStarted { .. }
                | Self::InvalidState(_)
                | Self::SessionClosed { .. }
                | Self::ParentCycle { .. }
        )
    }
}

/// Result alias used by the ingestion components.
pub type Result<T, E = IngestError> = std::result::Result<T, E>;
