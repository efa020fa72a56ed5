//! Typed identifiers.
//!
//! Row ids are `INTEGER PRIMARY KEY` values handed out by `SQLite`. They are
//! wrapped so a property id can never be passed where a project id is
//! expected. [`ContextId`] is different: it comes from the event stream and
//! is only unique within one build.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw row id read back from the database.
            #[must_use]
            pub const fn from_raw(raw: i64) -> Self {
                Self(raw)
            }

            /// The raw row id, for binding into SQL parameters.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Row id in `Builds`.
    BuildId
);
row_id!(
    /// Row id in `Projects`.
    ProjectId
);
row_id!(
    /// Row id in `PropertyDefinitions`.
    DefinitionId
);
row_id!(
    /// Row id in `Properties`.
    PropertyId
);

/// Per-build project context identifier as reported by the event source.
///
/// Zero and negative values mean "no project" (the event source uses them for
/// an absent parent).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ContextId(pub i32);

impl ContextId {
    /// Returns `Some(self)` when this id names a real project.
    #[must_use]
    pub const fn present(self) -> Option<Self> {
        if self.0 > 0 { Some(self) } else { None }
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for ContextId {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_id_zero_and_negative_are_absent() {
        assert_eq!(ContextId(0).present(), None);
        assert_eq!(ContextId(-1).present(), None);
        assert_eq!(ContextId(7).present(), Some(ContextId(7)));
    }

    #[test]
    fn context_id_serializes_as_bare_integer() {
        let json = serde_json::to_string(&ContextId(42)).expect("serialize");
        assert_eq!(json, "42");
        let back: ContextId = serde_json::from_str("42").expect("deserialize");
        assert_eq!(back, ContextId(42));
    }
}
