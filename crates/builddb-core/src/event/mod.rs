//! Build lifecycle events consumed by the ingestion engine.
//!
//! The event source (a replayed build trace) is external; this module only
//! defines the typed events it delivers and a JSON-lines reader for traces
//! recorded in that serde form.

pub mod data;
pub mod parser;
pub mod types;

pub use data::{
    BuildEvent, BuildFinishedData, BuildStartedData, ProjectFinishedData, ProjectStartedData,
    PropertyMap, UnsupportedData,
};
pub use types::EventKind;
