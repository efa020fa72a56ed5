//! builddb-core library.
//!
//! Materializes a build's lifecycle event stream into a relational SQLite
//! artifact: one build row with its environment, the project hierarchy, and
//! deduplicated properties.
//!
//! ```no_run
//! use builddb_core::{Ingestor, IngestConfig, event::parser};
//!
//! # fn main() -> anyhow::Result<()> {
//! let trace = std::fs::read_to_string("build.jsonl")?;
//! let events = parser::parse_lines(&trace).map_err(|(line, e)| anyhow::anyhow!("line {line}: {e}"))?;
//!
//! let mut ingestor = Ingestor::initialize(IngestConfig::new("build.builddb"))?;
//! ingestor.replay(&events)?;
//! let report = ingestor.shutdown()?;
//! println!("{} projects", report.counts.projects);
//! # Ok(())
//! # }
//! ```
//!
//! # Conventions
//!
//! - **Errors**: [`IngestError`] at the engine boundary, `anyhow::Result` for
//!   backend helpers.
//! - **Logging**: `tracing` macros; the host installs the subscriber.

pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod ingest;
pub mod intern;
pub mod model;
pub mod session;
pub mod tracker;

pub use config::{IngestConfig, StagingMode, load_config};
pub use error::{ErrorCode, IngestError};
pub use event::{BuildEvent, EventKind};
pub use ingest::{IngestState, IngestStats, Ingestor, ShutdownReport};
