//! Event → build database ingestion engine.
//!
//! The [`Ingestor`] owns the connection and all in-flight state for one
//! session. It routes each lifecycle event to the build session, project
//! tracker and property interner, and commits every event in its own
//! transaction before accepting the next.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --build started--> BuildActive --build finished--> Closed
//!   \____________________________|___________________________/
//!                          any failure --> Faulted
//! ```
//!
//! A failed event rolls back its transaction and faults the session: every
//! later event is rejected, and [`Ingestor::shutdown`] deletes the
//! destination instead of finalizing it. In direct staging that includes the
//! events committed before the fault.

use std::borrow::Borrow;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rusqlite::Connection;
use tracing::{debug, error, info, warn};

use crate::config::{IngestConfig, StagingMode};
use crate::db::{self, query};
use crate::error::{IngestError, Result};
use crate::event::{BuildEvent, EventKind};
use crate::intern::PropertyInterner;
use crate::model::BuildId;
use crate::session::BuildSession;
use crate::tracker::{ProjectDetails, ProjectTracker};

// ---------------------------------------------------------------------------
// State and statistics
// ---------------------------------------------------------------------------

/// Where the engine is in the build lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    /// Initialized, waiting for the build to start.
    Idle,
    /// Build started; project events are accepted.
    BuildActive,
    /// Build finished; no further events are accepted.
    Closed,
    /// An event failed; the session is aborted.
    Faulted,
}

/// Counters accumulated over a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Events accepted, including skipped ones.
    pub events: usize,
    pub builds: usize,
    /// Projects hydrated from their own start event.
    pub projects_started: usize,
    pub projects_finished: usize,
    /// Projects first created as a parent placeholder.
    pub placeholders: usize,
    /// Unsupported payloads logged and skipped.
    pub skipped: usize,
}

/// Returned by [`Ingestor::shutdown`] once the artifact is durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub destination: PathBuf,
    pub staging: StagingMode,
    /// Wall-clock time from initialize to the end of shutdown.
    pub elapsed: Duration,
    /// Time spent on the final backup or consistency pass.
    pub save_elapsed: Duration,
    pub stats: IngestStats,
    pub counts: query::TableCounts,
}

// ---------------------------------------------------------------------------
// Ingestor
// ---------------------------------------------------------------------------

/// Materializes one build's event stream into a build database.
pub struct Ingestor {
    config: IngestConfig,
    conn: Connection,
    state: IngestState,
    interner: PropertyInterner,
    session: BuildSession,
    tracker: Option<ProjectTracker>,
    stats: IngestStats,
    sequence: u64,
    started: Instant,
}

impl Ingestor {
    /// Open the destination and schema and return an idle engine.
    ///
    /// With [`StagingMode::Memory`] the destination is created and probed for
    /// writability now, and the schema lives in memory until shutdown. With
    /// [`StagingMode::Direct`] the destination itself is opened and migrated.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] for an invalid config and
    /// [`IngestError::Destination`] if the artifact cannot be created.
    pub fn initialize(config: IngestConfig) -> Result<Self> {
        let started = Instant::now();
        config.validate()?;

        let destination_error = |source| IngestError::Destination {
            path: config.destination.clone(),
            source,
        };

        db::prepare_destination(&config.destination, config.overwrite)
            .map_err(destination_error)?;
        let opened = open_backend(&config).and_then(|conn| {
            let interner = PropertyInterner::load(&conn)?;
            Ok((conn, interner))
        });
        let (conn, interner) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                discard_quietly(&config.destination);
                return Err(err);
            }
        };

        info!(
            destination = %config.destination.display(),
            staging = ?config.staging,
            "build database session initialized"
        );

        Ok(Self {
            config,
            conn,
            state: IngestState::Idle,
            interner,
            session: BuildSession::new(),
            tracker: None,
            stats: IngestStats::default(),
            sequence: 0,
            started,
        })
    }

    #[must_use]
    pub const fn state(&self) -> IngestState {
        self.state
    }

    #[must_use]
    pub const fn stats(&self) -> &IngestStats {
        &self.stats
    }

    #[must_use]
    pub const fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// The session's build, once started.
    #[must_use]
    pub const fn build(&self) -> Option<BuildId> {
        self.session.build()
    }

    /// The project tracker of the started build.
    #[must_use]
    pub const fn tracker(&self) -> Option<&ProjectTracker> {
        self.tracker.as_ref()
    }

    /// Read access to the working database.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Apply one event and commit its effects.
    ///
    /// # Errors
    ///
    /// Returns the error that aborted the event. The session is then
    /// [`IngestState::Faulted`] and every later call fails with
    /// [`IngestError::SessionAborted`].
    pub fn handle(&mut self, event: &BuildEvent) -> Result<()> {
        self.sequence += 1;
        let kind = event.kind();

        let result = match self.state {
            IngestState::Faulted => return Err(IngestError::SessionAborted),
            IngestState::Closed => Err(IngestError::SessionClosed { kind }),
            IngestState::Idle | IngestState::BuildActive => {
                debug!(sequence = self.sequence, kind = %kind, "applying event");
                self.apply(event)
            }
        };

        match result {
            Ok(()) => {
                self.stats.events += 1;
                Ok(())
            }
            Err(err) => {
                let code = err.code();
                error!(
                    sequence = self.sequence,
                    kind = %kind,
                    code = %code,
                    summary = code.message(),
                    hint = err.hint().unwrap_or_default(),
                    error = %err,
                    "event aborted the ingestion session"
                );
                self.state = IngestState::Faulted;
                Err(err)
            }
        }
    }

    /// Apply every event in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`Ingestor::handle`].
    pub fn replay<I>(&mut self, events: I) -> Result<IngestStats>
    where
        I: IntoIterator,
        I::Item: Borrow<BuildEvent>,
    {
        for event in events {
            self.handle(event.borrow())?;
        }
        Ok(self.stats.clone())
    }

    fn apply(&mut self, event: &BuildEvent) -> Result<()> {
        let Self {
            conn,
            state,
            interner,
            session,
            tracker,
            stats,
            ..
        } = self;

        if let BuildEvent::Unsupported(data) = event {
            warn!(kind = %data.kind, len = ?data.len, "unsupported payload; skipping");
            stats.skipped += 1;
            return Ok(());
        }

        let tx = conn.transaction()?;
        match event {
            BuildEvent::BuildStarted(data) => {
                let build = session.start_build(&tx, interner, data.timestamp, &data.environment)?;
                *tracker = Some(ProjectTracker::new(build));
                *state = IngestState::BuildActive;
                stats.builds += 1;
            }
            BuildEvent::BuildFinished(data) => {
                session.finish_build(&tx, data.timestamp, data.succeeded)?;
                *state = IngestState::Closed;
            }
            BuildEvent::ProjectStarted(data) => {
                let tracker = active_tracker(tracker.as_mut(), EventKind::ProjectStarted)?;
                tracker.get_or_create(&tx, data.context_id)?;
                if tracker.hydrate(&tx, interner, data.context_id, &ProjectDetails::from(data))? {
                    stats.projects_started += 1;
                } else {
                    debug!(context_id = %data.context_id, "duplicate project start ignored");
                }
                if let Some(parent) = data.parent() {
                    tracker.set_parent(&tx, data.context_id, parent)?;
                }
                stats.placeholders = tracker.placeholder_count();
            }
            BuildEvent::ProjectFinished(data) => {
                let tracker = active_tracker(tracker.as_mut(), EventKind::ProjectFinished)?;
                tracker.finish(&tx, data.context_id, data.timestamp)?;
                stats.projects_finished += 1;
            }
            BuildEvent::Unsupported(_) => {}
        }
        tx.commit()?;
        Ok(())
    }

    /// Finalize the artifact and close the session.
    ///
    /// In memory staging the whole database is backed up to the destination
    /// in one step; in direct mode the destination gets a consistency pass
    /// and a WAL checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::SessionAborted`] if an event faulted the
    /// session; the destination is then removed rather than left partially
    /// written. Returns [`IngestError::Destination`] if the artifact cannot
    /// be written.
    pub fn shutdown(self) -> Result<ShutdownReport> {
        match self.state {
            IngestState::Faulted => {
                let destination = self.config.destination;
                drop(self.conn);
                discard_quietly(&destination);
                warn!(
                    destination = %destination.display(),
                    "aborted session; build database discarded"
                );
                return Err(IngestError::SessionAborted);
            }
            IngestState::Idle => warn!("shutting down a session that never started a build"),
            IngestState::BuildActive => warn!("shutting down before the build finished"),
            IngestState::Closed => {}
        }

        let destination = self.config.destination.clone();
        let destination_error = |source| IngestError::Destination {
            path: destination.clone(),
            source,
        };

        let counts = query::table_counts(&self.conn)?;
        let save_started = Instant::now();
        match self.config.staging {
            StagingMode::Memory => {
                db::backup_to(&self.conn, &destination).map_err(destination_error)?;
            }
            StagingMode::Direct => {
                db::finalize_direct(&self.conn).map_err(destination_error)?;
            }
        }
        let save_elapsed = save_started.elapsed();
        drop(self.conn);
        let elapsed = self.started.elapsed();

        info!(
            destination = %destination.display(),
            events = self.stats.events,
            builds = counts.builds,
            projects = counts.projects,
            properties = counts.properties,
            skipped = self.stats.skipped,
            save_ms = save_elapsed.as_millis(),
            elapsed_ms = elapsed.as_millis(),
            "build database saved"
        );

        Ok(ShutdownReport {
            destination,
            staging: self.config.staging,
            elapsed,
            save_elapsed,
            stats: self.stats,
            counts,
        })
    }
}

fn open_backend(config: &IngestConfig) -> Result<Connection> {
    match config.staging {
        StagingMode::Memory => Ok(db::open_staging()?),
        StagingMode::Direct => db::open_direct(&config.destination, config.busy_timeout())
            .map_err(|source| IngestError::Destination {
                path: config.destination.clone(),
                source,
            }),
    }
}

/// Remove a destination that will never hold a complete build.
fn discard_quietly(destination: &Path) {
    if let Err(err) = db::discard_destination(destination) {
        warn!(
            destination = %destination.display(),
            error = %format!("{err:#}"),
            "failed to remove incomplete build database"
        );
    }
}

fn active_tracker(tracker: Option<&mut ProjectTracker>, kind: EventKind) -> Result<&mut ProjectTracker> {
    tracker.ok_or_else(|| IngestError::InvalidState(format!("{kind} before the build started")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
