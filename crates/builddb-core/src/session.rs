//! The single build of an ingestion session.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::error::{IngestError, Result};
use crate::event::PropertyMap;
use crate::intern::PropertyInterner;
use crate::model::{BuildId, to_micros};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    NotStarted,
    Active(BuildId),
    Finished(BuildId),
}

/// Owns the build row and its environment snapshot.
#[derive(Debug)]
pub struct BuildSession {
    lifecycle: Lifecycle,
}

impl Default for BuildSession {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildSession {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lifecycle: Lifecycle::NotStarted,
        }
    }

    /// The build id while the build is active.
    #[must_use]
    pub const fn active(&self) -> Option<BuildId> {
        match self.lifecycle {
            Lifecycle::Active(id) => Some(id),
            _ => None,
        }
    }

    /// The build id once a build has been started, finished or not.
    #[must_use]
    pub const fn build(&self) -> Option<BuildId> {
        match self.lifecycle {
            Lifecycle::Active(id) | Lifecycle::Finished(id) => Some(id),
            Lifecycle::NotStarted => None,
        }
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Finished(_))
    }

    /// Insert the build row and one environment association per entry.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidState`] if this session already started
    /// a build, or a storage error if a write fails.
    pub fn start_build(
        &mut self,
        conn: &Connection,
        interner: &mut PropertyInterner,
        start_time: DateTime<Utc>,
        environment: &PropertyMap,
    ) -> Result<BuildId> {
        if let Some(existing) = self.build() {
            return Err(IngestError::InvalidState(format!(
                "build already started (build {existing}); one build per session"
            )));
        }

        conn.execute(
            "INSERT INTO Builds (StartTime, Succeeded) VALUES (?1, 0)",
            params![to_micros(start_time)],
        )?;
        let id = BuildId::from_raw(conn.last_insert_rowid());

        for (name, value) in environment {
            let property = interner.intern(conn, name, value, false)?;
            conn.prepare_cached(
                "INSERT OR IGNORE INTO BuildProperties (BuildId, PropertyId) VALUES (?1, ?2)",
            )?
            .execute(params![id.get(), property.get()])?;
        }

        self.lifecycle = Lifecycle::Active(id);
        tracing::debug!(build = %id, environment = environment.len(), "build started");
        Ok(id)
    }

    /// Record the end time and outcome of the active build.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidState`] if no build is active, or a
    /// storage error if the update fails.
    pub fn finish_build(
        &mut self,
        conn: &Connection,
        end_time: DateTime<Utc>,
        succeeded: bool,
    ) -> Result<BuildId> {
        let id = match self.lifecycle {
            Lifecycle::Active(id) => id,
            Lifecycle::NotStarted => {
                return Err(IngestError::InvalidState(
                    "build finished before it was started".into(),
                ));
            }
            Lifecycle::Finished(id) => {
                return Err(IngestError::InvalidState(format!(
                    "build {id} already finished"
                )));
            }
        };

        conn.execute(
            "UPDATE Builds SET EndTime = ?1, Succeeded = ?2 WHERE Id = ?3",
            params![to_micros(end_time), succeeded, id.get()],
        )?;

        self.lifecycle = Lifecycle::Finished(id);
        tracing::debug!(build = %id, succeeded, "build finished");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{migrations, query};
    use chrono::TimeZone;

    fn test_db() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open in-memory db");
        conn.pragma_update(None, "foreign_keys", "ON")
            .expect("foreign keys");
        migrations::migrate(&mut conn).expect("migrate");
        conn
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_555_290_000 + secs, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn start_build_records_environment() {
        let conn = test_db();
        let mut interner = PropertyInterner::new();
        let mut session = BuildSession::new();
        let env = PropertyMap::from([
            ("OS".to_string(), "linux".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ]);

        let id = session
            .start_build(&conn, &mut interner, ts(0), &env)
            .expect("start");
        assert_eq!(session.active(), Some(id));

        let build = query::get_build(&conn, id).expect("query").expect("build");
        assert_eq!(build.start_time_us, to_micros(ts(0)));
        assert_eq!(build.end_time_us, None);
        assert!(!build.succeeded);

        let recorded = query::build_environment(&conn, id).expect("env");
        let pairs: Vec<(&str, &str)> = recorded
            .iter()
            .map(|p| (p.name.as_str(), p.value.as_str()))
            .collect();
        assert_eq!(pairs, vec![("OS", "linux"), ("PATH", "/usr/bin")]);
    }

    #[test]
    fn second_start_is_rejected() {
        let conn = test_db();
        let mut interner = PropertyInterner::new();
        let mut session = BuildSession::new();
        session
            .start_build(&conn, &mut interner, ts(0), &PropertyMap::new())
            .expect("start");

        let err = session
            .start_build(&conn, &mut interner, ts(1), &PropertyMap::new())
            .expect_err("second start");
        assert!(matches!(err, IngestError::InvalidState(_)));
        assert_eq!(query::table_counts(&conn).expect("counts").builds, 1);
    }

    #[test]
    fn finish_before_start_is_rejected() {
        let conn = test_db();
        let mut session = BuildSession::new();
        let err = session
            .finish_build(&conn, ts(1), true)
            .expect_err("not started");
        assert!(matches!(err, IngestError::InvalidState(_)));
    }

    #[test]
    fn finish_records_outcome_once() {
        let conn = test_db();
        let mut interner = PropertyInterner::new();
        let mut session = BuildSession::new();
        let id = session
            .start_build(&conn, &mut interner, ts(0), &PropertyMap::new())
            .expect("start");

        session.finish_build(&conn, ts(5), true).expect("finish");
        assert!(session.is_finished());
        assert_eq!(session.active(), None);
        assert_eq!(session.build(), Some(id));

        let build = query::get_build(&conn, id).expect("query").expect("build");
        assert_eq!(build.end_time_us, Some(to_micros(ts(5))));
        assert!(build.succeeded);

        let err = session
            .finish_build(&conn, ts(6), false)
            .expect_err("finished twice");
        assert!(matches!(err, IngestError::InvalidState(_)));
    }
}
