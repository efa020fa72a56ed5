//! SQLite persistence backend for the build database.
//!
//! Two ways to reach the destination artifact:
//! - staged: an in-memory database copied out with the online backup API
//!   once ingestion is complete ([`open_staging`] + [`backup_to`])
//! - direct: the destination file itself, WAL journaled, finished with a
//!   consistency pass ([`open_direct`] + [`finalize_direct`])
//!
//! Every connection runs with `foreign_keys = ON`.

pub mod migrations;
pub mod query;
pub mod schema;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, DatabaseName};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Open an in-memory staging database with the latest schema.
///
/// # Errors
///
/// Returns an error if configuring or migrating the database fails.
pub fn open_staging() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("open in-memory staging database")?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("enable foreign keys")?;
    migrations::migrate(&mut conn).context("apply build database migrations")?;
    Ok(conn)
}

/// Open (or create) the destination file for direct writes, apply runtime
/// pragmas, and migrate the schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening/configuring/migrating the database fails.
pub fn open_direct(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    ensure_parent_dir(path)?;

    let mut conn = Connection::open(path)
        .with_context(|| format!("open build database {}", path.display()))?;

    configure_file_connection(&conn, busy_timeout).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply build database migrations")?;

    Ok(conn)
}

fn configure_file_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

/// Make sure `path` can become the artifact.
///
/// An existing file is removed (together with its `-wal`/`-shm` siblings)
/// when `overwrite` is set and rejected otherwise. The file is then created
/// with a throwaway write so an unwritable destination fails here rather than
/// after the whole trace has been ingested.
///
/// # Errors
///
/// Returns an error if the destination exists without `overwrite`, or cannot
/// be removed, created or written.
pub fn prepare_destination(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() {
        if !overwrite {
            bail!("{} already exists and overwrite is disabled", path.display());
        }
        remove_database_files(path)?;
    }

    ensure_parent_dir(path)?;
    let probe = Connection::open(path)
        .with_context(|| format!("create build database {}", path.display()))?;
    probe
        .execute_batch("CREATE TABLE builddb_probe (x); DROP TABLE builddb_probe;")
        .with_context(|| format!("write to build database {}", path.display()))?;
    Ok(())
}

/// Delete whatever a session left at `path`, including `-wal`/`-shm`
/// siblings. Missing files are not an error.
///
/// Connections to the database must be closed first.
///
/// # Errors
///
/// Returns an error if an existing file cannot be removed.
pub fn discard_destination(path: &Path) -> Result<()> {
    for file in [path.to_path_buf(), sibling(path, "-wal"), sibling(path, "-shm")] {
        remove_if_exists(&file)?;
    }
    Ok(())
}

/// Copy the whole staging database to `path` in one backup step.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created or the backup
/// fails.
pub fn backup_to(conn: &Connection, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    conn.backup(DatabaseName::Main, path, None)
        .with_context(|| format!("back up build database to {}", path.display()))
}

/// Consistency pass for a directly written database: integrity and
/// foreign-key checks, then a WAL checkpoint so the main file is complete on
/// its own.
///
/// # Errors
///
/// Returns an error if either check reports a problem or the checkpoint
/// fails.
pub fn finalize_direct(conn: &Connection) -> Result<()> {
    let quick_check: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .context("run PRAGMA quick_check")?;
    if quick_check != "ok" {
        bail!("integrity check failed: {quick_check}");
    }

    let violations: i64 = conn
        .query_row("SELECT COUNT(*) FROM pragma_foreign_key_check", [], |row| {
            row.get(0)
        })
        .context("run foreign key check")?;
    if violations > 0 {
        bail!("{violations} foreign key violations in build database");
    }

    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
        .context("checkpoint write-ahead log")?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create build database directory {}", parent.display()))?;
    }
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn remove_database_files(path: &Path) -> Result<()> {
    std::fs::remove_file(path)
        .with_context(|| format!("remove existing build database {}", path.display()))?;
    for suffix in ["-wal", "-shm"] {
        remove_if_exists(&sibling(path, suffix))?;
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => {
            Err(e).with_context(|| format!("remove {}", path.display()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_db_path() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("nested/build.builddb");
        (dir, path)
    }

    #[test]
    fn open_direct_sets_wal_busy_timeout_and_fk() {
        let (_dir, path) = temp_db_path();
        let conn = open_direct(&path, Duration::from_millis(1_500)).expect("open db");

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("query journal_mode");
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: u64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("query busy_timeout");
        assert_eq!(busy_timeout_ms, 1_500);

        let foreign_keys: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("query foreign_keys");
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn open_staging_runs_migrations() {
        let conn = open_staging().expect("open staging");
        let version = migrations::current_schema_version(&conn).expect("schema version");
        assert_eq!(version, migrations::LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn prepare_destination_respects_overwrite() {
        let (_dir, path) = temp_db_path();
        prepare_destination(&path, false).expect("fresh destination");
        assert!(path.exists());

        let err = prepare_destination(&path, false).expect_err("exists without overwrite");
        assert!(err.to_string().contains("already exists"));

        prepare_destination(&path, true).expect("overwrite existing");
    }

    #[test]
    fn overwrite_removes_stale_wal_siblings() {
        let (_dir, path) = temp_db_path();
        prepare_destination(&path, false).expect("fresh destination");
        let wal = sibling(&path, "-wal");
        std::fs::write(&wal, b"stale").expect("seed wal");

        prepare_destination(&path, true).expect("overwrite existing");
        assert!(!wal.exists());
        assert!(path.exists());
    }

    #[test]
    fn discard_destination_removes_direct_database() {
        let (_dir, path) = temp_db_path();
        let conn = open_direct(&path, Duration::from_secs(1)).expect("open db");
        conn.execute("INSERT INTO Builds (StartTime) VALUES (1)", [])
            .expect("insert build");
        drop(conn);

        discard_destination(&path).expect("discard");
        assert!(!path.exists());
        assert!(!sibling(&path, "-wal").exists());
        assert!(!sibling(&path, "-shm").exists());

        discard_destination(&path).expect("discard is idempotent");
    }

    #[test]
    fn backup_copies_staged_rows() {
        let (_dir, path) = temp_db_path();
        let staging = open_staging().expect("open staging");
        staging
            .execute("INSERT INTO Builds (StartTime) VALUES (42)", [])
            .expect("insert build");

        backup_to(&staging, &path).expect("backup");

        let copy = Connection::open(&path).expect("open copy");
        let start: i64 = copy
            .query_row("SELECT StartTime FROM Builds", [], |row| row.get(0))
            .expect("read build");
        assert_eq!(start, 42);
        assert_eq!(
            migrations::current_schema_version(&copy).expect("version"),
            migrations::LATEST_SCHEMA_VERSION
        );
    }

    #[test]
    fn finalize_direct_passes_on_consistent_db() {
        let (_dir, path) = temp_db_path();
        let conn = open_direct(&path, Duration::from_secs(1)).expect("open db");
        finalize_direct(&conn).expect("finalize");
    }
}
