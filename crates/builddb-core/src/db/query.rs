//! Typed read helpers over the build database.
//!
//! These back the end-of-session report and let callers inspect what a
//! session wrote. They are lookups by id, not a reporting layer.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::model::{BuildId, ContextId, ProjectId, PropertyId};

/// A row from `Builds`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRow {
    pub id: BuildId,
    pub start_time_us: i64,
    pub end_time_us: Option<i64>,
    pub succeeded: bool,
}

/// A row from `Projects`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRow {
    pub id: ProjectId,
    pub build_id: BuildId,
    pub context_id: ContextId,
    pub parent_id: Option<ProjectId>,
    pub start_time_us: Option<i64>,
    pub end_time_us: Option<i64>,
    pub targets: Option<String>,
    pub tools_version: Option<String>,
    pub project_file: Option<String>,
}

/// An interned property resolved through its definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRow {
    pub id: PropertyId,
    pub name: String,
    pub value: String,
    pub is_metadata: bool,
}

/// A property associated with a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPropertyRow {
    pub property: PropertyRow,
    pub global: bool,
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub builds: u64,
    pub projects: u64,
    pub property_definitions: u64,
    pub properties: u64,
    pub build_properties: u64,
    pub project_properties: u64,
}

const PROJECT_COLUMNS: &str = "Id, BuildId, ProjectContextId, ParentId, StartTime, EndTime, \
                               Targets, ToolsVersion, ProjectFile";

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<ProjectRow> {
    Ok(ProjectRow {
        id: ProjectId::from_raw(row.get(0)?),
        build_id: BuildId::from_raw(row.get(1)?),
        context_id: ContextId(row.get(2)?),
        parent_id: row.get::<_, Option<i64>>(3)?.map(ProjectId::from_raw),
        start_time_us: row.get(4)?,
        end_time_us: row.get(5)?,
        targets: row.get(6)?,
        tools_version: row.get(7)?,
        project_file: row.get(8)?,
    })
}

fn property_from_row(row: &Row<'_>) -> rusqlite::Result<PropertyRow> {
    Ok(PropertyRow {
        id: PropertyId::from_raw(row.get(0)?),
        name: row.get(1)?,
        value: row.get(2)?,
        is_metadata: row.get(3)?,
    })
}

/// Fetch a build by id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_build(conn: &Connection, id: BuildId) -> Result<Option<BuildRow>> {
    conn.query_row(
        "SELECT Id, StartTime, EndTime, Succeeded FROM Builds WHERE Id = ?1",
        params![id.get()],
        |row| {
            Ok(BuildRow {
                id: BuildId::from_raw(row.get(0)?),
                start_time_us: row.get(1)?,
                end_time_us: row.get(2)?,
                succeeded: row.get(3)?,
            })
        },
    )
    .optional()
    .with_context(|| format!("get build {id}"))
}

/// Fetch a project by its (build, context id) key.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_project(
    conn: &Connection,
    build: BuildId,
    context_id: ContextId,
) -> Result<Option<ProjectRow>> {
    let sql = format!(
        "SELECT {PROJECT_COLUMNS} FROM Projects WHERE BuildId = ?1 AND ProjectContextId = ?2"
    );
    conn.query_row(&sql, params![build.get(), context_id.0], project_from_row)
        .optional()
        .with_context(|| format!("get project {context_id} of build {build}"))
}

/// All projects of a build, in creation order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_projects(conn: &Connection, build: BuildId) -> Result<Vec<ProjectRow>> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM Projects WHERE BuildId = ?1 ORDER BY Id");
    let mut stmt = conn.prepare(&sql).context("prepare list projects")?;
    let rows = stmt
        .query_map(params![build.get()], project_from_row)
        .context("list projects")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("read project rows")
}

/// Environment properties recorded for a build, ordered by name.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn build_environment(conn: &Connection, build: BuildId) -> Result<Vec<PropertyRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT p.Id, d.Name, p.Value, d.IsMetadata
             FROM BuildProperties bp
             JOIN Properties p ON p.Id = bp.PropertyId
             JOIN PropertyDefinitions d ON d.Id = p.DefinitionId
             WHERE bp.BuildId = ?1
             ORDER BY d.Name, p.Value",
        )
        .context("prepare build environment")?;
    let rows = stmt
        .query_map(params![build.get()], property_from_row)
        .context("query build environment")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("read build environment rows")
}

/// Properties associated with a project, global ones first, then by name.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn project_properties(conn: &Connection, project: ProjectId) -> Result<Vec<ProjectPropertyRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT p.Id, d.Name, p.Value, d.IsMetadata, pp.Global
             FROM ProjectProperties pp
             JOIN Properties p ON p.Id = pp.PropertyId
             JOIN PropertyDefinitions d ON d.Id = p.DefinitionId
             WHERE pp.ProjectId = ?1
             ORDER BY pp.Global DESC, d.Name, p.Value",
        )
        .context("prepare project properties")?;
    let rows = stmt
        .query_map(params![project.get()], |row| {
            Ok(ProjectPropertyRow {
                property: property_from_row(row)?,
                global: row.get(4)?,
            })
        })
        .context("query project properties")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("read project property rows")
}

/// Count rows in every artifact table.
///
/// # Errors
///
/// Returns an error if any count query fails.
pub fn table_counts(conn: &Connection) -> Result<TableCounts> {
    let count = |table: &str| -> Result<u64> {
        let n: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .with_context(|| format!("count rows in {table}"))?;
        Ok(u64::try_from(n).unwrap_or(0))
    };

    Ok(TableCounts {
        builds: count("Builds")?,
        projects: count("Projects")?,
        property_definitions: count("PropertyDefinitions")?,
        properties: count("Properties")?,
        build_properties: count("BuildProperties")?,
        project_properties: count("ProjectProperties")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations;

    fn test_db() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open in-memory db");
        migrations::migrate(&mut conn).expect("migrate");
        conn
    }

    #[test]
    fn empty_database_counts_zero() {
        let conn = test_db();
        assert_eq!(table_counts(&conn).expect("counts"), TableCounts::default());
        assert_eq!(get_build(&conn, BuildId::from_raw(1)).expect("query"), None);
    }

    #[test]
    fn project_lookup_is_scoped_to_build() {
        let conn = test_db();
        conn.execute_batch(
            "INSERT INTO Builds (Id, StartTime) VALUES (1, 10), (2, 20);
             INSERT INTO Projects (BuildId, ProjectContextId, Targets) VALUES (1, 5, 'Build');
             INSERT INTO Projects (BuildId, ProjectContextId, Targets) VALUES (2, 5, 'Clean');",
        )
        .expect("seed");

        let first = get_project(&conn, BuildId::from_raw(1), ContextId(5))
            .expect("query")
            .expect("project exists");
        let second = get_project(&conn, BuildId::from_raw(2), ContextId(5))
            .expect("query")
            .expect("project exists");
        assert_eq!(first.targets.as_deref(), Some("Build"));
        assert_eq!(second.targets.as_deref(), Some("Clean"));
        assert_ne!(first.id, second.id);

        assert_eq!(
            list_projects(&conn, BuildId::from_raw(1)).expect("list").len(),
            1
        );
    }
}
