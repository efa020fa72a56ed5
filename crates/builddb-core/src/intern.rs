//! Property interning.
//!
//! Every (name, value) pair seen in an environment snapshot or a project's
//! property bags is stored once: a `PropertyDefinitions` row per
//! (name, is-metadata) and a `Properties` row per (definition, value).
//! Association rows then refer to the property by id.
//!
//! Lookups go through in-memory indexes kept in step with the inserts, so
//! interning never scans the tables. [`PropertyInterner::load`] rebuilds the
//! indexes from an existing database.

use std::collections::HashMap;

use rusqlite::{Connection, params};

use crate::error::Result;
use crate::model::{DefinitionId, PropertyId};

/// Deduplicating writer for property definitions and values.
#[derive(Debug, Default)]
pub struct PropertyInterner {
    property_defs: HashMap<String, DefinitionId>,
    metadata_defs: HashMap<String, DefinitionId>,
    values: HashMap<DefinitionId, HashMap<String, PropertyId>>,
    property_count: usize,
}

impl PropertyInterner {
    /// An interner for an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the indexes from the rows already in `conn`.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the property tables fails.
    pub fn load(conn: &Connection) -> Result<Self> {
        let mut interner = Self::new();

        let mut defs = conn.prepare("SELECT Id, Name, IsMetadata FROM PropertyDefinitions")?;
        let rows = defs.query_map([], |row| {
            Ok((
                DefinitionId::from_raw(row.get(0)?),
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
            ))
        })?;
        for row in rows {
            let (id, name, is_metadata) = row?;
            interner.definitions_mut(is_metadata).insert(name, id);
        }

        let mut props = conn.prepare("SELECT Id, DefinitionId, Value FROM Properties")?;
        let rows = props.query_map([], |row| {
            Ok((
                PropertyId::from_raw(row.get(0)?),
                DefinitionId::from_raw(row.get(1)?),
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (id, definition, value) = row?;
            interner
                .values
                .entry(definition)
                .or_default()
                .insert(value, id);
            interner.property_count += 1;
        }

        tracing::debug!(
            definitions = interner.definition_count(),
            properties = interner.property_count,
            "loaded property intern index"
        );
        Ok(interner)
    }

    /// Return the id of the (name, value) property, inserting the definition
    /// and/or value rows if they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if an insert fails.
    pub fn intern(
        &mut self,
        conn: &Connection,
        name: &str,
        value: &str,
        is_metadata: bool,
    ) -> Result<PropertyId> {
        let definition = self.definition(conn, name, is_metadata)?;

        if let Some(id) = self.values.get(&definition).and_then(|v| v.get(value)) {
            return Ok(*id);
        }

        conn.prepare_cached("INSERT INTO Properties (DefinitionId, Value) VALUES (?1, ?2)")?
            .execute(params![definition.get(), value])?;
        let id = PropertyId::from_raw(conn.last_insert_rowid());
        self.values
            .entry(definition)
            .or_default()
            .insert(value.to_string(), id);
        self.property_count += 1;
        Ok(id)
    }

    /// Look up an interned property without inserting anything.
    #[must_use]
    pub fn lookup(&self, name: &str, value: &str, is_metadata: bool) -> Option<PropertyId> {
        let definition = self.definitions(is_metadata).get(name)?;
        self.values.get(definition)?.get(value).copied()
    }

    /// Number of distinct definitions interned so far.
    #[must_use]
    pub fn definition_count(&self) -> usize {
        self.property_defs.len() + self.metadata_defs.len()
    }

    /// Number of distinct (definition, value) properties interned so far.
    #[must_use]
    pub const fn property_count(&self) -> usize {
        self.property_count
    }

    fn definition(
        &mut self,
        conn: &Connection,
        name: &str,
        is_metadata: bool,
    ) -> Result<DefinitionId> {
        if let Some(id) = self.definitions(is_metadata).get(name) {
            return Ok(*id);
        }

        conn.prepare_cached("INSERT INTO PropertyDefinitions (Name, IsMetadata) VALUES (?1, ?2)")?
            .execute(params![name, is_metadata])?;
        let id = DefinitionId::from_raw(conn.last_insert_rowid());
        self.definitions_mut(is_metadata)
            .insert(name.to_string(), id);
        Ok(id)
    }

    const fn definitions(&self, is_metadata: bool) -> &HashMap<String, DefinitionId> {
        if is_metadata {
            &self.metadata_defs
        } else {
            &self.property_defs
        }
    }

    const fn definitions_mut(&mut self, is_metadata: bool) -> &mut HashMap<String, DefinitionId> {
        if is_metadata {
            &mut self.metadata_defs
        } else {
            &mut self.property_defs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{migrations, query};

    fn test_db() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open in-memory db");
        conn.pragma_update(None, "foreign_keys", "ON")
            .expect("foreign keys");
        migrations::migrate(&mut conn).expect("migrate");
        conn
    }

    #[test]
    fn interning_twice_returns_same_id_without_new_rows() {
        let conn = test_db();
        let mut interner = PropertyInterner::new();

        let first = interner
            .intern(&conn, "Configuration", "Debug", false)
            .expect("intern");
        let second = interner
            .intern(&conn, "Configuration", "Debug", false)
            .expect("intern again");
        assert_eq!(first, second);

        let counts = query::table_counts(&conn).expect("counts");
        assert_eq!(counts.property_definitions, 1);
        assert_eq!(counts.properties, 1);
    }

    #[test]
    fn values_share_one_definition() {
        let conn = test_db();
        let mut interner = PropertyInterner::new();

        let debug = interner
            .intern(&conn, "Configuration", "Debug", false)
            .expect("intern debug");
        let release = interner
            .intern(&conn, "Configuration", "Release", false)
            .expect("intern release");
        assert_ne!(debug, release);

        let counts = query::table_counts(&conn).expect("counts");
        assert_eq!(counts.property_definitions, 1);
        assert_eq!(counts.properties, 2);
        assert_eq!(interner.definition_count(), 1);
        assert_eq!(interner.property_count(), 2);
    }

    #[test]
    fn metadata_flag_separates_definitions() {
        let conn = test_db();
        let mut interner = PropertyInterner::new();

        let property = interner
            .intern(&conn, "Identity", "a.cs", false)
            .expect("intern property");
        let metadata = interner
            .intern(&conn, "Identity", "a.cs", true)
            .expect("intern metadata");
        assert_ne!(property, metadata);

        assert_eq!(interner.lookup("Identity", "a.cs", true), Some(metadata));
        assert_eq!(interner.lookup("Identity", "a.cs", false), Some(property));
        assert_eq!(interner.lookup("Identity", "b.cs", false), None);
        assert_eq!(query::table_counts(&conn).expect("counts").property_definitions, 2);
    }

    #[test]
    fn empty_value_is_a_distinct_property() {
        let conn = test_db();
        let mut interner = PropertyInterner::new();

        let empty = interner.intern(&conn, "OutDir", "", false).expect("intern");
        let set = interner
            .intern(&conn, "OutDir", "bin/", false)
            .expect("intern");
        assert_ne!(empty, set);
        assert_eq!(
            interner.intern(&conn, "OutDir", "", false).expect("intern"),
            empty
        );
    }

    #[test]
    fn load_rebuilds_index_from_existing_rows() {
        let conn = test_db();
        let mut interner = PropertyInterner::new();
        let os = interner.intern(&conn, "OS", "linux", false).expect("intern");
        interner
            .intern(&conn, "Culture", "en-US", true)
            .expect("intern");

        let mut reloaded = PropertyInterner::load(&conn).expect("load");
        assert_eq!(reloaded.definition_count(), 2);
        assert_eq!(reloaded.property_count(), 2);
        assert_eq!(
            reloaded.intern(&conn, "OS", "linux", false).expect("intern"),
            os
        );
        assert_eq!(query::table_counts(&conn).expect("counts").properties, 2);
    }
}
