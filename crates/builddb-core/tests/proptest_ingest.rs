use builddb_core::db::{migrations, query};
use builddb_core::intern::PropertyInterner;
use builddb_core::model::{BuildId, ContextId};
use builddb_core::tracker::ProjectTracker;
use proptest::prelude::*;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};

fn test_db() -> Connection {
    let mut conn = Connection::open_in_memory().expect("open in-memory db");
    conn.pragma_update(None, "foreign_keys", "ON")
        .expect("foreign keys");
    migrations::migrate(&mut conn).expect("migrate");
    conn.execute("INSERT INTO Builds (Id, StartTime) VALUES (1, 0)", [])
        .expect("seed build");
    conn
}

fn arb_property() -> impl Strategy<Value = (String, String, bool)> {
    (
        prop::sample::select(vec!["Configuration", "Platform", "OutDir", "OS"]),
        "[a-z]{0,3}",
        any::<bool>(),
    )
        .prop_map(|(name, value, is_metadata)| (name.to_string(), value, is_metadata))
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(256))]

    #[test]
    fn interning_is_idempotent(props in prop::collection::vec(arb_property(), 0..64)) {
        let conn = test_db();
        let mut interner = PropertyInterner::new();
        let mut seen = HashMap::new();

        for (name, value, is_metadata) in &props {
            let id = interner.intern(&conn, name, value, *is_metadata).expect("intern");
            let first = *seen.entry((name.clone(), value.clone(), *is_metadata)).or_insert(id);
            prop_assert_eq!(first, id);
        }

        let definitions: HashSet<_> = props.iter().map(|(n, _, m)| (n.clone(), *m)).collect();
        let counts = query::table_counts(&conn).expect("counts");
        prop_assert_eq!(counts.properties, u64::try_from(seen.len()).expect("count"));
        prop_assert_eq!(counts.property_definitions, u64::try_from(definitions.len()).expect("count"));
    }

    #[test]
    fn project_identity_is_stable(contexts in prop::collection::vec(1..20i32, 1..64)) {
        let conn = test_db();
        let mut tracker = ProjectTracker::new(BuildId::from_raw(1));
        let mut ids = HashMap::new();

        for ctx in contexts {
            let id = tracker.get_or_create(&conn, ContextId(ctx)).expect("get or create");
            let first = *ids.entry(ctx).or_insert(id);
            prop_assert_eq!(first, id);
        }

        prop_assert_eq!(tracker.len(), ids.len());
        let rows = query::list_projects(&conn, BuildId::from_raw(1)).expect("list");
        prop_assert_eq!(rows.len(), ids.len());
    }

    #[test]
    fn parent_links_never_form_cycles(links in prop::collection::vec((1..8i32, 1..8i32), 0..32)) {
        let conn = test_db();
        let mut tracker = ProjectTracker::new(BuildId::from_raw(1));

        for (child, parent) in links {
            // Rejected links leave the hierarchy unchanged.
            let _ = tracker.set_parent(&conn, ContextId(child), ContextId(parent));
        }

        for ctx in 1..8 {
            let mut current = tracker.get(ContextId(ctx)).and_then(|p| p.parent);
            let mut steps = 0;
            while let Some(parent) = current {
                prop_assert_ne!(parent, ContextId(ctx));
                steps += 1;
                prop_assert!(steps <= tracker.len());
                current = tracker.get(parent).and_then(|p| p.parent);
            }
        }
    }
}
