//! Realtime backend against the in-memory engine.

use std::sync::Arc;

use sorcery_backends::realtime::KEY_FIELD;
use sorcery_backends::{InMemoryEngine, RealtimeEngine};
use sorcery_core::{ObjectSet, SorceryError};

use super::helpers::{as_zombie, ids, zombie, zombie_sorcery};

fn engine_with_table(table: &str) -> Arc<InMemoryEngine> {
    let engine = Arc::new(InMemoryEngine::new());
    engine.create_table(table);
    engine
}

#[test]
fn test_rows_follow_objects() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (sorcery, backends) = zombie_sorcery("realtime_rows", dir.path());
    let engine = engine_with_table("zombies");
    backends.realtime.declare("zombies", engine.clone());
    sorcery.apply_mapping("zombie", "realtime", "zombies", false)?;

    let bob = zombie(&sorcery, "bob", |z| {
        z.name = "Bob".to_string();
        z.brains = 3;
    });
    sorcery.create(&bob)?;
    assert!(sorcery.create(&bob).unwrap_err().is_exists());
    assert_eq!(engine.row_count("zombies"), 1);

    let row = engine
        .load("zombies", &ObjectSet::new().with(KEY_FIELD, "bob"))?
        .unwrap();
    assert_eq!(row.iter().next(), Some((KEY_FIELD, "bob")));
    assert_eq!(row.get("brains"), Some("3"));
    assert_eq!(row.get("hungry"), Some("yes"));

    let fed = zombie(&sorcery, "bob", |z| {
        z.name = "Bob".to_string();
        z.brains = 4;
        z.hungry = false;
    });
    sorcery.update(&fed)?;
    let found = sorcery.retrieve_by_id("zombie", "bob")?.unwrap();
    assert_eq!(as_zombie(&found).brains, 4);
    assert!(!as_zombie(&found).hungry);

    sorcery.delete(&found)?;
    assert_eq!(engine.row_count("zombies"), 0);
    assert!(sorcery.update(&fed).unwrap_err().is_not_found());
    assert!(sorcery.delete(&fed).unwrap_err().is_not_found());
    Ok(())
}

#[test]
fn test_lookups_translate_to_like_queries() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (sorcery, backends) = zombie_sorcery("realtime_lookups", dir.path());
    backends.realtime.declare("zombies", engine_with_table("zombies"));
    sorcery.apply_mapping("zombie", "realtime", "zombies", false)?;

    for (id, brains) in [("alice", 7), ("albert", 2), ("bob", 7), ("malice", 1)] {
        sorcery.create(&zombie(&sorcery, id, |z| z.brains = brains))?;
    }

    assert_eq!(ids(&sorcery.retrieve_multiple("zombie", None)?).len(), 4);
    let sevens = sorcery.retrieve_multiple("zombie", Some(&ObjectSet::new().with("brains", "7")))?;
    assert_eq!(ids(&sevens), vec!["alice", "bob"]);

    assert_eq!(
        ids(&sorcery.retrieve_by_prefix("zombie", "al")?),
        vec!["albert", "alice"]
    );
    assert_eq!(ids(&sorcery.retrieve_by_regex("zombie", "^al")?), vec!["albert", "alice"]);
    assert_eq!(ids(&sorcery.retrieve_by_regex("zombie", "lice$")?), vec!["alice", "malice"]);
    assert_eq!(ids(&sorcery.retrieve_by_regex("zombie", "^a.*e$")?), vec!["alice"]);
    Ok(())
}

#[test]
fn test_regex_with_optional_characters_finds_every_match() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (sorcery, backends) = zombie_sorcery("realtime_optional", dir.path());
    backends.realtime.declare("zombies", engine_with_table("zombies"));
    sorcery.apply_mapping("zombie", "realtime", "zombies", false)?;

    for id in ["abc", "ac", "b", "bob"] {
        sorcery.create(&zombie(&sorcery, id, |_| {}))?;
    }

    assert_eq!(ids(&sorcery.retrieve_by_regex("zombie", "^ab?c")?), vec!["abc", "ac"]);
    assert_eq!(ids(&sorcery.retrieve_by_regex("zombie", "^a|b")?), vec!["abc", "ac", "b", "bob"]);
    assert_eq!(ids(&sorcery.retrieve_by_regex("zombie", "o?b$")?), vec!["b", "bob"]);
    Ok(())
}

#[test]
fn test_unknown_columns_are_ignored() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (sorcery, backends) = zombie_sorcery("realtime_columns", dir.path());
    let engine = engine_with_table("zombies");
    backends.realtime.declare("zombies", engine.clone());
    sorcery.apply_mapping("zombie", "realtime", "zombies", false)?;

    engine.store(
        "zombies",
        &ObjectSet::new()
            .with(KEY_FIELD, "eve")
            .with("brains", "5")
            .with("shoe_size", "44"),
    )?;
    let eve = sorcery.retrieve_by_id("zombie", "eve")?.unwrap();
    assert_eq!(as_zombie(&eve).brains, 5);
    Ok(())
}

#[test]
fn test_open_requires_declared_table() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (sorcery, backends) = zombie_sorcery("realtime_undeclared", dir.path());
    for args in ["", "zombies"] {
        assert!(matches!(
            sorcery.apply_mapping("zombie", "realtime", args, false),
            Err(SorceryError::BackendOpen { .. })
        ));
    }

    backends.realtime.declare("zombies", engine_with_table("zombies"));
    sorcery.apply_mapping("zombie", "realtime", "zombies", false)?;
    assert_eq!(sorcery.mapping_count("zombie")?, 1);
    Ok(())
}
