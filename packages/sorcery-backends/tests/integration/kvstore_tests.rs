//! Key-value backend: CRUD through the chain, namespacing, lookups and file
//! persistence.

use std::sync::Arc;

use ntest::timeout;
use sorcery_backends::{FileKvStore, KvStore, MemoryKvStore};
use sorcery_core::{ObjectSet, SorceryError};

use super::helpers::{as_zombie, ids, zombie, zombie_sorcery};

#[test]
fn test_create_retrieve_update_delete() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (sorcery, _) = zombie_sorcery("kv_crud", dir.path());
    sorcery.apply_mapping("zombie", "kvstore", "undead", false)?;

    let bob = zombie(&sorcery, "bob", |z| {
        z.name = "Bob".to_string();
        z.brains = 3;
    });
    sorcery.create(&bob)?;

    let found = sorcery.retrieve_by_id("zombie", "bob")?.unwrap();
    assert_eq!(as_zombie(&found).name, "Bob");
    assert_eq!(as_zombie(&found).brains, 3);

    let fed = zombie(&sorcery, "bob", |z| {
        z.name = "Bob".to_string();
        z.hungry = false;
    });
    sorcery.update(&fed)?;
    let found = sorcery.retrieve_by_id("zombie", "bob")?.unwrap();
    assert!(!as_zombie(&found).hungry);

    sorcery.delete(&found)?;
    assert!(sorcery.retrieve_by_id("zombie", "bob")?.is_none());
    assert!(sorcery.update(&fed).unwrap_err().is_not_found());
    assert!(sorcery.delete(&fed).unwrap_err().is_not_found());
    Ok(())
}

#[test]
fn test_create_overwrites_existing_row() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (sorcery, _) = zombie_sorcery("kv_overwrite", dir.path());
    sorcery.apply_mapping("zombie", "kvstore", "undead", false)?;

    sorcery.create(&zombie(&sorcery, "bob", |z| z.brains = 3))?;
    sorcery.create(&zombie(&sorcery, "bob", |z| z.brains = 9))?;

    let found = sorcery.retrieve_by_id("zombie", "bob")?.unwrap();
    assert_eq!(as_zombie(&found).brains, 9);
    assert_eq!(ids(&sorcery.retrieve_multiple("zombie", None)?), vec!["bob"]);
    Ok(())
}

#[test]
fn test_namespaces_are_separate_families() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let shared: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());

    let (east, east_backends) = zombie_sorcery("kv_east", dir.path());
    east_backends.kv.add_store("shared", Arc::clone(&shared));
    east.apply_mapping("zombie", "kvstore", "east,store=shared", false)?;

    let (west, west_backends) = zombie_sorcery("kv_west", dir.path());
    west_backends.kv.add_store("shared", Arc::clone(&shared));
    west.apply_mapping("zombie", "kvstore", "west,store=shared", false)?;

    east.create(&zombie(&east, "bob", |_| {}))?;
    assert!(west.retrieve_by_id("zombie", "bob")?.is_none());
    west.create(&zombie(&west, "bob", |_| {}))?;

    assert!(shared.get("east/zombie", "bob")?.is_some());
    assert!(shared.get("west/zombie", "bob")?.is_some());
    Ok(())
}

#[test]
fn test_lookups() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (sorcery, _) = zombie_sorcery("kv_lookups", dir.path());
    sorcery.apply_mapping("zombie", "kvstore", "undead", false)?;

    for (id, brains) in [("sip/alice", 7), ("sip/albert", 2), ("sip/bob", 7), ("iax/carol", 1)] {
        sorcery.create(&zombie(&sorcery, id, |z| z.brains = brains))?;
    }

    assert_eq!(ids(&sorcery.retrieve_multiple("zombie", None)?).len(), 4);
    let sevens = sorcery.retrieve_multiple("zombie", Some(&ObjectSet::new().with("brains", "7")))?;
    assert_eq!(ids(&sevens), vec!["sip/alice", "sip/bob"]);

    assert_eq!(
        ids(&sorcery.retrieve_by_prefix("zombie", "sip/al")?),
        vec!["sip/albert", "sip/alice"]
    );
    assert_eq!(
        ids(&sorcery.retrieve_by_regex("zombie", "^sip/al.ce$")?),
        vec!["sip/alice"]
    );
    assert_eq!(
        ids(&sorcery.retrieve_by_regex("zombie", "o")?),
        vec!["iax/carol", "sip/bob"]
    );
    assert!(matches!(
        sorcery.retrieve_by_regex("zombie", "("),
        Err(SorceryError::InvalidRegex { .. })
    ));

    let first = sorcery.retrieve_by_fields("zombie", &ObjectSet::new().with("brains", "1"))?;
    assert_eq!(first.unwrap().id(), "iax/carol");
    Ok(())
}

#[test]
#[timeout(2000)]
fn test_file_store_survives_instances() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    {
        let (sorcery, backends) = zombie_sorcery("kv_file_first", dir.path());
        let store = FileKvStore::open("undead.json", sorcery.registry().config())?;
        backends.kv.add_store("disk", Arc::new(store));
        sorcery.apply_mapping("zombie", "kvstore", "undead,store=disk", false)?;
        sorcery.create(&zombie(&sorcery, "bob", |z| z.name = "Bob".to_string()))?;
    }
    assert!(
        dir.path().join("undead.json").exists() || dir.path().join("undead.json.journal").exists()
    );

    let (sorcery, backends) = zombie_sorcery("kv_file_second", dir.path());
    let store = FileKvStore::open("undead.json", sorcery.registry().config())?;
    backends.kv.add_store("disk", Arc::new(store));
    sorcery.apply_mapping("zombie", "kvstore", "undead,store=disk", false)?;
    let bob = sorcery.retrieve_by_id("zombie", "bob")?.unwrap();
    assert_eq!(as_zombie(&bob).name, "Bob");
    Ok(())
}

#[test]
fn test_open_refuses_bad_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let (sorcery, _) = zombie_sorcery("kv_refusals", dir.path());
    for args in ["", "undead,store=nowhere"] {
        assert!(
            matches!(
                sorcery.apply_mapping("zombie", "kvstore", args, false),
                Err(SorceryError::BackendOpen { .. })
            ),
            "'{}' should be refused",
            args
        );
    }
}
