//! Config file backend: sections to objects, criteria, integrity and
//! reloads.

use std::fs;

use ntest::timeout;
use sorcery_backends::{ConfigFileBackend, ConfigFileOptions, Integrity};
use sorcery_core::{Backend, ObjectSet, SorceryError};

use super::helpers::{as_zombie, ids, zombie, zombie_sorcery};

const HORDE: &str = "\
; the usual suspects
[shambler](!)
type = zombie
hungry = yes

[bob](shambler)
name = Bob
brains = 3

[alice](shambler)
name = Alice
brains = 7

[carol]
type = ghoul
name = Carol
";

#[test]
#[timeout(2000)]
fn test_sections_become_objects() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("horde.conf"), HORDE)?;
    let (sorcery, _) = zombie_sorcery("config_sections", dir.path());
    sorcery.apply_mapping("zombie", "config", "horde.conf", false)?;
    sorcery.load()?;

    let all = sorcery.retrieve_multiple("zombie", None)?;
    assert_eq!(ids(&all), vec!["alice", "bob", "carol"]);

    let bob = sorcery.retrieve_by_id("zombie", "bob")?.unwrap();
    assert_eq!(as_zombie(&bob).name, "Bob");
    assert_eq!(as_zombie(&bob).brains, 3);
    assert!(as_zombie(&bob).hungry);
    assert!(sorcery.retrieve_by_id("zombie", "shambler")?.is_none());

    let prefixed = sorcery.retrieve_by_prefix("zombie", "a")?;
    assert_eq!(ids(&prefixed), vec!["alice"]);
    let matched = sorcery.retrieve_by_regex("zombie", "^(bob|carol)$")?;
    assert_eq!(ids(&matched), vec!["bob", "carol"]);

    let big = sorcery.retrieve_by_fields("zombie", &ObjectSet::new().with("brains", "7"))?;
    assert_eq!(big.unwrap().id(), "alice");
    Ok(())
}

#[test]
#[timeout(2000)]
fn test_criteria_filter_sections() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("horde.conf"), HORDE)?;
    let (sorcery, _) = zombie_sorcery("config_criteria", dir.path());
    sorcery.apply_mapping("zombie", "config", "horde.conf,criteria=type=zombie", false)?;
    sorcery.load()?;
    assert_eq!(ids(&sorcery.retrieve_multiple("zombie", None)?), vec!["alice", "bob"]);

    let (insensitive, _) = zombie_sorcery("config_criteria_case", dir.path());
    insensitive.apply_mapping(
        "zombie",
        "config",
        "horde.conf,criteria=type=GHOUL,criteria_case=insensitive",
        false,
    )?;
    insensitive.load()?;
    assert_eq!(ids(&insensitive.retrieve_multiple("zombie", None)?), vec!["carol"]);
    Ok(())
}

#[test]
#[timeout(2000)]
fn test_explicit_name_and_single_object() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("horde.conf");
    fs::write(&path, HORDE)?;
    let (sorcery, _) = zombie_sorcery("config_single", dir.path());
    let ty = sorcery.object_type("zombie")?;

    let options = ConfigFileOptions {
        explicit_name: Some("alice".to_string()),
        single_object: true,
        ..Default::default()
    };
    let backend = ConfigFileBackend::new(&path, options);
    backend.load(&ty)?;
    assert_eq!(backend.len(), 1);
    assert!(backend.retrieve_id(&ty, "alice")?.is_some());

    let backend = ConfigFileBackend::new(
        &path,
        ConfigFileOptions {
            single_object: true,
            ..Default::default()
        },
    );
    assert!(matches!(
        backend.load(&ty),
        Err(SorceryError::LoadRejected { .. })
    ));
    assert!(backend.is_empty());
    Ok(())
}

#[test]
#[timeout(2000)]
fn test_file_integrity_keeps_previous_snapshot() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("horde.conf");
    fs::write(&path, HORDE)?;
    let (sorcery, _) = zombie_sorcery("config_file_integrity", dir.path());
    let ty = sorcery.object_type("zombie")?;

    let backend = ConfigFileBackend::new(&path, ConfigFileOptions::default());
    backend.load(&ty)?;
    assert_eq!(backend.len(), 3);

    fs::write(&path, "[bob]\nname = Bob\nbrains = lots\n[dave]\nname = Dave\n")?;
    assert!(backend.reload(&ty).is_err());
    assert_eq!(backend.len(), 3);
    assert!(backend.retrieve_id(&ty, "dave")?.is_none());
    Ok(())
}

#[test]
#[timeout(2000)]
fn test_object_integrity_skips_bad_sections() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("horde.conf");
    fs::write(&path, "[bob]\nbrains = 3\n[alice]\nbrains = 7\n")?;
    let (sorcery, _) = zombie_sorcery("config_object_integrity", dir.path());
    let ty = sorcery.object_type("zombie")?;

    let backend = ConfigFileBackend::new(
        &path,
        ConfigFileOptions {
            integrity: Integrity::Object,
            ..Default::default()
        },
    );
    backend.load(&ty)?;

    // bob goes bad and keeps his last good state, alice leaves, dave arrives
    fs::write(
        &path,
        "[bob]\nbrains = many\n[dave]\nbrains = 1\n[eve]\nteeth = 32\n",
    )?;
    backend.reload(&ty)?;

    let bob = backend.retrieve_id(&ty, "bob")?.unwrap();
    assert_eq!(as_zombie(&bob).brains, 3);
    assert!(backend.retrieve_id(&ty, "alice")?.is_none());
    assert!(backend.retrieve_id(&ty, "dave")?.is_some());
    assert!(backend.retrieve_id(&ty, "eve")?.is_none());
    Ok(())
}

#[test]
#[timeout(2000)]
fn test_unchanged_file_skips_reload_unless_forced() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("horde.conf");
    fs::write(&path, HORDE)?;
    let (sorcery, _) = zombie_sorcery("config_unchanged", dir.path());
    sorcery.apply_mapping("zombie", "config", "horde.conf", false)?;
    sorcery.load()?;

    let before = sorcery.retrieve_by_id("zombie", "bob")?.unwrap();
    sorcery.reload()?;
    let same = sorcery.retrieve_by_id("zombie", "bob")?.unwrap();
    assert!(std::sync::Arc::ptr_eq(&before, &same));

    sorcery.force_reload()?;
    let fresh = sorcery.retrieve_by_id("zombie", "bob")?.unwrap();
    assert!(!std::sync::Arc::ptr_eq(&before, &fresh));
    assert_eq!(as_zombie(&fresh).name, "Bob");

    fs::write(&path, "[bob]\nname = Robert\n")?;
    sorcery.reload()?;
    let renamed = sorcery.retrieve_by_id("zombie", "bob")?.unwrap();
    assert_eq!(as_zombie(&renamed).name, "Robert");
    assert!(sorcery.retrieve_by_id("zombie", "alice")?.is_none());
    Ok(())
}

#[test]
#[timeout(2000)]
fn test_writes_are_unsupported() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("horde.conf"), HORDE)?;
    let (sorcery, _) = zombie_sorcery("config_read_only", dir.path());
    sorcery.apply_mapping("zombie", "config", "horde.conf", false)?;
    sorcery.load()?;

    let newcomer = zombie(&sorcery, "dave", |_| {});
    assert!(matches!(
        sorcery.create(&newcomer),
        Err(SorceryError::Unsupported { .. })
    ));
    let bob = sorcery.retrieve_by_id("zombie", "bob")?.unwrap();
    assert!(sorcery.update(&bob).is_err());
    assert!(sorcery.delete(&bob).is_err());
    Ok(())
}

#[test]
fn test_open_refuses_bad_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let (sorcery, _) = zombie_sorcery("config_refusals", dir.path());
    for args in ["", "horde.conf,integrity=sometimes", "horde.conf,colour=green"] {
        assert!(
            matches!(
                sorcery.apply_mapping("zombie", "config", args, false),
                Err(SorceryError::BackendOpen { .. })
            ),
            "'{}' should be refused",
            args
        );
    }
}

#[test]
#[timeout(2000)]
fn test_cache_in_front_of_config() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("horde.conf"), HORDE)?;
    let (sorcery, _) = zombie_sorcery("config_cached", dir.path());
    sorcery.apply_mapping("zombie", "memory_cache", "maximum_objects=10", true)?;
    sorcery.apply_mapping("zombie", "config", "horde.conf", false)?;
    sorcery.load()?;

    let cache = sorcery.mapping("zombie", 0)?.unwrap();
    let ty = sorcery.object_type("zombie")?;
    assert!(cache.backend().retrieve_id(&ty, "bob")?.is_none());

    let bob = sorcery.retrieve_by_id("zombie", "bob")?.unwrap();
    let cached = cache.backend().retrieve_id(&ty, "bob")?.unwrap();
    assert!(std::sync::Arc::ptr_eq(&bob, &cached));
    Ok(())
}
