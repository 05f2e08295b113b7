//! Mapping configuration files.

use std::path::PathBuf;
use std::sync::Arc;

use ntest::timeout;
use sorcery_core::{ApplyResult, ObjectSet, Registry, RegistryConfig, Sorcery, SorceryError, TypeSpec};
use tempfile::TempDir;

use super::helpers::{register_widget_fields, Widget};

fn configured_sorcery(mapping_file: Option<PathBuf>, name: &str) -> Arc<Sorcery> {
    let registry = Registry::new(RegistryConfig {
        mapping_file,
        ..Default::default()
    });
    let sorcery = registry.open(name).unwrap();
    sorcery
        .register_type(TypeSpec::<Widget>::with_default("widget"))
        .unwrap();
    register_widget_fields(&sorcery);
    sorcery
}

fn write_mapping(dir: &TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("sorcery.conf");
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
#[timeout(1000)]
fn test_apply_config_maps_section_in_order() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_mapping(
        &dir,
        "; mappings for tests\n\
         [other]\n\
         widget = memory,elsewhere\n\
         \n\
         [test]\n\
         widget/cache = memory\n\
         widget = memory,primary\n",
    );
    let sorcery = configured_sorcery(Some(path), "config_section");

    assert_eq!(sorcery.apply_config("test")?, ApplyResult::Success);
    assert_eq!(sorcery.mapping_count("widget")?, 2);

    let cache = sorcery.mapping("widget", 0)?.unwrap();
    assert!(cache.is_caching());
    assert_eq!(cache.args(), "");
    let primary = sorcery.mapping("widget", 1)?.unwrap();
    assert!(!primary.is_caching());
    assert_eq!(primary.args(), "primary");

    // applying the same section again changes nothing
    assert_eq!(sorcery.apply_config("test")?, ApplyResult::Duplicate);
    assert_eq!(sorcery.mapping_count("widget")?, 2);
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_missing_file_or_section_is_no_configuration() -> anyhow::Result<()> {
    let unconfigured = configured_sorcery(None, "config_none");
    assert_eq!(unconfigured.apply_config("test")?, ApplyResult::NoConfiguration);

    let dir = TempDir::new()?;
    let absent = configured_sorcery(Some(dir.path().join("absent.conf")), "config_absent");
    assert_eq!(absent.apply_config("test")?, ApplyResult::NoConfiguration);

    let path = write_mapping(&dir, "[other]\nwidget = memory\n");
    let sorcery = configured_sorcery(Some(path), "config_missing_section");
    assert_eq!(sorcery.apply_config("test")?, ApplyResult::NoConfiguration);
    assert_eq!(sorcery.mapping_count("widget")?, 0);
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_unregistered_type_applies_nothing() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_mapping(&dir, "[test]\nwidget = memory\nsprocket = memory\n");
    let sorcery = configured_sorcery(Some(path), "config_unregistered");

    assert!(matches!(
        sorcery.apply_config("test"),
        Err(SorceryError::TypeNotRegistered { .. })
    ));
    assert_eq!(sorcery.mapping_count("widget")?, 0);
    Ok(())
}

#[test]
#[timeout(1000)]
fn test_malformed_file_is_an_error() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_mapping(&dir, "widget = memory\n");
    let sorcery = configured_sorcery(Some(path), "config_malformed");
    assert!(matches!(sorcery.apply_config("test"), Err(SorceryError::Config(_))));
    Ok(())
}

#[test]
fn test_mapping_set_skips_malformed_pairs() -> anyhow::Result<()> {
    let sorcery = configured_sorcery(None, "config_pairs");
    let pairs = ObjectSet::new()
        .with("/cache", "memory")
        .with("widget", "memory,from-set");
    assert_eq!(sorcery.apply_mapping_set(&pairs)?, ApplyResult::Success);
    assert_eq!(sorcery.mapping("widget", 0)?.unwrap().args(), "from-set");

    let only_bad = ObjectSet::new().with("widget", " ");
    assert_eq!(
        sorcery.apply_mapping_set(&only_bad)?,
        ApplyResult::NoConfiguration
    );
    Ok(())
}
