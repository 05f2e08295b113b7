//! Observer notification and removal.

use std::sync::{Arc, Mutex};

use sorcery_core::observer::{GlobalObserver, InstanceObserver, ObjectObserver, WizardObserver};
use sorcery_core::{ObjectRef, Registry, RegistryConfig};

use super::helpers::{mapped_widget_sorcery, widget, widget_sorcery};

#[derive(Default)]
struct Journal {
    events: Mutex<Vec<String>>,
}

impl Journal {
    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl ObjectObserver for Journal {
    fn created(&self, object: &ObjectRef) {
        self.record(format!("created {}", object.id()));
    }
    fn updated(&self, object: &ObjectRef) {
        self.record(format!("updated {}", object.id()));
    }
    fn deleted(&self, object: &ObjectRef) {
        self.record(format!("deleted {}", object.id()));
    }
    fn loaded(&self, type_name: &str) {
        self.record(format!("loaded {}", type_name));
    }
}

impl InstanceObserver for Journal {
    fn instance_loading(&self, instance: &str, reloaded: bool) {
        self.record(format!("loading {} {}", instance, reloaded));
    }
    fn instance_loaded(&self, instance: &str, reloaded: bool) {
        self.record(format!("loaded {} {}", instance, reloaded));
    }
    fn wizard_mapped(&self, _instance: &str, type_name: &str, backend: &str, args: &str) {
        self.record(format!("mapped {} {} {}", type_name, backend, args));
    }
    fn object_type_registered(&self, _instance: &str, type_name: &str) {
        self.record(format!("registered {}", type_name));
    }
    fn object_type_loaded(&self, _instance: &str, type_name: &str, _reloaded: bool) {
        self.record(format!("type loaded {}", type_name));
    }
}

impl WizardObserver for Journal {
    fn wizard_loading(&self, backend: &str, type_name: &str, reloaded: bool) {
        self.record(format!("wizard loading {} {} {}", backend, type_name, reloaded));
    }
    fn wizard_loaded(&self, backend: &str, type_name: &str, reloaded: bool) {
        self.record(format!("wizard loaded {} {} {}", backend, type_name, reloaded));
    }
}

impl GlobalObserver for Journal {
    fn instance_created(&self, instance: &str) {
        self.record(format!("instance {}", instance));
    }
    fn instance_destroying(&self, instance: &str) {
        self.record(format!("destroying {}", instance));
    }
}

#[test]
fn test_object_observer_sees_writes_and_loads() -> anyhow::Result<()> {
    let sorcery = mapped_widget_sorcery("observer_objects");
    let journal = Arc::new(Journal::default());
    sorcery.add_object_observer("widget", journal.clone())?;

    let object = widget(&sorcery, "w1", |_| {});
    sorcery.create(&object)?;
    sorcery.update(&object)?;
    sorcery.delete(&object)?;
    sorcery.load_object("widget")?;
    // failed writes raise nothing
    assert!(sorcery.delete(&object).is_err());

    assert_eq!(
        journal.take(),
        vec!["created w1", "updated w1", "deleted w1", "loaded widget"]
    );

    // removal matches the shared allocation, not the handle
    let observer: Arc<dyn ObjectObserver> = journal.clone();
    assert!(sorcery.remove_object_observer("widget", &observer)?);
    assert!(!sorcery.remove_object_observer("widget", &observer)?);
    Ok(())
}

#[test]
fn test_removed_object_observer_is_silent() -> anyhow::Result<()> {
    let sorcery = mapped_widget_sorcery("observer_removed");
    let journal = Arc::new(Journal::default());
    let observer: Arc<dyn ObjectObserver> = journal.clone();
    sorcery.add_object_observer("widget", Arc::clone(&observer))?;
    assert!(sorcery.remove_object_observer("widget", &observer)?);

    sorcery.create(&widget(&sorcery, "w1", |_| {}))?;
    assert!(journal.take().is_empty());
    assert!(sorcery.add_object_observer("sprocket", observer).is_err());
    Ok(())
}

#[test]
fn test_instance_observer_sees_mapping_and_load() -> anyhow::Result<()> {
    let sorcery = widget_sorcery("observer_instance");
    let journal = Arc::new(Journal::default());
    sorcery.add_observer(journal.clone());

    sorcery.apply_mapping("widget", "memory", "primary", false)?;
    sorcery.load()?;

    assert_eq!(
        journal.take(),
        vec![
            "mapped widget memory primary",
            "loading observer_instance false",
            "type loaded gizmo",
            "type loaded widget",
            "loaded observer_instance false",
        ]
    );

    let observer: Arc<dyn InstanceObserver> = journal.clone();
    assert!(sorcery.remove_observer(&observer));
    sorcery.reload()?;
    assert!(journal.take().is_empty());
    Ok(())
}

#[test]
fn test_wizard_observer_sees_backend_loads() -> anyhow::Result<()> {
    let sorcery = mapped_widget_sorcery("observer_wizard");
    let journal = Arc::new(Journal::default());
    sorcery
        .registry()
        .add_wizard_observer("memory", journal.clone())?;

    sorcery.reload_object("widget")?;
    assert_eq!(
        journal.take(),
        vec![
            "wizard loading memory widget true",
            "wizard loaded memory widget true",
        ]
    );
    assert!(sorcery
        .registry()
        .add_wizard_observer("nonexistent", journal.clone())
        .is_err());
    Ok(())
}

#[test]
fn test_global_observer_sees_instance_lifecycle() {
    let registry = Registry::new(RegistryConfig::default());
    let journal = Arc::new(Journal::default());
    registry.add_observer(journal.clone());

    let sorcery = registry.open("observer_global").unwrap();
    let again = registry.open("observer_global").unwrap();
    drop(sorcery);
    assert!(registry.retrieve_by_module_name("observer_global").is_some());
    drop(again);

    assert_eq!(
        journal.take(),
        vec!["instance observer_global", "destroying observer_global"]
    );
    assert!(registry.retrieve_by_module_name("observer_global").is_none());
}

#[test]
fn test_type_registration_is_observed() -> anyhow::Result<()> {
    let registry = Registry::new(RegistryConfig::default());
    let sorcery = registry.open("observer_types")?;
    let journal = Arc::new(Journal::default());
    sorcery.add_observer(journal.clone());

    sorcery.register_type(sorcery_core::TypeSpec::<super::helpers::Gizmo>::with_default("gizmo"))?;
    assert_eq!(journal.take(), vec!["registered gizmo"]);
    Ok(())
}
