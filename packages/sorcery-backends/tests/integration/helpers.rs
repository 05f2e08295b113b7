//! Shared fixtures: a `zombie` type and an instance with every backend of
//! this crate registered.

use std::path::Path;
use std::sync::Arc;

use sorcery_backends::{register_all, BackendSet};
use sorcery_core::{
    lens, FieldKind, FieldSpec, ObjectDetails, ObjectRef, Registry, RegistryConfig, Sorcery,
    SorceryObject, TypeSpec,
};

#[derive(Debug, Default, Clone)]
pub struct Zombie {
    pub details: ObjectDetails,
    pub name: String,
    pub brains: u32,
    pub hungry: bool,
}

impl SorceryObject for Zombie {
    fn details(&self) -> &ObjectDetails {
        &self.details
    }
    fn details_mut(&mut self) -> &mut ObjectDetails {
        &mut self.details
    }
}

/// Fresh instance with `zombie` registered but not mapped. Relative
/// backend paths resolve against `config_dir`.
pub fn zombie_sorcery(name: &str, config_dir: &Path) -> (Arc<Sorcery>, BackendSet) {
    let registry = Registry::new(RegistryConfig {
        config_dir: config_dir.to_path_buf(),
        ..Default::default()
    });
    let backends = register_all(&registry).unwrap();
    let sorcery = registry.open(name).unwrap();

    sorcery
        .register_type(TypeSpec::<Zombie>::with_default("zombie"))
        .unwrap();
    let fields = vec![
        FieldSpec::new("name", FieldKind::string(lens!(Zombie, name))),
        FieldSpec::new("brains", FieldKind::uint(lens!(Zombie, brains))).default_value("0"),
        FieldSpec::new("hungry", FieldKind::YesNo(lens!(Zombie, hungry))).default_value("yes"),
        FieldSpec::new("type", FieldKind::Noop),
    ];
    for field in fields {
        sorcery.register_field("zombie", field).unwrap();
    }
    (sorcery, backends)
}

/// Allocates a zombie, lets `edit` adjust it, and shares it.
pub fn zombie(sorcery: &Sorcery, id: &str, edit: impl FnOnce(&mut Zombie)) -> ObjectRef {
    let mut object = sorcery.alloc_as::<Zombie>("zombie", Some(id)).unwrap();
    edit(&mut *object);
    Arc::new(*object)
}

/// Sorted ids of `objects`.
pub fn ids(objects: &[ObjectRef]) -> Vec<String> {
    let mut ids: Vec<String> = objects.iter().map(|o| o.id().to_string()).collect();
    ids.sort();
    ids
}

pub fn as_zombie(object: &ObjectRef) -> &Zombie {
    object.downcast_ref::<Zombie>().unwrap()
}
