//! Volatile in-process object store.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use regex::Regex;

use super::{Backend, BackendArgs, BackendFactory, OpenContext};
use crate::error::{Result, SorceryError};
use crate::fields::HandlerPreference;
use crate::object::ObjectRef;
use crate::objectset::ObjectSet;
use crate::types::ObjectType;

/// Objects keyed by id. Creating an existing id fails; updating or
/// deleting a missing one fails.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: RwLock<BTreeMap<String, ObjectRef>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Result<Vec<ObjectRef>> {
        let objects = self.objects.read().map_err(|_| SorceryError::LockPoisoned)?;
        Ok(objects.values().cloned().collect())
    }
}

/// Keeps the objects whose object set matches `fields`.
pub fn filter_by_fields(
    ty: &ObjectType,
    objects: Vec<ObjectRef>,
    fields: Option<&ObjectSet>,
) -> Result<Vec<ObjectRef>> {
    let Some(fields) = fields else {
        return Ok(objects);
    };
    let mut matched = Vec::new();
    for object in objects {
        let set = ty.create_object_set(object.as_ref(), HandlerPreference::PreferList)?;
        if set.matches(fields) {
            matched.push(object);
        }
    }
    Ok(matched)
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn create(&self, ty: &ObjectType, object: &ObjectRef) -> Result<()> {
        let mut objects = self.objects.write().map_err(|_| SorceryError::LockPoisoned)?;
        let id = object.details().id();
        if objects.contains_key(id) {
            return Err(SorceryError::ObjectExists {
                type_name: ty.name().to_string(),
                id: id.to_string(),
            });
        }
        objects.insert(id.to_string(), Arc::clone(object));
        Ok(())
    }

    fn retrieve_id(&self, _ty: &ObjectType, id: &str) -> Result<Option<ObjectRef>> {
        let objects = self.objects.read().map_err(|_| SorceryError::LockPoisoned)?;
        Ok(objects.get(id).cloned())
    }

    fn retrieve_multiple(
        &self,
        ty: &ObjectType,
        fields: Option<&ObjectSet>,
    ) -> Result<Vec<ObjectRef>> {
        filter_by_fields(ty, self.snapshot()?, fields)
    }

    fn retrieve_regex(&self, _ty: &ObjectType, pattern: &str) -> Result<Vec<ObjectRef>> {
        let regex = Regex::new(pattern).map_err(|e| SorceryError::invalid_regex(pattern, e))?;
        let objects = self.objects.read().map_err(|_| SorceryError::LockPoisoned)?;
        Ok(objects
            .iter()
            .filter(|(id, _)| regex.is_match(id))
            .map(|(_, object)| Arc::clone(object))
            .collect())
    }

    fn retrieve_prefix(&self, _ty: &ObjectType, prefix: &str) -> Result<Vec<ObjectRef>> {
        let objects = self.objects.read().map_err(|_| SorceryError::LockPoisoned)?;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(id, _)| id.starts_with(prefix))
            .map(|(_, object)| Arc::clone(object))
            .collect())
    }

    fn update(&self, ty: &ObjectType, object: &ObjectRef) -> Result<()> {
        let mut objects = self.objects.write().map_err(|_| SorceryError::LockPoisoned)?;
        match objects.get_mut(object.details().id()) {
            Some(slot) => {
                *slot = Arc::clone(object);
                Ok(())
            }
            None => Err(SorceryError::NotFound {
                type_name: ty.name().to_string(),
                id: object.details().id().to_string(),
            }),
        }
    }

    fn delete(&self, ty: &ObjectType, object: &ObjectRef) -> Result<()> {
        let mut objects = self.objects.write().map_err(|_| SorceryError::LockPoisoned)?;
        objects
            .remove(object.details().id())
            .map(|_| ())
            .ok_or_else(|| SorceryError::NotFound {
                type_name: ty.name().to_string(),
                id: object.details().id().to_string(),
            })
    }
}

/// Factory for [`MemoryBackend`]; takes no arguments.
#[derive(Debug, Default)]
pub struct MemoryFactory;

impl BackendFactory for MemoryFactory {
    fn name(&self) -> &str {
        "memory"
    }

    fn open(&self, context: &OpenContext<'_>, args: &BackendArgs) -> Result<Box<dyn Backend>> {
        if !args.raw().is_empty() {
            tracing::debug!(
                "memory backend for '{}' ignores arguments '{}'",
                context.type_name,
                args.raw()
            );
        }
        Ok(Box::new(MemoryBackend::new()))
    }
}
