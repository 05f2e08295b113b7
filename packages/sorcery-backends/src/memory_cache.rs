//! Bounded, expiring in-memory store for cache chain entries.
//!
//! Mapping arguments, all optional:
//!
//! | option | meaning |
//! |---|---|
//! | `maximum_objects=<n>` | entry limit, oldest evicted first; 0 for none |
//! | `object_lifetime_maximum=<seconds>` | age after which entries are dropped; 0 for none |
//! | `object_lifetime_stale=<seconds>` | age after which a hit is refreshed from the chain; 0 for none |
//! | `expire_on_reload=yes\|no` | drop every entry when the type is reloaded |
//! | `full_backend_cache=yes\|no` | hold every object of the type and answer multi-object lookups |
//!
//! Without `full_backend_cache` the cache only answers lookups by id.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use regex::Regex;
use sorcery_core::backend::memory::filter_by_fields;
use sorcery_core::{
    Backend, BackendArgs, BackendFactory, ObjectRef, ObjectSet, ObjectType, OpenContext, Result,
    SorceryError,
};

struct CacheEntry {
    object: ObjectRef,
    stored: Instant,
    generation: u64,
}

/// Entries plus their insertion order, oldest first.
///
/// Queue items carry the generation of the entry they were pushed for.
/// Replacing or removing an entry leaves its old item behind as stale;
/// stale items are skipped on eviction and swept once they outnumber the
/// entries.
#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<(String, u64)>,
    next_generation: u64,
    /// Every object of the type is held.
    complete: bool,
}

impl CacheState {
    fn remove(&mut self, id: &str) -> Option<CacheEntry> {
        self.entries.remove(id)
    }

    fn insert(&mut self, id: &str, object: ObjectRef) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.entries.insert(
            id.to_string(),
            CacheEntry {
                object,
                stored: Instant::now(),
                generation,
            },
        );
        self.order.push_back((id.to_string(), generation));
        if self.order.len() > 2 * self.entries.len() + 16 {
            self.sweep();
        }
    }

    fn is_current(&self, id: &str, generation: u64) -> bool {
        self.entries
            .get(id)
            .is_some_and(|entry| entry.generation == generation)
    }

    fn sweep(&mut self) {
        let entries = &self.entries;
        self.order.retain(|(id, generation)| {
            entries
                .get(id)
                .is_some_and(|entry| entry.generation == *generation)
        });
    }

    /// Removes the oldest entry.
    fn evict_oldest(&mut self) -> Option<String> {
        while let Some((id, generation)) = self.order.pop_front() {
            if self.is_current(&id, generation) {
                self.entries.remove(&id);
                self.complete = false;
                return Some(id);
            }
        }
        None
    }

    /// Current entries, oldest first.
    fn in_order(&self) -> impl Iterator<Item = (&String, &CacheEntry)> + '_ {
        self.order.iter().filter_map(|(id, generation)| {
            self.entries
                .get(id)
                .filter(|entry| entry.generation == *generation)
                .map(|entry| (id, entry))
        })
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.complete = false;
    }
}

/// Settings of one [`MemoryCacheBackend`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryCacheOptions {
    /// Entry limit, oldest evicted first; 0 for none
    pub maximum_objects: usize,
    /// Age after which an entry is no longer returned
    pub lifetime: Option<Duration>,
    /// Age after which a hit is refreshed from the rest of the chain
    pub stale_after: Option<Duration>,
    /// Drop every entry on reload
    pub expire_on_reload: bool,
    /// Hold every object of the type and answer multi-object lookups
    pub full_backend_cache: bool,
}

/// Cache backend. Creating an id that is already cached replaces it.
pub struct MemoryCacheBackend {
    options: MemoryCacheOptions,
    state: Mutex<CacheState>,
}

impl MemoryCacheBackend {
    /// # Arguments
    /// * `maximum_objects` - Entry limit, oldest evicted first; 0 for none
    /// * `lifetime` - Age after which an entry is no longer returned
    pub fn new(maximum_objects: usize, lifetime: Option<Duration>) -> Self {
        Self::with_options(MemoryCacheOptions {
            maximum_objects,
            lifetime,
            ..Default::default()
        })
    }

    pub fn with_options(options: MemoryCacheOptions) -> Self {
        Self {
            options,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn options(&self) -> &MemoryCacheOptions {
        &self.options
    }

    /// Number of entries, expired ones included until they are touched.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the cache currently holds every object of its type.
    pub fn is_complete(&self) -> bool {
        self.state.lock().complete
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        self.options
            .lifetime
            .is_some_and(|lifetime| entry.stored.elapsed() > lifetime)
    }

    fn purge_expired(&self, state: &mut CacheState) {
        if self.options.lifetime.is_none() {
            return;
        }
        let expired: Vec<String> = state
            .in_order()
            .filter(|(_, entry)| self.is_expired(entry))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            tracing::debug!("Expiring cached object '{}'", id);
            state.remove(id);
        }
        if !expired.is_empty() {
            state.complete = false;
        }
    }

    /// Live entries in insertion order when the cache holds the complete
    /// set; nothing otherwise.
    fn complete_set(&self) -> Vec<(String, ObjectRef)> {
        if !self.options.full_backend_cache {
            return Vec::new();
        }
        let mut state = self.state.lock();
        self.purge_expired(&mut state);
        if !state.complete {
            return Vec::new();
        }
        state
            .in_order()
            .map(|(id, entry)| (id.clone(), Arc::clone(&entry.object)))
            .collect()
    }

    fn not_found(ty: &ObjectType, object: &ObjectRef) -> SorceryError {
        SorceryError::NotFound {
            type_name: ty.name().to_string(),
            id: object.id().to_string(),
        }
    }
}

impl Backend for MemoryCacheBackend {
    fn name(&self) -> &str {
        "memory_cache"
    }

    fn create(&self, _ty: &ObjectType, object: &ObjectRef) -> Result<()> {
        let mut state = self.state.lock();
        state.insert(object.id(), Arc::clone(object));
        while self.options.maximum_objects > 0 && state.entries.len() > self.options.maximum_objects {
            let Some(oldest) = state.evict_oldest() else {
                break;
            };
            tracing::debug!("Evicting cached object '{}'", oldest);
        }
        Ok(())
    }

    fn retrieve_id(&self, _ty: &ObjectType, id: &str) -> Result<Option<ObjectRef>> {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get(id) else {
            return Ok(None);
        };
        if !self.is_expired(entry) {
            return Ok(Some(Arc::clone(&entry.object)));
        }
        tracing::debug!("Expiring cached object '{}'", id);
        state.remove(id);
        state.complete = false;
        Ok(None)
    }

    fn retrieve_multiple(
        &self,
        ty: &ObjectType,
        fields: Option<&ObjectSet>,
    ) -> Result<Vec<ObjectRef>> {
        let objects = self.complete_set().into_iter().map(|(_, object)| object).collect();
        filter_by_fields(ty, objects, fields)
    }

    fn retrieve_regex(&self, _ty: &ObjectType, pattern: &str) -> Result<Vec<ObjectRef>> {
        let regex = Regex::new(pattern).map_err(|e| SorceryError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(self
            .complete_set()
            .into_iter()
            .filter(|(id, _)| regex.is_match(id))
            .map(|(_, object)| object)
            .collect())
    }

    fn retrieve_prefix(&self, _ty: &ObjectType, prefix: &str) -> Result<Vec<ObjectRef>> {
        Ok(self
            .complete_set()
            .into_iter()
            .filter(|(id, _)| id.starts_with(prefix))
            .map(|(_, object)| object)
            .collect())
    }

    fn update(&self, ty: &ObjectType, object: &ObjectRef) -> Result<()> {
        let mut state = self.state.lock();
        let live = state
            .entries
            .get(object.id())
            .is_some_and(|entry| !self.is_expired(entry));
        if !live {
            if state.remove(object.id()).is_some() {
                state.complete = false;
            }
            return Err(Self::not_found(ty, object));
        }
        state.insert(object.id(), Arc::clone(object));
        Ok(())
    }

    fn delete(&self, ty: &ObjectType, object: &ObjectRef) -> Result<()> {
        self.state
            .lock()
            .remove(object.id())
            .map(|_| ())
            .ok_or_else(|| Self::not_found(ty, object))
    }

    fn reload(&self, ty: &ObjectType) -> Result<()> {
        if self.options.expire_on_reload {
            let mut state = self.state.lock();
            tracing::debug!(
                "Expiring {} cached objects of type '{}' on reload",
                state.entries.len(),
                ty.name()
            );
            state.clear();
        }
        Ok(())
    }

    fn is_stale(&self, _ty: &ObjectType, object: &ObjectRef) -> bool {
        let Some(stale_after) = self.options.stale_after else {
            return false;
        };
        self.state
            .lock()
            .entries
            .get(object.id())
            .is_some_and(|entry| entry.stored.elapsed() > stale_after)
    }

    fn needs_full_set(&self, _ty: &ObjectType) -> bool {
        if !self.options.full_backend_cache {
            return false;
        }
        let mut state = self.state.lock();
        self.purge_expired(&mut state);
        !state.complete
    }

    fn fill(&self, ty: &ObjectType, objects: &[ObjectRef]) -> Result<()> {
        let maximum = self.options.maximum_objects;
        if maximum > 0 && objects.len() > maximum {
            return Err(SorceryError::LoadRejected {
                backend: "memory_cache".to_string(),
                reason: format!(
                    "{} objects of type '{}' exceed maximum_objects={}",
                    objects.len(),
                    ty.name(),
                    maximum
                ),
            });
        }
        let mut state = self.state.lock();
        state.clear();
        for object in objects {
            state.insert(object.id(), Arc::clone(object));
        }
        state.complete = true;
        Ok(())
    }

    fn close(&self) {
        self.state.lock().clear();
    }
}

/// Factory for [`MemoryCacheBackend`], registered as `memory_cache`.
#[derive(Debug, Default)]
pub struct MemoryCacheFactory;

impl BackendFactory for MemoryCacheFactory {
    fn name(&self) -> &str {
        "memory_cache"
    }

    fn open(&self, context: &OpenContext<'_>, args: &BackendArgs) -> Result<Box<dyn Backend>> {
        let refuse = |reason: String| SorceryError::BackendOpen {
            backend: "memory_cache".to_string(),
            type_name: context.type_name.to_string(),
            reason,
        };
        let seconds = |key: &str, value: &str| -> Result<Option<Duration>> {
            let seconds: u64 = value
                .parse()
                .map_err(|_| refuse(format!("{} '{}' is not a number", key, value)))?;
            Ok((seconds > 0).then(|| Duration::from_secs(seconds)))
        };
        let flag = |key: &str, value: &str| -> Result<bool> {
            match value.to_ascii_lowercase().as_str() {
                "yes" | "true" | "on" | "1" => Ok(true),
                "no" | "false" | "off" | "0" => Ok(false),
                _ => Err(refuse(format!("{} '{}' is not yes or no", key, value))),
            }
        };

        let mut options = MemoryCacheOptions::default();
        for (key, value) in args.options() {
            let key = key.to_ascii_lowercase();
            match key.as_str() {
                "maximum_objects" => {
                    options.maximum_objects = value
                        .parse()
                        .map_err(|_| refuse(format!("maximum_objects '{}' is not a number", value)))?;
                }
                "object_lifetime_maximum" => options.lifetime = seconds(&key, value)?,
                "object_lifetime_stale" => options.stale_after = seconds(&key, value)?,
                "expire_on_reload" => options.expire_on_reload = flag(&key, value)?,
                "full_backend_cache" => options.full_backend_cache = flag(&key, value)?,
                other => return Err(refuse(format!("unsupported option '{}'", other))),
            }
        }
        if let Some(positional) = args.first() {
            return Err(refuse(format!("unexpected argument '{}'", positional)));
        }

        tracing::debug!("Opened memory_cache for '{}' ({:?})", context.type_name, options);
        Ok(Box::new(MemoryCacheBackend::with_options(options)))
    }
}
