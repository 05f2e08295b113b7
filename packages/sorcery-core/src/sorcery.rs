//! Data access instance: object types, their backend chains, and the
//! operations that walk those chains.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use regex::Regex;

use crate::backend::{BackendArgs, OpenContext, Registry};
use crate::conf::ConfFile;
use crate::error::{Result, SorceryError};
use crate::fields::{regex_descriptor, typed_descriptor, Custom, FieldSpec, HandlerPreference};
use crate::mapping::{ApplyResult, MappedBackend, MappingDirective, MappingState};
use crate::object::{downcast_box, ObjectRef, SorceryObject};
use crate::objectset::ObjectSet;
use crate::observer::{InstanceObserver, ObjectObserver, ObserverList};
use crate::types::{erase_copy, erase_diff, ObjectType, TypeSpec};

/// Which refresh a load pass performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadKind {
    Load,
    Reload,
    ForceReload,
}

impl LoadKind {
    fn reloaded(self) -> bool {
        self != LoadKind::Load
    }
}

/// A named data access instance.
///
/// Obtained from [`Registry::open`]. Dropping the last handle notifies
/// global observers and closes every mapped backend.
pub struct Sorcery {
    name: String,
    registry: Arc<Registry>,
    types: RwLock<BTreeMap<String, Arc<ObjectType>>>,
    observers: ObserverList<dyn InstanceObserver>,
}

impl Sorcery {
    pub(crate) fn new(registry: Arc<Registry>, name: &str) -> Self {
        Self {
            name: name.to_string(),
            registry,
            types: RwLock::new(BTreeMap::new()),
            observers: ObserverList::new(),
        }
    }

    /// Instance (module) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Types and fields
    // ------------------------------------------------------------------

    /// Registers an object type.
    ///
    /// # Returns
    /// `Err(SorceryError::TypeAlreadyRegistered)` if the name is taken; the
    /// existing registration is left untouched.
    pub fn register_type<T: SorceryObject>(&self, spec: TypeSpec<T>) -> Result<()> {
        let name = spec.name.clone();
        {
            let mut types = self.types.write().map_err(|_| SorceryError::LockPoisoned)?;
            if types.contains_key(&name) {
                return Err(SorceryError::TypeAlreadyRegistered { type_name: name });
            }
            types.insert(name.clone(), Arc::new(ObjectType::from_spec(spec)));
        }
        tracing::debug!("Registered object type '{}' on '{}'", name, self.name);
        self.observers
            .notify(|o| o.object_type_registered(&self.name, &name));
        Ok(())
    }

    /// The registered type `type_name`.
    pub fn object_type(&self, type_name: &str) -> Result<Arc<ObjectType>> {
        let types = self.types.read().map_err(|_| SorceryError::LockPoisoned)?;
        types
            .get(type_name)
            .cloned()
            .ok_or_else(|| SorceryError::TypeNotRegistered {
                type_name: type_name.to_string(),
            })
    }

    /// Names of the registered types, sorted. Hidden types are skipped
    /// unless `include_hidden` is set.
    pub fn type_names(&self, include_hidden: bool) -> Vec<String> {
        match self.types.read() {
            Ok(types) => types
                .values()
                .filter(|ty| include_hidden || !ty.is_hidden())
                .map(|ty| ty.name().to_string())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn all_types(&self) -> Result<Vec<Arc<ObjectType>>> {
        let types = self.types.read().map_err(|_| SorceryError::LockPoisoned)?;
        Ok(types.values().cloned().collect())
    }

    /// Registers an exact-name field on a type allocated as `T`.
    ///
    /// # Arguments
    /// * `type_name` - Registered type
    /// * `spec` - Field name, kind, default and options
    ///
    /// # Returns
    /// `Err` if the type is unknown, `T` is not its Rust type, the name is
    /// `id` or taken, or the default does not parse.
    pub fn register_field<T: SorceryObject>(&self, type_name: &str, spec: FieldSpec<T>) -> Result<()> {
        let ty = self.object_type(type_name)?;
        ty.check_rust_type::<T>()?;
        let field = spec.name.clone();
        let descriptor =
            typed_descriptor(spec).map_err(|reason| SorceryError::FieldRegistration {
                type_name: type_name.to_string(),
                field,
                reason,
            })?;
        ty.add_field(descriptor)
    }

    /// Registers a handler owning every field name matching `pattern`.
    pub fn register_regex_field<T: SorceryObject>(
        &self,
        type_name: &str,
        pattern: &str,
        handler: Custom<T>,
    ) -> Result<()> {
        let ty = self.object_type(type_name)?;
        ty.check_rust_type::<T>()?;
        let descriptor = regex_descriptor(pattern, handler)
            .map_err(|e| SorceryError::invalid_regex(pattern, e))?;
        ty.add_field(descriptor)
    }

    /// Whether `field` is accepted by an exact or regex field of the type.
    pub fn is_field_registered(&self, type_name: &str, field: &str) -> bool {
        self.object_type(type_name)
            .map(|ty| ty.is_field_registered(field))
            .unwrap_or(false)
    }

    /// Sets a native copy routine used instead of the object set round trip.
    pub fn set_copy_handler<T: SorceryObject>(
        &self,
        type_name: &str,
        copy: impl Fn(&T, &mut T) + Send + Sync + 'static,
    ) -> Result<()> {
        let ty = self.object_type(type_name)?;
        ty.check_rust_type::<T>()?;
        ty.set_copy_handler(erase_copy(copy))
    }

    /// Sets a native diff routine used instead of comparing object sets.
    pub fn set_diff_handler<T: SorceryObject>(
        &self,
        type_name: &str,
        diff: impl Fn(&T, &T) -> Option<ObjectSet> + Send + Sync + 'static,
    ) -> Result<()> {
        let ty = self.object_type(type_name)?;
        ty.check_rust_type::<T>()?;
        ty.set_diff_handler(erase_diff(diff))
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    pub fn add_observer(&self, observer: Arc<dyn InstanceObserver>) {
        self.observers.add(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn InstanceObserver>) -> bool {
        self.observers.remove(observer)
    }

    /// Observes object events of one type.
    pub fn add_object_observer(
        &self,
        type_name: &str,
        observer: Arc<dyn ObjectObserver>,
    ) -> Result<()> {
        self.object_type(type_name)?.observers.add(observer);
        Ok(())
    }

    pub fn remove_object_observer(
        &self,
        type_name: &str,
        observer: &Arc<dyn ObjectObserver>,
    ) -> Result<bool> {
        Ok(self.object_type(type_name)?.observers.remove(observer))
    }

    // ------------------------------------------------------------------
    // Mappings
    // ------------------------------------------------------------------

    /// Maps the fallback backend, used only while no explicit mapping exists.
    ///
    /// # Returns
    /// `ApplyResult::DefaultUnnecessary` when the type is already mapped.
    pub fn apply_default(&self, type_name: &str, backend: &str, args: &str) -> Result<ApplyResult> {
        let ty = self.object_type(type_name)?;
        self.add_mapping(&ty, backend, args, false, true, None)
    }

    /// Appends a backend to the type's chain.
    pub fn apply_mapping(
        &self,
        type_name: &str,
        backend: &str,
        args: &str,
        caching: bool,
    ) -> Result<ApplyResult> {
        let ty = self.object_type(type_name)?;
        self.add_mapping(&ty, backend, args, caching, false, None)
    }

    /// Inserts a backend at `position` in the type's chain (clamped to the
    /// chain length).
    pub fn insert_mapping(
        &self,
        type_name: &str,
        backend: &str,
        args: &str,
        caching: bool,
        position: usize,
    ) -> Result<ApplyResult> {
        let ty = self.object_type(type_name)?;
        self.add_mapping(&ty, backend, args, caching, false, Some(position))
    }

    /// Removes the first chain entry using `backend` and closes it.
    pub fn remove_mapping(&self, type_name: &str, backend: &str) -> Result<()> {
        let ty = self.object_type(type_name)?;
        let mut state = ty.lock_state()?;
        let mut chain = Vec::clone(&ty.chain());
        let index = chain
            .iter()
            .position(|entry| entry.backend_name() == backend)
            .ok_or_else(|| SorceryError::BackendNotFound(backend.to_string()))?;
        let removed = chain.remove(index);
        if chain.is_empty() {
            *state = MappingState::Unmapped;
        }
        ty.store_chain(chain);
        drop(state);

        removed.backend().close();
        tracing::debug!(
            "Removed backend '{}' from type '{}' on '{}'",
            backend,
            type_name,
            self.name
        );
        Ok(())
    }

    pub fn mapping_count(&self, type_name: &str) -> Result<usize> {
        Ok(self.object_type(type_name)?.mapping_count())
    }

    /// Chain entry `index` of the type.
    pub fn mapping(&self, type_name: &str, index: usize) -> Result<Option<Arc<MappedBackend>>> {
        Ok(self.object_type(type_name)?.mapping(index))
    }

    pub fn mapping_state(&self, type_name: &str) -> Result<MappingState> {
        self.object_type(type_name)?.mapping_state()
    }

    /// Applies the mapping section `section` of the configured mapping file.
    ///
    /// # Returns
    /// `ApplyResult::NoConfiguration` when no mapping file is configured or
    /// it has no such section.
    pub fn apply_config(&self, section: &str) -> Result<ApplyResult> {
        let Some(path) = self.registry.config().mapping_file.clone() else {
            return Ok(ApplyResult::NoConfiguration);
        };
        if !path.exists() {
            tracing::debug!("Mapping file {} does not exist", path.display());
            return Ok(ApplyResult::NoConfiguration);
        }
        let file = ConfFile::load(&path)?;
        match file.section(section) {
            Some(pairs) => self.apply_mapping_set(pairs),
            None => Ok(ApplyResult::NoConfiguration),
        }
    }

    /// Applies `type[/cache] = backend[,args]` pairs.
    ///
    /// Every named type must be registered; nothing is applied otherwise.
    /// Malformed pairs are skipped with a warning.
    pub fn apply_mapping_set(&self, pairs: &ObjectSet) -> Result<ApplyResult> {
        let mut directives = Vec::new();
        for (name, value) in pairs.iter() {
            match MappingDirective::parse(name, value) {
                Some(directive) => {
                    let ty = self.object_type(&directive.type_name)?;
                    directives.push((ty, directive));
                }
                None => tracing::warn!("Ignoring malformed mapping '{} = {}'", name, value),
            }
        }
        if directives.is_empty() {
            return Ok(ApplyResult::NoConfiguration);
        }

        let mut result = ApplyResult::Duplicate;
        for (ty, directive) in directives {
            let applied = self.add_mapping(
                &ty,
                &directive.backend,
                &directive.args,
                directive.caching,
                false,
                None,
            )?;
            if applied == ApplyResult::Success {
                result = ApplyResult::Success;
            }
        }
        Ok(result)
    }

    fn add_mapping(
        &self,
        ty: &ObjectType,
        backend: &str,
        args: &str,
        caching: bool,
        is_default: bool,
        position: Option<usize>,
    ) -> Result<ApplyResult> {
        let mut state = ty.lock_state()?;
        if is_default && *state != MappingState::Unmapped {
            return Ok(ApplyResult::DefaultUnnecessary);
        }

        let current = ty.chain();
        if current
            .iter()
            .any(|entry| !entry.is_default() && entry.same_mapping(backend, args))
        {
            tracing::debug!(
                "Backend '{}' ({}) already mapped for type '{}'",
                backend,
                args,
                ty.name()
            );
            return Ok(ApplyResult::Duplicate);
        }

        let factory = self.registry.factory(backend)?;
        let context = OpenContext {
            instance: &self.name,
            type_name: ty.name(),
            config: self.registry.config(),
        };
        let opened = factory
            .open(&context, &BackendArgs::parse(args))
            .map_err(|err| {
                tracing::warn!(
                    "Backend '{}' failed to open for type '{}': {}",
                    backend,
                    ty.name(),
                    err
                );
                SorceryError::BackendOpen {
                    backend: backend.to_string(),
                    type_name: ty.name().to_string(),
                    reason: err.to_string(),
                }
            })?;
        let entry = Arc::new(MappedBackend::new(backend, args, caching, is_default, opened));

        let mut chain = Vec::clone(&current);
        if *state == MappingState::DefaultApplied {
            for default in chain.iter().filter(|entry| entry.is_default()) {
                default.backend().close();
            }
            chain.retain(|entry| !entry.is_default());
        }
        match position {
            Some(position) => chain.insert(position.min(chain.len()), entry),
            None => chain.push(entry),
        }
        ty.store_chain(chain);

        *state = match *state {
            _ if is_default => MappingState::DefaultApplied,
            MappingState::Loaded => MappingState::Loaded,
            _ => MappingState::Mapped,
        };
        drop(state);

        tracing::debug!(
            "Mapped backend '{}' ({}) for type '{}' on '{}'{}",
            backend,
            args,
            ty.name(),
            self.name,
            if caching { " as cache" } else { "" }
        );
        self.observers
            .notify(|o| o.wizard_mapped(&self.name, ty.name(), backend, args));
        Ok(ApplyResult::Success)
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    /// Allocates a blank object with field defaults applied. A random UUID
    /// is used when `id` is `None`.
    pub fn alloc(&self, type_name: &str, id: Option<&str>) -> Result<Box<dyn SorceryObject>> {
        let ty = self.object_type(type_name)?;
        match id {
            Some(id) => ty.alloc(id),
            None => ty.alloc(&uuid::Uuid::new_v4().to_string()),
        }
    }

    /// [`Sorcery::alloc`] returning the concrete type.
    pub fn alloc_as<T: SorceryObject>(&self, type_name: &str, id: Option<&str>) -> Result<Box<T>> {
        downcast_box::<T>(self.alloc(type_name, id)?).map_err(|object| mismatch::<T>(&*object))
    }

    /// Exclusively owned copy of a shared object, for copy-then-update.
    pub fn copy(&self, object: &dyn SorceryObject) -> Result<Box<dyn SorceryObject>> {
        self.object_type(object.details().type_name())?.copy(object)
    }

    /// [`Sorcery::copy`] returning the concrete type.
    pub fn copy_as<T: SorceryObject>(&self, object: &dyn SorceryObject) -> Result<Box<T>> {
        downcast_box::<T>(self.copy(object)?).map_err(|object| mismatch::<T>(&*object))
    }

    /// Serializes an object to an object set.
    pub fn create_object_set(
        &self,
        object: &dyn SorceryObject,
        preference: HandlerPreference,
    ) -> Result<ObjectSet> {
        self.object_type(object.details().type_name())?
            .create_object_set(object, preference)
    }

    /// Serializes an object to a JSON object of field names to strings.
    pub fn object_set_json(&self, object: &dyn SorceryObject) -> Result<serde_json::Value> {
        Ok(self
            .create_object_set(object, HandlerPreference::PreferList)?
            .to_json())
    }

    /// Applies an object set to an object. See
    /// [`ObjectType::apply_object_set`] for the partial failure contract.
    pub fn apply_object_set(&self, object: &mut dyn SorceryObject, set: &ObjectSet) -> Result<()> {
        self.object_type(object.details().type_name())?
            .apply_object_set(object, set)
    }

    /// Applies every field default to `object`.
    pub fn set_defaults(&self, object: &mut dyn SorceryObject) -> Result<()> {
        self.object_type(object.details().type_name())?
            .set_defaults(object)
    }

    /// Fields that differ between two objects of the same type.
    pub fn diff(
        &self,
        original: &dyn SorceryObject,
        modified: &dyn SorceryObject,
    ) -> Result<Option<ObjectSet>> {
        if original.details().type_name() != modified.details().type_name() {
            return Err(SorceryError::TypeMismatch {
                expected: original.details().type_name().to_string(),
                got: modified.details().type_name().to_string(),
            });
        }
        self.object_type(original.details().type_name())?
            .diff(original, modified)
    }

    // ------------------------------------------------------------------
    // Chain operations
    // ------------------------------------------------------------------

    fn mapped_type(&self, type_name: &str) -> Result<(Arc<ObjectType>, Arc<Vec<Arc<MappedBackend>>>)> {
        let ty = self.object_type(type_name)?;
        let chain = ty.chain();
        if chain.is_empty() {
            return Err(SorceryError::NoMapping(type_name.to_string()));
        }
        Ok((ty, chain))
    }

    /// Persists a new object.
    ///
    /// Non-caching backends are tried in order and the first that accepts
    /// the object wins; every caching backend then receives it too.
    pub fn create(&self, object: &ObjectRef) -> Result<()> {
        let (ty, chain) = self.mapped_type(object.details().type_name())?;

        let mut last_error = None;
        let mut created = false;
        for entry in chain.iter().filter(|entry| !entry.is_caching()) {
            match entry.backend().create(&ty, object) {
                Ok(()) => {
                    created = true;
                    break;
                }
                Err(err) => {
                    tracing::debug!(
                        "Backend '{}' refused create of '{}': {}",
                        entry.backend_name(),
                        object.details().id(),
                        err
                    );
                    last_error = Some(err);
                }
            }
        }
        if !created {
            return Err(last_error.unwrap_or_else(|| SorceryError::NoMapping(ty.name().to_string())));
        }

        push_to_caches(&ty, &chain, object);
        ty.observers.notify(|o| o.created(object));
        Ok(())
    }

    /// First object with `id` along the chain. A hit from a non-caching
    /// backend is pushed into the caching backends.
    pub fn retrieve_by_id(&self, type_name: &str, id: &str) -> Result<Option<ObjectRef>> {
        let (ty, chain) = self.mapped_type(type_name)?;
        Ok(first_hit(&ty, &chain, |backend| backend.retrieve_id(&ty, id)))
    }

    /// First object whose fields match every pair of `fields`.
    pub fn retrieve_by_fields(
        &self,
        type_name: &str,
        fields: &ObjectSet,
    ) -> Result<Option<ObjectRef>> {
        let (ty, chain) = self.mapped_type(type_name)?;
        Ok(first_hit(&ty, &chain, |backend| {
            backend.retrieve_fields(&ty, fields)
        }))
    }

    /// Objects matching `fields` (all objects for `None`), collected along
    /// the chain until a caching backend answers.
    pub fn retrieve_multiple(
        &self,
        type_name: &str,
        fields: Option<&ObjectSet>,
    ) -> Result<Vec<ObjectRef>> {
        let (ty, chain) = self.mapped_type(type_name)?;
        Ok(union_hits(&ty, &chain, |backend| {
            backend.retrieve_multiple(&ty, fields)
        }))
    }

    /// Objects whose id matches the regular expression `pattern`.
    pub fn retrieve_by_regex(&self, type_name: &str, pattern: &str) -> Result<Vec<ObjectRef>> {
        Regex::new(pattern).map_err(|e| SorceryError::invalid_regex(pattern, e))?;
        let (ty, chain) = self.mapped_type(type_name)?;
        Ok(union_hits(&ty, &chain, |backend| {
            backend.retrieve_regex(&ty, pattern)
        }))
    }

    /// Objects whose id starts with `prefix`.
    pub fn retrieve_by_prefix(&self, type_name: &str, prefix: &str) -> Result<Vec<ObjectRef>> {
        let (ty, chain) = self.mapped_type(type_name)?;
        Ok(union_hits(&ty, &chain, |backend| {
            backend.retrieve_prefix(&ty, prefix)
        }))
    }

    /// Replaces an existing object; never creates one.
    pub fn update(&self, object: &ObjectRef) -> Result<()> {
        let (ty, chain) = self.mapped_type(object.details().type_name())?;
        write_through(&ty, &chain, object, "update", |backend| {
            backend.update(&ty, object)
        })?;
        ty.observers.notify(|o| o.updated(object));
        Ok(())
    }

    /// Removes an existing object.
    pub fn delete(&self, object: &ObjectRef) -> Result<()> {
        let (ty, chain) = self.mapped_type(object.details().type_name())?;
        write_through(&ty, &chain, object, "delete", |backend| {
            backend.delete(&ty, object)
        })?;
        ty.observers.notify(|o| o.deleted(object));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Load and reload
    // ------------------------------------------------------------------

    /// Loads every type's backends.
    pub fn load(&self) -> Result<()> {
        self.load_all(LoadKind::Load)
    }

    /// Reloads every reloadable type's backends.
    pub fn reload(&self) -> Result<()> {
        self.load_all(LoadKind::Reload)
    }

    /// Reloads every reloadable type even where backends see no change.
    pub fn force_reload(&self) -> Result<()> {
        self.load_all(LoadKind::ForceReload)
    }

    /// Loads the backends of one type.
    pub fn load_object(&self, type_name: &str) -> Result<()> {
        let ty = self.object_type(type_name)?;
        self.load_type(&ty, LoadKind::Load)
    }

    /// Reloads the backends of one type.
    pub fn reload_object(&self, type_name: &str) -> Result<()> {
        let ty = self.object_type(type_name)?;
        self.load_type(&ty, LoadKind::Reload)
    }

    /// Force-reloads the backends of one type.
    pub fn force_reload_object(&self, type_name: &str) -> Result<()> {
        let ty = self.object_type(type_name)?;
        self.load_type(&ty, LoadKind::ForceReload)
    }

    fn load_all(&self, kind: LoadKind) -> Result<()> {
        let reloaded = kind.reloaded();
        self.observers
            .notify(|o| o.instance_loading(&self.name, reloaded));
        for ty in self.all_types()? {
            self.load_type(&ty, kind)?;
        }
        self.observers
            .notify(|o| o.instance_loaded(&self.name, reloaded));
        Ok(())
    }

    fn load_type(&self, ty: &ObjectType, kind: LoadKind) -> Result<()> {
        let reloaded = kind.reloaded();
        if reloaded && !ty.is_reloadable() {
            tracing::info!(
                "Type '{}' on '{}' is not reloadable, keeping current objects",
                ty.name(),
                self.name
            );
            return Ok(());
        }

        let chain = ty.chain();
        self.observers
            .notify(|o| o.object_type_loading(&self.name, ty.name(), reloaded));

        for entry in chain.iter() {
            let wizard_observers = self.registry.wizard_observer_list(entry.backend_name()).ok();
            if let Some(observers) = &wizard_observers {
                observers.notify(|o| o.wizard_loading(entry.backend_name(), ty.name(), reloaded));
            }

            let backend = entry.backend();
            let outcome = match kind {
                LoadKind::Load => backend.load(ty),
                LoadKind::Reload => backend.reload(ty),
                LoadKind::ForceReload => backend.force_reload(ty),
            };
            if let Err(err) = outcome {
                tracing::error!(
                    "Backend '{}' failed to load type '{}': {}",
                    entry.backend_name(),
                    ty.name(),
                    err
                );
            }

            if let Some(observers) = &wizard_observers {
                observers.notify(|o| o.wizard_loaded(entry.backend_name(), ty.name(), reloaded));
            }
        }

        if !chain.is_empty() {
            *ty.lock_state()? = MappingState::Loaded;
        }
        ty.observers.notify(|o| o.loaded(ty.name()));
        self.observers
            .notify(|o| o.object_type_loaded(&self.name, ty.name(), reloaded));
        Ok(())
    }
}

fn mismatch<T>(object: &dyn SorceryObject) -> SorceryError {
    SorceryError::TypeMismatch {
        expected: std::any::type_name::<T>().to_string(),
        got: object.details().type_name().to_string(),
    }
}

/// Stores `object` in every caching backend, ignoring refusals.
fn push_to_caches(ty: &ObjectType, chain: &[Arc<MappedBackend>], object: &ObjectRef) {
    for cache in chain.iter().filter(|entry| entry.is_caching()) {
        if let Err(err) = cache.backend().create(ty, object) {
            tracing::debug!(
                "Cache '{}' did not take '{}': {}",
                cache.backend_name(),
                object.details().id(),
                err
            );
        }
    }
}

/// Single-object lookups: the first hit along the chain. Hits from
/// non-caching backends are pushed into the caches; a stale cache hit is
/// refreshed from the non-caching backends.
fn first_hit(
    ty: &ObjectType,
    chain: &[Arc<MappedBackend>],
    mut lookup: impl FnMut(&dyn crate::backend::Backend) -> Result<Option<ObjectRef>>,
) -> Option<ObjectRef> {
    for entry in chain {
        match lookup(entry.backend()) {
            Ok(Some(object)) => {
                if !entry.is_caching() {
                    push_to_caches(ty, chain, &object);
                    return Some(object);
                }
                if entry.backend().is_stale(ty, &object) {
                    return Some(refresh_stale(ty, chain, entry, object, &mut lookup));
                }
                return Some(object);
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(
                "Backend '{}' lookup on type '{}' failed: {}",
                entry.backend_name(),
                ty.name(),
                err
            ),
        }
    }
    None
}

/// Repeats `lookup` on the non-caching backends for a stale hit from
/// `cache`. A fresh copy replaces the stale one in the caches; an
/// object no backend has any more is dropped from that cache and served
/// one last time.
fn refresh_stale(
    ty: &ObjectType,
    chain: &[Arc<MappedBackend>],
    cache: &MappedBackend,
    stale: ObjectRef,
    lookup: &mut impl FnMut(&dyn crate::backend::Backend) -> Result<Option<ObjectRef>>,
) -> ObjectRef {
    tracing::debug!(
        "Refreshing stale cached object '{}' of type '{}'",
        stale.details().id(),
        ty.name()
    );
    for entry in chain.iter().filter(|entry| !entry.is_caching()) {
        match lookup(entry.backend()) {
            Ok(Some(fresh)) => {
                push_to_caches(ty, chain, &fresh);
                return fresh;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(
                    "Backend '{}' refresh on type '{}' failed: {}",
                    entry.backend_name(),
                    ty.name(),
                    err
                );
                return stale;
            }
        }
    }
    if let Err(err) = cache.backend().delete(ty, &stale) {
        tracing::debug!("Cache '{}' kept '{}': {}", cache.backend_name(), stale.details().id(), err);
    }
    stale
}

/// Fills every caching backend that wants the complete set of `ty` from
/// the non-caching backends. A failing source leaves the caches unfilled.
fn fill_caches(ty: &ObjectType, chain: &[Arc<MappedBackend>]) {
    let wanting: Vec<&Arc<MappedBackend>> = chain
        .iter()
        .filter(|entry| entry.is_caching() && entry.backend().needs_full_set(ty))
        .collect();
    if wanting.is_empty() {
        return;
    }

    let mut objects = Vec::new();
    for entry in chain.iter().filter(|entry| !entry.is_caching()) {
        match entry.backend().retrieve_multiple(ty, None) {
            Ok(found) => objects.extend(found),
            Err(SorceryError::Unsupported { .. }) => {}
            Err(err) => {
                tracing::warn!(
                    "Not filling caches of type '{}': backend '{}' failed: {}",
                    ty.name(),
                    entry.backend_name(),
                    err
                );
                return;
            }
        }
    }

    for cache in wanting {
        match cache.backend().fill(ty, &objects) {
            Ok(()) => tracing::debug!(
                "Filled cache '{}' of type '{}' with {} objects",
                cache.backend_name(),
                ty.name(),
                objects.len()
            ),
            Err(err) => tracing::warn!("Cache '{}' refused fill: {}", cache.backend_name(), err),
        }
    }
}

/// Multi-object lookups: results are collected along the chain and the
/// walk stops at the first caching backend with a non-empty answer.
fn union_hits(
    ty: &ObjectType,
    chain: &[Arc<MappedBackend>],
    mut lookup: impl FnMut(&dyn crate::backend::Backend) -> Result<Vec<ObjectRef>>,
) -> Vec<ObjectRef> {
    fill_caches(ty, chain);

    let mut objects = Vec::new();
    for entry in chain {
        match lookup(entry.backend()) {
            Ok(found) => {
                let answered = entry.is_caching() && !found.is_empty();
                if answered {
                    // the cache holds the complete set
                    return found;
                }
                objects.extend(found);
            }
            Err(SorceryError::Unsupported { operation, .. }) => tracing::debug!(
                "Backend '{}' does not support {}",
                entry.backend_name(),
                operation
            ),
            Err(err) => tracing::warn!("Backend '{}' lookup failed: {}", entry.backend_name(), err),
        }
    }
    objects
}

/// Update/delete: the first non-caching backend that succeeds wins, then
/// the caching backends follow.
fn write_through(
    ty: &ObjectType,
    chain: &[Arc<MappedBackend>],
    object: &ObjectRef,
    operation: &str,
    mut write: impl FnMut(&dyn crate::backend::Backend) -> Result<()>,
) -> Result<()> {
    let written = chain
        .iter()
        .filter(|entry| !entry.is_caching())
        .any(|entry| match write(entry.backend()) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(
                    "Backend '{}' refused {} of '{}': {}",
                    entry.backend_name(),
                    operation,
                    object.details().id(),
                    err
                );
                false
            }
        });
    if !written {
        return Err(SorceryError::NotFound {
            type_name: ty.name().to_string(),
            id: object.details().id().to_string(),
        });
    }

    for cache in chain.iter().filter(|entry| entry.is_caching()) {
        if let Err(err) = write(cache.backend()) {
            tracing::debug!(
                "Cache '{}' {} of '{}' skipped: {}",
                cache.backend_name(),
                operation,
                object.details().id(),
                err
            );
        }
    }
    Ok(())
}

impl Drop for Sorcery {
    fn drop(&mut self) {
        tracing::debug!("Destroying instance '{}'", self.name);
        self.registry
            .global_observers()
            .notify(|o| o.instance_destroying(&self.name));

        if let Ok(types) = self.types.read() {
            for ty in types.values() {
                for entry in ty.chain().iter() {
                    entry.backend().close();
                }
            }
        }
        self.registry.forget_instance(&self.name);
    }
}

impl std::fmt::Debug for Sorcery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sorcery")
            .field("name", &self.name)
            .field("types", &self.type_names(true))
            .finish()
    }
}
