//! Object type registry entries.

mod spec;

use std::any::TypeId;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use arc_swap::ArcSwap;

use crate::error::{Result, SorceryError};
use crate::fields::{extended_fields_descriptor, FieldDescriptor, HandlerPreference};
use crate::mapping::{MappedBackend, MappingState};
use crate::object::{assign_details, ObjectRef, SorceryObject};
use crate::objectset::{changeset, ObjectSet};
use crate::observer::{ObjectObserver, ObserverList};

pub use spec::TypeSpec;
pub(crate) use spec::{erase_copy, erase_diff};
use spec::{AllocFn, ApplyFn, CopyFn, DiffFn, TransformFn};

/// A registered object type: allocator, callbacks, fields and backend chain.
///
/// Backends receive the type on every call so they can allocate objects and
/// translate them to and from object sets.
pub struct ObjectType {
    name: String,
    hidden: bool,
    reloadable: bool,
    rust_type: TypeId,
    rust_type_name: &'static str,
    alloc: AllocFn,
    transform: Option<TransformFn>,
    apply: Option<ApplyFn>,
    copy: RwLock<Option<CopyFn>>,
    diff: RwLock<Option<DiffFn>>,
    /// Exact and regex fields in registration order
    fields: RwLock<Vec<Arc<FieldDescriptor>>>,
    pub(crate) observers: ObserverList<dyn ObjectObserver>,
    /// Backend chain, replaced as a whole on every mapping change
    chain: ArcSwap<Vec<Arc<MappedBackend>>>,
    /// Serializes mapping changes
    state: Mutex<MappingState>,
}

impl ObjectType {
    pub(crate) fn from_spec<T: SorceryObject>(spec: TypeSpec<T>) -> Self {
        let name = spec.name.clone();
        let hidden = spec.hidden;
        let reloadable = spec.reloadable;
        let (alloc, transform, apply) = spec.into_parts();
        Self {
            name,
            hidden,
            reloadable,
            rust_type: TypeId::of::<T>(),
            rust_type_name: std::any::type_name::<T>(),
            alloc,
            transform,
            apply,
            copy: RwLock::new(None),
            diff: RwLock::new(None),
            fields: RwLock::new(vec![Arc::new(extended_fields_descriptor())]),
            observers: ObserverList::new(),
            chain: ArcSwap::from_pointee(Vec::new()),
            state: Mutex::new(MappingState::Unmapped),
        }
    }

    /// Type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_reloadable(&self) -> bool {
        self.reloadable
    }

    /// Checks that `T` is the Rust type this object type allocates.
    pub(crate) fn check_rust_type<T: 'static>(&self) -> Result<()> {
        if self.rust_type == TypeId::of::<T>() {
            Ok(())
        } else {
            Err(SorceryError::TypeMismatch {
                expected: self.rust_type_name.to_string(),
                got: std::any::type_name::<T>().to_string(),
            })
        }
    }

    fn check_object(&self, object: &dyn SorceryObject) -> Result<()> {
        if object.details().type_name() == self.name {
            Ok(())
        } else {
            Err(SorceryError::TypeMismatch {
                expected: self.name.clone(),
                got: object.details().type_name().to_string(),
            })
        }
    }

    /// Snapshot of the registered fields.
    pub fn fields(&self) -> Result<Vec<Arc<FieldDescriptor>>> {
        let fields = self.fields.read().map_err(|_| SorceryError::LockPoisoned)?;
        Ok(fields.clone())
    }

    /// Descriptor owning `name`: the exact field first, else the first
    /// matching regex field.
    pub fn field_for(&self, name: &str) -> Result<Option<Arc<FieldDescriptor>>> {
        let fields = self.fields.read().map_err(|_| SorceryError::LockPoisoned)?;
        Ok(find_field(&fields, name).cloned())
    }

    /// Whether any exact or regex field accepts `name`.
    pub fn is_field_registered(&self, name: &str) -> bool {
        matches!(self.field_for(name), Ok(Some(_)))
    }

    /// Adds a field after checking its name and default.
    pub(crate) fn add_field(&self, descriptor: FieldDescriptor) -> Result<()> {
        let refuse = |reason: &str| SorceryError::FieldRegistration {
            type_name: self.name.clone(),
            field: descriptor.name().to_string(),
            reason: reason.to_string(),
        };

        if descriptor.name() == "id" {
            return Err(refuse("'id' is reserved for the object id"));
        }

        let mut fields = self.fields.write().map_err(|_| SorceryError::LockPoisoned)?;
        if fields
            .iter()
            .any(|f| f.is_regex() == descriptor.is_regex() && f.name() == descriptor.name())
        {
            return Err(refuse("already registered"));
        }

        let mut blank = (self.alloc)("");
        if let Err(err) = descriptor.apply_default(blank.as_mut()) {
            return Err(refuse(&format!("default value rejected: {}", err)));
        }

        tracing::debug!(
            "Registered {} field '{}' on type '{}'",
            descriptor.kind(),
            descriptor.name(),
            self.name
        );
        fields.push(Arc::new(descriptor));
        Ok(())
    }

    pub(crate) fn set_copy_handler(&self, copy: CopyFn) -> Result<()> {
        *self.copy.write().map_err(|_| SorceryError::LockPoisoned)? = Some(copy);
        Ok(())
    }

    pub(crate) fn set_diff_handler(&self, diff: DiffFn) -> Result<()> {
        *self.diff.write().map_err(|_| SorceryError::LockPoisoned)? = Some(diff);
        Ok(())
    }

    /// Allocates a blank object with `id` and applies field defaults.
    pub fn alloc(&self, id: &str) -> Result<Box<dyn SorceryObject>> {
        let mut object = self.alloc_blank(id);
        self.set_defaults(object.as_mut())?;
        Ok(object)
    }

    /// Allocates an object with `id` as the allocator leaves it, without
    /// field defaults.
    fn alloc_blank(&self, id: &str) -> Box<dyn SorceryObject> {
        let mut object = (self.alloc)(id);
        assign_details(object.as_mut(), &self.name, id);
        object
    }

    /// Fails when a handler replaced the id or type of `object`, which
    /// must still be `id` of this type.
    fn check_identity(&self, object: &dyn SorceryObject, id: &str) -> Result<()> {
        let details = object.details();
        if details.id() == id && details.type_name() == self.name {
            return Ok(());
        }
        Err(SorceryError::IdentityChanged {
            type_name: self.name.clone(),
            expected: id.to_string(),
            got: format!("{}/{}", details.type_name(), details.id()),
        })
    }

    /// Applies the default of every field that has a non-empty one.
    pub fn set_defaults(&self, object: &mut dyn SorceryObject) -> Result<()> {
        for field in self.fields()? {
            field
                .apply_default(object)
                .map_err(|source| SorceryError::FieldParse {
                    id: object.details().id().to_string(),
                    field: field.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Applies every pair of `set` to `object`, then runs the type's apply
    /// callback.
    ///
    /// Not atomic: on error the object may be partially modified and must
    /// be discarded. Handlers may not change the object's id or type.
    pub fn apply_object_set(&self, object: &mut dyn SorceryObject, set: &ObjectSet) -> Result<()> {
        self.check_object(object)?;
        let id = object.details().id().to_string();

        let transformed = self.transform.as_ref().and_then(|transform| transform(set));
        let set = transformed.as_ref().unwrap_or(set);
        let fields = self.fields()?;

        for (name, value) in set.iter() {
            let field = find_field(&fields, name).ok_or_else(|| SorceryError::UnknownField {
                type_name: self.name.clone(),
                field: name.to_string(),
            })?;
            field
                .apply(object, name, value)
                .map_err(|source| SorceryError::FieldParse {
                    id: object.details().id().to_string(),
                    field: name.to_string(),
                    source,
                })?;
        }

        if let Some(apply) = &self.apply {
            apply(object)?;
        }
        self.check_identity(object, &id)
    }

    /// Serializes `object` through its registered fields.
    pub fn create_object_set(
        &self,
        object: &dyn SorceryObject,
        preference: HandlerPreference,
    ) -> Result<ObjectSet> {
        self.check_object(object)?;
        let mut set = ObjectSet::new();
        for field in self.fields()? {
            field
                .serialize(object, preference, &mut set)
                .map_err(|source| SorceryError::FieldParse {
                    id: object.details().id().to_string(),
                    field: field.name().to_string(),
                    source,
                })?;
        }
        Ok(set)
    }

    /// Builds a shared object from `id` and an object set, on top of the
    /// field defaults.
    pub fn object_from_set(&self, id: &str, set: &ObjectSet) -> Result<ObjectRef> {
        let mut object = self.alloc(id)?;
        self.apply_object_set(object.as_mut(), set)?;
        Ok(Arc::from(object))
    }

    /// Rebuilds a shared object from a complete object set, as produced by
    /// [`ObjectType::create_object_set`]. Defaults are not applied, so list
    /// fields hold exactly the stored entries.
    pub fn object_from_complete_set(&self, id: &str, set: &ObjectSet) -> Result<ObjectRef> {
        let mut object = self.alloc_blank(id);
        self.apply_object_set(object.as_mut(), set)?;
        Ok(Arc::from(object))
    }

    /// Exclusively owned copy of `object`, through the copy handler when one
    /// is set, else by applying the object's own object set to a fresh
    /// allocation without defaults.
    pub fn copy(&self, object: &dyn SorceryObject) -> Result<Box<dyn SorceryObject>> {
        self.check_object(object)?;
        let id = object.details().id();

        let handler = self
            .copy
            .read()
            .map_err(|_| SorceryError::LockPoisoned)?
            .clone();
        let copy = match handler {
            Some(handler) => {
                let mut copy = self.alloc(id)?;
                *copy.details_mut() = object.details().clone();
                handler(object, copy.as_mut())?;
                copy
            }
            None => {
                // list fields append, so defaults would be applied twice
                let mut copy = self.alloc_blank(id);
                *copy.details_mut() = object.details().clone();
                let set = self.create_object_set(object, HandlerPreference::PreferList)?;
                self.apply_object_set(copy.as_mut(), &set)?;
                copy
            }
        };
        self.check_identity(copy.as_ref(), id)?;
        Ok(copy)
    }

    /// Changed fields between two objects of this type, through the diff
    /// handler when one is set.
    ///
    /// # Returns
    /// `None` when nothing differs.
    pub fn diff(
        &self,
        original: &dyn SorceryObject,
        modified: &dyn SorceryObject,
    ) -> Result<Option<ObjectSet>> {
        self.check_object(original)?;
        self.check_object(modified)?;

        let handler = self
            .diff
            .read()
            .map_err(|_| SorceryError::LockPoisoned)?
            .clone();
        if let Some(handler) = handler {
            return handler(original, modified);
        }

        let before = self.create_object_set(original, HandlerPreference::PreferList)?;
        let after = self.create_object_set(modified, HandlerPreference::PreferList)?;
        Ok(changeset(&before, &after))
    }

    /// Current backend chain.
    pub fn chain(&self) -> Arc<Vec<Arc<MappedBackend>>> {
        self.chain.load_full()
    }

    pub fn mapping_count(&self) -> usize {
        self.chain.load().len()
    }

    /// Chain entry at `index`.
    pub fn mapping(&self, index: usize) -> Option<Arc<MappedBackend>> {
        self.chain.load().get(index).cloned()
    }

    pub fn mapping_state(&self) -> Result<MappingState> {
        Ok(*self.lock_state()?)
    }

    pub(crate) fn lock_state(&self) -> Result<MutexGuard<'_, MappingState>> {
        self.state.lock().map_err(|_| SorceryError::LockPoisoned)
    }

    /// Replaces the chain. Callers hold the state lock.
    pub(crate) fn store_chain(&self, chain: Vec<Arc<MappedBackend>>) {
        self.chain.store(Arc::new(chain));
    }
}

fn find_field<'a>(
    fields: &'a [Arc<FieldDescriptor>],
    name: &str,
) -> Option<&'a Arc<FieldDescriptor>> {
    fields
        .iter()
        .find(|f| !f.is_regex() && f.name() == name)
        .or_else(|| fields.iter().find(|f| f.is_regex() && f.matches(name)))
}

impl fmt::Debug for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectType")
            .field("name", &self.name)
            .field("rust_type", &self.rust_type_name)
            .field("hidden", &self.hidden)
            .field("reloadable", &self.reloadable)
            .field("mappings", &self.mapping_count())
            .finish()
    }
}
