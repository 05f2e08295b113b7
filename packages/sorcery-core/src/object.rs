//! Object model: identity details embedded in every stored object.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::objectset::ObjectSet;

/// Prefix marking extended (opaque, unregistered) field names.
pub const EXTENDED_PREFIX: char = '@';

/// Identity and bookkeeping carried by every object.
///
/// The id and type are assigned by the instance at allocation time and
/// cannot be changed afterwards.
#[derive(Debug, Clone, Default)]
pub struct ObjectDetails {
    id: String,
    type_name: String,
    created: Option<SystemTime>,
    extended: ObjectSet,
}

impl ObjectDetails {
    pub(crate) fn assign(type_name: &str, id: &str) -> Self {
        Self {
            id: id.to_string(),
            type_name: type_name.to_string(),
            created: Some(SystemTime::now()),
            extended: ObjectSet::new(),
        }
    }

    /// Unique identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Object type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Allocation time.
    pub fn created(&self) -> Option<SystemTime> {
        self.created
    }

    /// Extended field value, looked up without the `@` prefix.
    pub fn extended(&self, name: &str) -> Option<&str> {
        let name = name.strip_prefix(EXTENDED_PREFIX).unwrap_or(name);
        self.extended
            .iter()
            .find(|(n, _)| n.strip_prefix(EXTENDED_PREFIX) == Some(name))
            .map(|(_, v)| v)
    }

    /// Sets an extended field, replacing any previous value. The stored
    /// name always carries the `@` prefix.
    pub fn set_extended(&mut self, name: &str, value: &str) {
        let name = name.strip_prefix(EXTENDED_PREFIX).unwrap_or(name);
        let key = format!("{}{}", EXTENDED_PREFIX, name);
        self.extended.remove(&key);
        self.extended.push(key, value);
    }

    /// All extended fields with their `@` prefix.
    pub fn extended_fields(&self) -> &ObjectSet {
        &self.extended
    }
}

/// Upcast helpers implemented for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// A value managed by the data access layer.
///
/// Implementors embed an [`ObjectDetails`] and expose it; everything else
/// about the object is reached through registered fields.
pub trait SorceryObject: AsAny + Send + Sync + fmt::Debug {
    fn details(&self) -> &ObjectDetails;
    fn details_mut(&mut self) -> &mut ObjectDetails;
}

/// Shared, immutable handle to a stored object.
pub type ObjectRef = Arc<dyn SorceryObject>;

impl<'a> dyn SorceryObject + 'a {
    /// Object id.
    pub fn id(&self) -> &str {
        self.details().id()
    }

    /// Object type name.
    pub fn type_name(&self) -> &str {
        self.details().type_name()
    }

    /// Borrows the concrete object.
    pub fn downcast_ref<T: SorceryObject>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Mutably borrows the concrete object.
    pub fn downcast_mut<T: SorceryObject>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// Converts an owned object into its concrete type.
pub fn downcast_box<T: SorceryObject>(
    object: Box<dyn SorceryObject>,
) -> Result<Box<T>, Box<dyn SorceryObject>> {
    if (*object).as_any().is::<T>() {
        match object.into_any().downcast::<T>() {
            Ok(typed) => Ok(typed),
            Err(_) => unreachable!("type checked before downcast"),
        }
    } else {
        Err(object)
    }
}

/// Stamps identity onto a freshly allocated object.
pub(crate) fn assign_details(object: &mut dyn SorceryObject, type_name: &str, id: &str) {
    *object.details_mut() = ObjectDetails::assign(type_name, id);
}
