//! Storage provider contract.
//!
//! A backend kind registers a [`BackendFactory`] with the
//! [`Registry`](crate::Registry). Each mapping of an object type to that
//! kind opens one [`Backend`] instance, scoped to that type within one
//! instance.

pub mod memory;
mod registry;

use crate::config::RegistryConfig;
use crate::error::{Result, SorceryError};
use crate::object::ObjectRef;
use crate::objectset::ObjectSet;
use crate::types::ObjectType;

pub use registry::Registry;

/// One opened storage provider.
///
/// `create`, `retrieve_id`, `update` and `delete` are mandatory. The other
/// retrieval operations default to [`SorceryError::Unsupported`]; load and
/// reload default to doing nothing.
///
/// A non-empty multi-object answer from a backend mapped as a cache ends
/// the chain walk, so caching backends must answer those lookups only from
/// a complete copy of the type and return nothing otherwise.
pub trait Backend: Send + Sync {
    /// Backend kind name, used in errors and logs.
    fn name(&self) -> &str;

    /// Persists a new object. Fails with `ObjectExists` when the id is taken
    /// in stores that require uniqueness.
    fn create(&self, ty: &ObjectType, object: &ObjectRef) -> Result<()>;

    /// Looks up an object by id.
    fn retrieve_id(&self, ty: &ObjectType, id: &str) -> Result<Option<ObjectRef>>;

    /// First object whose object set matches every pair of `fields`.
    fn retrieve_fields(&self, ty: &ObjectType, fields: &ObjectSet) -> Result<Option<ObjectRef>> {
        Ok(self
            .retrieve_multiple(ty, Some(fields))?
            .into_iter()
            .next())
    }

    /// Every object matching `fields`, or all objects when `fields` is `None`.
    fn retrieve_multiple(
        &self,
        _ty: &ObjectType,
        _fields: Option<&ObjectSet>,
    ) -> Result<Vec<ObjectRef>> {
        Err(self.unsupported("retrieve_multiple"))
    }

    /// Every object whose id matches the regular expression `pattern`.
    fn retrieve_regex(&self, _ty: &ObjectType, _pattern: &str) -> Result<Vec<ObjectRef>> {
        Err(self.unsupported("retrieve_regex"))
    }

    /// Every object whose id starts with `prefix`.
    fn retrieve_prefix(&self, _ty: &ObjectType, _prefix: &str) -> Result<Vec<ObjectRef>> {
        Err(self.unsupported("retrieve_prefix"))
    }

    /// Replaces an existing object. Fails with `NotFound` when absent.
    fn update(&self, ty: &ObjectType, object: &ObjectRef) -> Result<()>;

    /// Removes an existing object. Fails with `NotFound` when absent.
    fn delete(&self, ty: &ObjectType, object: &ObjectRef) -> Result<()>;

    /// Pulls persistent state in at startup.
    fn load(&self, _ty: &ObjectType) -> Result<()> {
        Ok(())
    }

    /// Refreshes persistent state. Defaults to [`Backend::load`].
    fn reload(&self, ty: &ObjectType) -> Result<()> {
        self.load(ty)
    }

    /// Refreshes persistent state even if it appears unchanged.
    fn force_reload(&self, ty: &ObjectType) -> Result<()> {
        self.reload(ty)
    }

    /// Whether a cached `object` returned by this caching backend is old
    /// enough to be refreshed from the rest of the chain.
    fn is_stale(&self, _ty: &ObjectType, _object: &ObjectRef) -> bool {
        false
    }

    /// Whether this caching backend answers multi-object lookups from a
    /// complete copy that is currently missing. The chain then collects
    /// every object of the type and hands it to [`Backend::fill`].
    fn needs_full_set(&self, _ty: &ObjectType) -> bool {
        false
    }

    /// Replaces this caching backend's contents with `objects`, every
    /// object of the type.
    fn fill(&self, _ty: &ObjectType, _objects: &[ObjectRef]) -> Result<()> {
        Ok(())
    }

    /// Releases resources when the mapping goes away.
    fn close(&self) {}

    /// Error for operations this backend does not implement.
    fn unsupported(&self, operation: &'static str) -> SorceryError {
        SorceryError::Unsupported {
            backend: self.name().to_string(),
            operation,
        }
    }
}

/// Where a backend is being opened.
#[derive(Debug, Clone, Copy)]
pub struct OpenContext<'a> {
    /// Instance (module) name
    pub instance: &'a str,
    /// Object type being mapped
    pub type_name: &'a str,
    /// Registry wide configuration
    pub config: &'a RegistryConfig,
}

/// Constructor for one backend kind.
pub trait BackendFactory: Send + Sync {
    /// Name used in mappings.
    fn name(&self) -> &str;

    /// Opens a backend for one mapping.
    ///
    /// # Arguments
    /// * `context` - Instance and type the backend will serve
    /// * `args` - Parsed mapping arguments
    ///
    /// # Returns
    /// The opened backend, or an error describing why `args` were refused.
    fn open(&self, context: &OpenContext<'_>, args: &BackendArgs) -> Result<Box<dyn Backend>>;
}

/// Mapping arguments: comma separated positional values and `key=value`
/// options, split on the first `=` so option values may contain `=`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendArgs {
    raw: String,
    positional: Vec<String>,
    options: Vec<(String, String)>,
}

impl BackendArgs {
    pub fn parse(raw: &str) -> Self {
        let mut args = Self {
            raw: raw.to_string(),
            ..Default::default()
        };
        for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item.split_once('=') {
                Some((key, value)) => args
                    .options
                    .push((key.trim().to_string(), value.trim().to_string())),
                None => args.positional.push(item.to_string()),
            }
        }
        args
    }

    /// The string the arguments were parsed from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// First positional value.
    pub fn first(&self) -> Option<&str> {
        self.positional.first().map(String::as_str)
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    /// Last value given for option `key`.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Every value given for option `key`, in order.
    pub fn options_named<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.options
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// All options in order.
    pub fn options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
