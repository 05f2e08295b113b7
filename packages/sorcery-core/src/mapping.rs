//! Backend chain entries and mapping states.

use std::fmt;

use crate::backend::Backend;

/// Outcome of a mapping request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    /// The backend was added to the chain.
    Success,
    /// The same backend and arguments were already mapped; nothing changed.
    Duplicate,
    /// A default was requested but the type already has a mapping.
    DefaultUnnecessary,
    /// No mapping configuration exists for the requested section.
    NoConfiguration,
}

/// Mapping state of one object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingState {
    /// No backend mapped.
    Unmapped,
    /// Only the fallback backend from `apply_default` is mapped.
    DefaultApplied,
    /// One or more explicit backends are mapped.
    Mapped,
    /// Mapped backends have been loaded at least once.
    Loaded,
}

/// One entry of a type's backend chain.
pub struct MappedBackend {
    backend_name: String,
    args: String,
    caching: bool,
    is_default: bool,
    backend: Box<dyn Backend>,
}

impl MappedBackend {
    pub(crate) fn new(
        backend_name: &str,
        args: &str,
        caching: bool,
        is_default: bool,
        backend: Box<dyn Backend>,
    ) -> Self {
        Self {
            backend_name: backend_name.to_string(),
            args: args.to_string(),
            caching,
            is_default,
            backend,
        }
    }

    /// Name of the backend kind.
    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    /// Arguments the backend was opened with.
    pub fn args(&self) -> &str {
        &self.args
    }

    /// Whether the entry answers lookups from its own copy.
    pub fn is_caching(&self) -> bool {
        self.caching
    }

    /// Whether the entry came from `apply_default`.
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// The opened backend.
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub(crate) fn same_mapping(&self, backend_name: &str, args: &str) -> bool {
        self.backend_name == backend_name && self.args == args
    }
}

impl fmt::Debug for MappedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedBackend")
            .field("backend", &self.backend_name)
            .field("args", &self.args)
            .field("caching", &self.caching)
            .field("default", &self.is_default)
            .finish()
    }
}

/// One line of a mapping section: `type[/cache] = backend[,args]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingDirective {
    pub type_name: String,
    pub backend: String,
    pub args: String,
    pub caching: bool,
}

impl MappingDirective {
    /// Parses one mapping pair. Returns `None` for malformed pairs.
    pub fn parse(name: &str, value: &str) -> Option<Self> {
        let (type_name, options) = match name.split_once('/') {
            Some((type_name, options)) => (type_name.trim(), options),
            None => (name.trim(), ""),
        };
        let caching = options
            .split(',')
            .map(str::trim)
            .any(|option| option.eq_ignore_ascii_case("cache"));

        let (backend, args) = match value.split_once(',') {
            Some((backend, args)) => (backend.trim(), args.trim()),
            None => (value.trim(), ""),
        };

        if type_name.is_empty() || backend.is_empty() {
            return None;
        }
        Some(Self {
            type_name: type_name.to_string(),
            backend: backend.to_string(),
            args: args.to_string(),
            caching,
        })
    }
}
