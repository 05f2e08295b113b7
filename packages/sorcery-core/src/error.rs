//! Data access layer error types.

use thiserror::Error;

use crate::conf::ConfError;
use crate::fields::FieldError;

/// Data access layer errors.
#[derive(Error, Debug, Clone)]
pub enum SorceryError {
    /// Object type has no registered allocator
    #[error("Object type '{type_name}' is not registered")]
    TypeNotRegistered { type_name: String },

    /// Object type registered twice
    #[error("Object type '{type_name}' already registered")]
    TypeAlreadyRegistered { type_name: String },

    /// Field could not be registered against a type
    #[error("Field '{field}' could not be registered on type '{type_name}': {reason}")]
    FieldRegistration {
        type_name: String,
        field: String,
        reason: String,
    },

    /// A field value failed its typed conversion
    #[error("Field '{field}' on object '{id}' rejected: {source}")]
    FieldParse {
        id: String,
        field: String,
        #[source]
        source: FieldError,
    },

    /// Object set names a field the type does not know about
    #[error("Unknown field '{field}' for type '{type_name}'")]
    UnknownField { type_name: String, field: String },

    /// Type level apply callback refused the object
    #[error("Object '{id}' of type '{type_name}' rejected by apply handler: {reason}")]
    ApplyRejected {
        type_name: String,
        id: String,
        reason: String,
    },

    /// A handler changed the id or type of the object it was filling in
    #[error("Object '{expected}' of type '{type_name}' became '{got}' while being applied")]
    IdentityChanged {
        type_name: String,
        expected: String,
        got: String,
    },

    /// Backend name not present in the registry
    #[error("Backend '{0}' not found")]
    BackendNotFound(String),

    /// Backend name registered twice
    #[error("Backend '{0}' already registered")]
    BackendAlreadyRegistered(String),

    /// Backend refused to open a mapping
    #[error("Backend '{backend}' failed to open for type '{type_name}': {reason}")]
    BackendOpen {
        backend: String,
        type_name: String,
        reason: String,
    },

    /// No mapping exists for an object type
    #[error("No backend mapped for type '{0}'")]
    NoMapping(String),

    /// Backend refused the contents it was asked to load
    #[error("Backend '{backend}' rejected its source: {reason}")]
    LoadRejected { backend: String, reason: String },

    /// Object already exists in a backend
    #[error("Object '{id}' of type '{type_name}' already exists")]
    ObjectExists { type_name: String, id: String },

    /// Object does not exist
    #[error("Object '{id}' of type '{type_name}' not found")]
    NotFound { type_name: String, id: String },

    /// Objects of different types passed where one type is required
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    /// Backend does not implement the operation
    #[error("Backend '{backend}' does not support {operation}")]
    Unsupported {
        backend: String,
        operation: &'static str,
    },

    /// Regular expression failed to compile
    #[error("Invalid regular expression '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    /// Structured text configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Transient I/O error that may succeed on retry
    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    /// Remote engine error
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Lock poisoned (RwLock poisoned)
    #[error("Lock poisoned")]
    LockPoisoned,
}

impl SorceryError {
    /// Returns `true` for errors reporting a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SorceryError::NotFound { .. })
    }

    /// Returns `true` for errors reporting a duplicate object.
    pub fn is_exists(&self) -> bool {
        matches!(self, SorceryError::ObjectExists { .. })
    }

    pub(crate) fn invalid_regex(pattern: &str, err: regex::Error) -> Self {
        SorceryError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Result alias for data access operations.
pub type Result<T> = std::result::Result<T, SorceryError>;
