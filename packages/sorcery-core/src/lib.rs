//! Data access layer for typed configuration objects.
//!
//! Applications register object types and their fields on a [`Sorcery`]
//! instance, map each type to an ordered chain of storage backends, and then
//! create, retrieve, update and delete objects without knowing which backend
//! holds them. Objects cross the generic/native boundary as [`ObjectSet`]s.

pub mod backend;
pub mod conf;
pub mod config;
pub mod error;
pub mod fields;
pub mod io_utils;
pub mod mapping;
pub mod object;
pub mod objectset;
pub mod observer;
pub mod sorcery;
pub mod types;

pub use backend::{Backend, BackendArgs, BackendFactory, OpenContext, Registry};
pub use config::RegistryConfig;
pub use error::{Result, SorceryError};
pub use fields::{FieldKind, FieldSpec, HandlerPreference};
pub use mapping::{ApplyResult, MappingState};
pub use object::{ObjectDetails, ObjectRef, SorceryObject};
pub use objectset::{changeset, ObjectSet};
pub use sorcery::Sorcery;
pub use types::{ObjectType, TypeSpec};
