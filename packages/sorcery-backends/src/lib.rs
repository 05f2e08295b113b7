//! Storage backends for the sorcery data access layer.
//!
//! | name | module | stores |
//! |---|---|---|
//! | `config` | [`config_file`] | read-only objects from a structured text file |
//! | `kvstore` | [`kvstore`] | JSON encoded object sets in a namespaced key-value store |
//! | `realtime` | [`realtime`] | rows of a declared external table |
//! | `memory_cache` | [`memory_cache`] | bounded, expiring copies for cache chain entries |

pub mod config_file;
pub mod kvstore;
pub mod memory_cache;
mod pattern;
pub mod realtime;

use std::sync::Arc;

use sorcery_core::{Registry, Result};

pub use config_file::{ConfigFileBackend, ConfigFileFactory, ConfigFileOptions, Integrity};
pub use kvstore::{FileKvStore, KvBackend, KvStore, KvStoreFactory, MemoryKvStore};
pub use memory_cache::{MemoryCacheBackend, MemoryCacheFactory, MemoryCacheOptions};
pub use realtime::{InMemoryEngine, RealtimeBackend, RealtimeEngine, RealtimeFactory, RealtimeTables};

/// Runtime extension points of the backends registered by [`register_all`].
#[derive(Clone)]
pub struct BackendSet {
    /// Named stores available to `kvstore` mappings.
    pub kv: Arc<KvStoreFactory>,
    /// Tables available to `realtime` mappings.
    pub realtime: Arc<RealtimeTables>,
}

/// Registers every backend kind of this crate with `registry`.
///
/// # Returns
/// Handles for adding key-value stores and realtime tables later, or
/// `Err(SorceryError::BackendAlreadyRegistered)` if a name is taken.
pub fn register_all(registry: &Registry) -> Result<BackendSet> {
    let kv = Arc::new(KvStoreFactory::new());
    let tables = Arc::new(RealtimeTables::new());

    registry.register_backend(Arc::new(ConfigFileFactory))?;
    registry.register_backend(Arc::new(MemoryCacheFactory))?;
    registry.register_backend(kv.clone())?;
    registry.register_backend(Arc::new(RealtimeFactory::new(Arc::clone(&tables))))?;

    Ok(BackendSet {
        kv,
        realtime: tables,
    })
}
