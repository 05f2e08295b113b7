//! Backend keeping objects as JSON object sets in a key-value store.
//!
//! Rows live in the family `<namespace>/<type>`, keyed by the
//! percent-encoded object id. The value is the compact JSON form of the
//! object set.
//!
//! Mapping arguments: `<namespace>[,store=<name>]`.

mod store;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;
use sorcery_core::{
    Backend, BackendArgs, BackendFactory, HandlerPreference, ObjectRef, ObjectSet, ObjectType,
    OpenContext, Result, SorceryError,
};

use crate::pattern::literal_prefix;

pub use store::{FileKvStore, MemoryKvStore};

/// Namespaced string store.
///
/// Keys within a family are ordered so prefix scans are cheap.
pub trait KvStore: Send + Sync {
    fn get(&self, family: &str, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, overwriting any existing value.
    fn put(&self, family: &str, key: &str, value: &str) -> Result<()>;

    /// Overwrites an existing `key`. Returns `false` if it is absent.
    fn replace(&self, family: &str, key: &str, value: &str) -> Result<bool>;

    /// Returns `false` if `key` was absent.
    fn remove(&self, family: &str, key: &str) -> Result<bool>;

    /// Entries whose key starts with `prefix`, in key order.
    fn scan(&self, family: &str, prefix: &str) -> Result<Vec<(String, String)>>;
}

/// Characters escaped in keys: controls, the family separator, `%` itself,
/// and whitespace.
const KEY_ESCAPE: &AsciiSet = &CONTROLS.add(b'/').add(b'%').add(b' ').add(b'\t');

fn encode_key(id: &str) -> String {
    utf8_percent_encode(id, KEY_ESCAPE).to_string()
}

fn decode_key(key: &str) -> Result<String> {
    percent_decode_str(key)
        .decode_utf8()
        .map(|id| id.into_owned())
        .map_err(|e| SorceryError::Serialization(format!("bad key '{}': {}", key, e)))
}

/// One mapping onto a store family.
pub struct KvBackend {
    store: Arc<dyn KvStore>,
    family: String,
}

impl KvBackend {
    pub fn new(store: Arc<dyn KvStore>, namespace: &str, type_name: &str) -> Self {
        Self {
            store,
            family: format!("{}/{}", namespace, type_name),
        }
    }

    /// Store family holding this mapping's rows.
    pub fn family(&self) -> &str {
        &self.family
    }

    fn encode(ty: &ObjectType, object: &ObjectRef) -> Result<String> {
        let set = ty.create_object_set(object.as_ref(), HandlerPreference::PreferList)?;
        serde_json::to_string(&set).map_err(|e| SorceryError::Serialization(e.to_string()))
    }

    fn decode(&self, ty: &ObjectType, id: &str, value: &str) -> Result<ObjectRef> {
        let set: ObjectSet = serde_json::from_str(value).map_err(|e| {
            SorceryError::Serialization(format!("{} '{}': {}", self.family, id, e))
        })?;
        ty.object_from_complete_set(id, &set)
    }

    /// Decodes scanned rows, skipping ids rejected by `keep` and rows that
    /// no longer decode.
    fn collect(
        &self,
        ty: &ObjectType,
        rows: Vec<(String, String)>,
        mut keep: impl FnMut(&str, &ObjectSet) -> bool,
    ) -> Result<Vec<ObjectRef>> {
        let mut objects = Vec::new();
        for (key, value) in rows {
            let id = decode_key(&key)?;
            let set: ObjectSet = match serde_json::from_str(&value) {
                Ok(set) => set,
                Err(err) => {
                    tracing::warn!("Skipping undecodable row '{}' in {}: {}", id, self.family, err);
                    continue;
                }
            };
            if !keep(&id, &set) {
                continue;
            }
            match ty.object_from_complete_set(&id, &set) {
                Ok(object) => objects.push(object),
                Err(err) => {
                    tracing::warn!("Skipping row '{}' in {}: {}", id, self.family, err)
                }
            }
        }
        Ok(objects)
    }
}

impl Backend for KvBackend {
    fn name(&self) -> &str {
        "kvstore"
    }

    /// Writes the object, replacing a stored object with the same id.
    fn create(&self, ty: &ObjectType, object: &ObjectRef) -> Result<()> {
        let value = Self::encode(ty, object)?;
        self.store
            .put(&self.family, &encode_key(object.id()), &value)
    }

    fn retrieve_id(&self, ty: &ObjectType, id: &str) -> Result<Option<ObjectRef>> {
        match self.store.get(&self.family, &encode_key(id))? {
            Some(value) => self.decode(ty, id, &value).map(Some),
            None => Ok(None),
        }
    }

    fn retrieve_multiple(
        &self,
        ty: &ObjectType,
        fields: Option<&ObjectSet>,
    ) -> Result<Vec<ObjectRef>> {
        let rows = self.store.scan(&self.family, "")?;
        self.collect(ty, rows, |_, set| fields.map_or(true, |f| set.matches(f)))
    }

    fn retrieve_regex(&self, ty: &ObjectType, pattern: &str) -> Result<Vec<ObjectRef>> {
        let regex = Regex::new(pattern).map_err(|e| SorceryError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let prefix = literal_prefix(pattern).unwrap_or_default();
        tracing::debug!(
            "Regex '{}' on {} scans prefix '{}'",
            pattern,
            self.family,
            prefix
        );
        let rows = self.store.scan(&self.family, &encode_key(&prefix))?;
        self.collect(ty, rows, |id, _| regex.is_match(id))
    }

    fn retrieve_prefix(&self, ty: &ObjectType, prefix: &str) -> Result<Vec<ObjectRef>> {
        let rows = self.store.scan(&self.family, &encode_key(prefix))?;
        self.collect(ty, rows, |_, _| true)
    }

    fn update(&self, ty: &ObjectType, object: &ObjectRef) -> Result<()> {
        let value = Self::encode(ty, object)?;
        if !self
            .store
            .replace(&self.family, &encode_key(object.id()), &value)?
        {
            return Err(SorceryError::NotFound {
                type_name: ty.name().to_string(),
                id: object.id().to_string(),
            });
        }
        Ok(())
    }

    fn delete(&self, ty: &ObjectType, object: &ObjectRef) -> Result<()> {
        if !self.store.remove(&self.family, &encode_key(object.id()))? {
            return Err(SorceryError::NotFound {
                type_name: ty.name().to_string(),
                id: object.id().to_string(),
            });
        }
        Ok(())
    }
}

/// Factory for [`KvBackend`], registered as `kvstore`.
///
/// Holds the named stores mappings may select; `default` is an in-memory
/// store.
pub struct KvStoreFactory {
    stores: RwLock<HashMap<String, Arc<dyn KvStore>>>,
}

impl KvStoreFactory {
    pub const DEFAULT_STORE: &'static str = "default";

    pub fn new() -> Self {
        let mut stores: HashMap<String, Arc<dyn KvStore>> = HashMap::new();
        stores.insert(
            Self::DEFAULT_STORE.to_string(),
            Arc::new(MemoryKvStore::new()),
        );
        Self {
            stores: RwLock::new(stores),
        }
    }

    /// Makes `store` available as `name`, returning the store it replaces.
    pub fn add_store(&self, name: &str, store: Arc<dyn KvStore>) -> Option<Arc<dyn KvStore>> {
        tracing::debug!("Added kv store '{}'", name);
        self.stores.write().insert(name.to_string(), store)
    }

    pub fn store(&self, name: &str) -> Option<Arc<dyn KvStore>> {
        self.stores.read().get(name).cloned()
    }
}

impl Default for KvStoreFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendFactory for KvStoreFactory {
    fn name(&self) -> &str {
        "kvstore"
    }

    fn open(&self, context: &OpenContext<'_>, args: &BackendArgs) -> Result<Box<dyn Backend>> {
        let refuse = |reason: String| SorceryError::BackendOpen {
            backend: "kvstore".to_string(),
            type_name: context.type_name.to_string(),
            reason,
        };

        let namespace = args
            .first()
            .ok_or_else(|| refuse("a namespace is required".to_string()))?;
        let store_name = args.option("store").unwrap_or(Self::DEFAULT_STORE);
        let store = self
            .store(store_name)
            .ok_or_else(|| refuse(format!("unknown store '{}'", store_name)))?;

        let backend = KvBackend::new(store, namespace, context.type_name);
        tracing::debug!(
            "Opened kvstore '{}' family {}",
            store_name,
            backend.family()
        );
        Ok(Box::new(backend))
    }
}
