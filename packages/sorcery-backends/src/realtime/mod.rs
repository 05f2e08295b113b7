//! Backend mapping a type onto a table of an external [`RealtimeEngine`].
//!
//! Tables are declared up front in [`RealtimeTables`]; a mapping names one.
//! Rows carry the object id in the `id` column followed by the single value
//! form of each field.
//!
//! Mapping arguments: `<table>`.

mod engine;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;
use sorcery_core::{
    Backend, BackendArgs, BackendFactory, HandlerPreference, ObjectRef, ObjectSet, ObjectType,
    OpenContext, Result, SorceryError,
};

use crate::pattern::literal_run;

pub use engine::{like_match, row_matches, InMemoryEngine, RealtimeEngine, LIKE_SUFFIX};

/// Column holding the object id.
pub const KEY_FIELD: &str = "id";

/// Declared tables and the engines serving them.
#[derive(Default)]
pub struct RealtimeTables {
    tables: RwLock<HashMap<String, Arc<dyn RealtimeEngine>>>,
}

impl RealtimeTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `table` from `engine`, replacing an earlier declaration.
    pub fn declare(&self, table: &str, engine: Arc<dyn RealtimeEngine>) {
        tracing::debug!("Declared realtime table '{}'", table);
        self.tables.write().insert(table.to_string(), engine);
    }

    /// Returns `false` if the table was not declared.
    pub fn undeclare(&self, table: &str) -> bool {
        self.tables.write().remove(table).is_some()
    }

    pub fn engine(&self, table: &str) -> Option<Arc<dyn RealtimeEngine>> {
        self.tables.read().get(table).cloned()
    }

    pub fn is_declared(&self, table: &str) -> bool {
        self.tables.read().contains_key(table)
    }
}

/// One mapping onto a realtime table.
pub struct RealtimeBackend {
    engine: Arc<dyn RealtimeEngine>,
    table: String,
}

impl RealtimeBackend {
    pub fn new(engine: Arc<dyn RealtimeEngine>, table: &str) -> Self {
        Self {
            engine,
            table: table.to_string(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn to_row(ty: &ObjectType, object: &ObjectRef) -> Result<ObjectSet> {
        let mut row = ObjectSet::new().with(KEY_FIELD, object.id());
        row.append(ty.create_object_set(object.as_ref(), HandlerPreference::PreferString)?);
        Ok(row)
    }

    /// Builds an object from a row. Columns without a registered field are
    /// dropped.
    fn to_object(&self, ty: &ObjectType, mut row: ObjectSet) -> Result<ObjectRef> {
        let id = row.remove(KEY_FIELD).ok_or_else(|| {
            SorceryError::Realtime(format!("row in '{}' has no {} column", self.table, KEY_FIELD))
        })?;
        row.retain(|column, _| {
            let known = ty.is_field_registered(column);
            if !known {
                tracing::debug!(
                    "Ignoring column '{}' of '{}' in table '{}'",
                    column,
                    id,
                    self.table
                );
            }
            known
        });
        ty.object_from_set(&id, &row)
    }

    fn load_objects(
        &self,
        ty: &ObjectType,
        criteria: &ObjectSet,
        keep: impl Fn(&str) -> bool,
    ) -> Result<Vec<ObjectRef>> {
        let rows = self.engine.load_multi(&self.table, criteria)?;
        let mut objects = Vec::with_capacity(rows.len());
        for row in rows {
            if !row.get(KEY_FIELD).is_some_and(&keep) {
                continue;
            }
            match self.to_object(ty, row) {
                Ok(object) => objects.push(object),
                Err(err) => tracing::warn!("Skipping row in '{}': {}", self.table, err),
            }
        }
        Ok(objects)
    }

    fn not_found(ty: &ObjectType, object: &ObjectRef) -> SorceryError {
        SorceryError::NotFound {
            type_name: ty.name().to_string(),
            id: object.id().to_string(),
        }
    }
}

/// `LIKE` pattern selecting a superset of the ids a regex can match.
fn regex_like_pattern(pattern: &str) -> String {
    match literal_run(pattern) {
        Some(literal) if pattern.starts_with('^') => format!("{}%", literal),
        Some(literal) => format!("%{}%", literal),
        None => "%".to_string(),
    }
}

fn id_like(pattern: String) -> ObjectSet {
    ObjectSet::new().with(format!("{}{}", KEY_FIELD, LIKE_SUFFIX), pattern)
}

impl Backend for RealtimeBackend {
    fn name(&self) -> &str {
        "realtime"
    }

    fn create(&self, ty: &ObjectType, object: &ObjectRef) -> Result<()> {
        let key = ObjectSet::new().with(KEY_FIELD, object.id());
        if self.engine.load(&self.table, &key)?.is_some() {
            return Err(SorceryError::ObjectExists {
                type_name: ty.name().to_string(),
                id: object.id().to_string(),
            });
        }
        self.engine.store(&self.table, &Self::to_row(ty, object)?)
    }

    fn retrieve_id(&self, ty: &ObjectType, id: &str) -> Result<Option<ObjectRef>> {
        let key = ObjectSet::new().with(KEY_FIELD, id);
        match self.engine.load(&self.table, &key)? {
            Some(row) => self.to_object(ty, row).map(Some),
            None => Ok(None),
        }
    }

    fn retrieve_multiple(
        &self,
        ty: &ObjectType,
        fields: Option<&ObjectSet>,
    ) -> Result<Vec<ObjectRef>> {
        let criteria = match fields {
            Some(fields) if !fields.is_empty() => fields.clone(),
            _ => id_like("%".to_string()),
        };
        self.load_objects(ty, &criteria, |_| true)
    }

    fn retrieve_regex(&self, ty: &ObjectType, pattern: &str) -> Result<Vec<ObjectRef>> {
        let regex = Regex::new(pattern).map_err(|e| SorceryError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let like = regex_like_pattern(pattern);
        tracing::debug!(
            "Regex '{}' on table '{}' queried as LIKE '{}'",
            pattern,
            self.table,
            like
        );
        self.load_objects(ty, &id_like(like), |id| regex.is_match(id))
    }

    fn retrieve_prefix(&self, ty: &ObjectType, prefix: &str) -> Result<Vec<ObjectRef>> {
        self.load_objects(ty, &id_like(format!("{}%", prefix)), |id| {
            id.starts_with(prefix)
        })
    }

    fn update(&self, ty: &ObjectType, object: &ObjectRef) -> Result<()> {
        let mut changes = Self::to_row(ty, object)?;
        changes.remove(KEY_FIELD);
        match self
            .engine
            .update(&self.table, KEY_FIELD, object.id(), &changes)?
        {
            0 => Err(Self::not_found(ty, object)),
            _ => Ok(()),
        }
    }

    fn delete(&self, ty: &ObjectType, object: &ObjectRef) -> Result<()> {
        match self.engine.destroy(&self.table, KEY_FIELD, object.id())? {
            0 => Err(Self::not_found(ty, object)),
            _ => Ok(()),
        }
    }
}

/// Factory for [`RealtimeBackend`], registered as `realtime`.
pub struct RealtimeFactory {
    tables: Arc<RealtimeTables>,
}

impl RealtimeFactory {
    pub fn new(tables: Arc<RealtimeTables>) -> Self {
        Self { tables }
    }
}

impl BackendFactory for RealtimeFactory {
    fn name(&self) -> &str {
        "realtime"
    }

    fn open(&self, context: &OpenContext<'_>, args: &BackendArgs) -> Result<Box<dyn Backend>> {
        let refuse = |reason: String| SorceryError::BackendOpen {
            backend: "realtime".to_string(),
            type_name: context.type_name.to_string(),
            reason,
        };

        let table = args
            .first()
            .ok_or_else(|| refuse("a table name is required".to_string()))?;
        let engine = self
            .tables
            .engine(table)
            .ok_or_else(|| refuse(format!("table '{}' is not declared", table)))?;

        tracing::debug!(
            "Opened realtime table '{}' for '{}'",
            table,
            context.type_name
        );
        Ok(Box::new(RealtimeBackend::new(engine, table)))
    }
}
