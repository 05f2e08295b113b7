//! Tabular query engines used by the realtime backend.

use std::collections::HashMap;

use parking_lot::RwLock;
use sorcery_core::{ObjectSet, Result, SorceryError};

/// Suffix turning a criterion name into a `LIKE` pattern match.
pub const LIKE_SUFFIX: &str = " LIKE";

/// External table API.
///
/// Criteria are `(column, value)` pairs that must all hold. A column name
/// ending in [`LIKE_SUFFIX`] matches its value as a pattern where `%` is any
/// run of characters and `_` any single character.
pub trait RealtimeEngine: Send + Sync {
    /// Every row matching `criteria`.
    fn load_multi(&self, table: &str, criteria: &ObjectSet) -> Result<Vec<ObjectSet>>;

    /// First row matching `criteria`.
    fn load(&self, table: &str, criteria: &ObjectSet) -> Result<Option<ObjectSet>> {
        Ok(self.load_multi(table, criteria)?.into_iter().next())
    }

    /// Inserts a row.
    fn store(&self, table: &str, row: &ObjectSet) -> Result<()>;

    /// Sets `changes` on the rows whose `key_field` equals `key`.
    ///
    /// # Returns
    /// Number of rows changed.
    fn update(&self, table: &str, key_field: &str, key: &str, changes: &ObjectSet)
        -> Result<usize>;

    /// Removes the rows whose `key_field` equals `key`, returning how many.
    fn destroy(&self, table: &str, key_field: &str, key: &str) -> Result<usize>;
}

/// SQL style `LIKE` matching.
pub fn like_match(pattern: &str, value: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();
    let (mut p, mut v) = (0, 0);
    // position of the last `%` and the value index it currently absorbs up to
    let mut backtrack: Option<(usize, usize)> = None;

    while v < value.len() {
        if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, v));
            p += 1;
        } else if p < pattern.len() && (pattern[p] == '_' || pattern[p] == value[v]) {
            p += 1;
            v += 1;
        } else if let Some((star, absorbed)) = backtrack {
            p = star + 1;
            v = absorbed + 1;
            backtrack = Some((star, absorbed + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}

/// Whether `row` satisfies every criterion.
pub fn row_matches(row: &ObjectSet, criteria: &ObjectSet) -> bool {
    criteria.iter().all(|(name, expected)| {
        match name.strip_suffix(LIKE_SUFFIX) {
            Some(column) => row
                .get(column.trim())
                .is_some_and(|value| like_match(expected, value)),
            None => row.get(name) == Some(expected),
        }
    })
}

/// Engine keeping tables in process memory. Like most remote APIs it
/// refuses queries without criteria.
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    tables: RwLock<HashMap<String, Vec<ObjectSet>>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table; existing tables are left alone.
    pub fn create_table(&self, table: &str) {
        self.tables.write().entry(table.to_string()).or_default();
    }

    /// Number of rows in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, Vec::len)
    }

    fn missing(table: &str) -> SorceryError {
        SorceryError::Realtime(format!("table '{}' does not exist", table))
    }
}

impl RealtimeEngine for InMemoryEngine {
    fn load_multi(&self, table: &str, criteria: &ObjectSet) -> Result<Vec<ObjectSet>> {
        if criteria.is_empty() {
            return Err(SorceryError::Realtime(
                "at least one criterion is required".to_string(),
            ));
        }
        let tables = self.tables.read();
        let rows = tables.get(table).ok_or_else(|| Self::missing(table))?;
        Ok(rows
            .iter()
            .filter(|row| row_matches(row, criteria))
            .cloned()
            .collect())
    }

    fn store(&self, table: &str, row: &ObjectSet) -> Result<()> {
        self.tables
            .write()
            .get_mut(table)
            .ok_or_else(|| Self::missing(table))?
            .push(row.clone());
        Ok(())
    }

    fn update(
        &self,
        table: &str,
        key_field: &str,
        key: &str,
        changes: &ObjectSet,
    ) -> Result<usize> {
        let mut tables = self.tables.write();
        let rows = tables.get_mut(table).ok_or_else(|| Self::missing(table))?;
        let mut changed = 0;
        for row in rows.iter_mut().filter(|row| row.get(key_field) == Some(key)) {
            // rewrite the columns present in `changes`, keep the rest
            row.retain(|name, _| !changes.contains(name));
            row.append(changes.clone());
            changed += 1;
        }
        Ok(changed)
    }

    fn destroy(&self, table: &str, key_field: &str, key: &str) -> Result<usize> {
        let mut tables = self.tables.write();
        let rows = tables.get_mut(table).ok_or_else(|| Self::missing(table))?;
        let before = rows.len();
        rows.retain(|row| row.get(key_field) != Some(key));
        Ok(before - rows.len())
    }
}
