//! Ordered `(name, value)` lists used as the generic form of an object.

use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Ordered list of field name/value pairs.
///
/// Names may repeat (multi-valued fields such as access lists emit one pair
/// per entry); lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectSet {
    fields: Vec<(String, String)>,
}

impl ObjectSet {
    /// Creates an empty object set.
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Appends a pair.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Builder form of [`ObjectSet::push`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// Appends every pair of `other`.
    pub fn append(&mut self, other: ObjectSet) {
        self.fields.extend(other.fields);
    }

    /// Value of the first pair named `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Values of every pair named `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether any pair is named `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// Removes every pair named `name`, returning the first removed value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let mut removed = None;
        self.fields.retain(|(n, v)| {
            if n == name {
                if removed.is_none() {
                    removed = Some(v.clone());
                }
                false
            } else {
                true
            }
        });
        removed
    }

    /// Keeps only the pairs for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.fields.retain(|(n, v)| keep(n, v));
    }

    /// Iterates over pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Checks that every pair of `criteria` is present in this set with an
    /// equal value. A missing field never matches.
    pub fn matches(&self, criteria: &ObjectSet) -> bool {
        self.matches_with(criteria, true)
    }

    /// [`ObjectSet::matches`] with configurable value case sensitivity.
    pub fn matches_with(&self, criteria: &ObjectSet, case_sensitive: bool) -> bool {
        criteria.iter().all(|(name, expected)| {
            self.fields.iter().any(|(n, v)| {
                n == name
                    && if case_sensitive {
                        v == expected
                    } else {
                        v.eq_ignore_ascii_case(expected)
                    }
            })
        })
    }

    /// JSON object mapping each name to its string value. Later duplicates
    /// overwrite earlier ones.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.fields.len());
        for (name, value) in &self.fields {
            map.insert(name.clone(), serde_json::Value::String(value.clone()));
        }
        serde_json::Value::Object(map)
    }
}

/// Computes the pairs of `modified` that are new or differ from `original`.
///
/// Repeated names compare as whole value lists; when a list differs every
/// pair of that name in `modified` is reported.
///
/// # Returns
/// `None` when nothing changed, otherwise the changed pairs in `modified`
/// order. Fields present only in `original` are not reported.
pub fn changeset(original: &ObjectSet, modified: &ObjectSet) -> Option<ObjectSet> {
    if std::ptr::eq(original, modified) {
        return None;
    }

    let mut differs: HashMap<&str, bool> = HashMap::new();
    let changes: ObjectSet = modified
        .iter()
        .filter(|(name, _)| {
            *differs
                .entry(*name)
                .or_insert_with(|| !original.get_all(name).eq(modified.get_all(name)))
        })
        .collect();

    if changes.is_empty() {
        None
    } else {
        Some(changes)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ObjectSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for ObjectSet {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl fmt::Display for ObjectSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.fields {
            writeln!(f, "{} = {}", name, value)?;
        }
        Ok(())
    }
}

impl Serialize for ObjectSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct ObjectSetVisitor;

impl<'de> Visitor<'de> for ObjectSetVisitor {
    type Value = ObjectSet;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of field names to string values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ObjectSet, A::Error> {
        let mut set = ObjectSet::new();
        while let Some((name, value)) = access.next_entry::<String, String>()? {
            set.push(name, value);
        }
        Ok(set)
    }
}

impl<'de> Deserialize<'de> for ObjectSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ObjectSetVisitor)
    }
}
