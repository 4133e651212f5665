//! Rows: the wire format exchanged between entities and mappers.

use crate::entity::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static NULL: Value = Value::Null;

/// A field-name to value map representing one stored record.
///
/// Absent fields read as [`Value::Null`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Returns the value of a field, or `Null` if absent.
    pub fn get(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&NULL)
    }

    /// Sets a field value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
    }

    /// Removes a field, returning its previous value.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.values.remove(field)
    }

    /// Checks whether the row carries a field (even if null).
    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    /// Iterates over field names and values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields in the row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row has no fields.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns a copy with every field name prefixed by `prefix.`.
    #[must_use]
    pub fn qualified(&self, prefix: &str) -> Self {
        Self {
            values: self
                .values
                .iter()
                .map(|(k, v)| (format!("{prefix}.{k}"), v.clone()))
                .collect(),
        }
    }

    /// Copies every field of `other` into this row.
    pub fn extend(&mut self, other: &Row) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}
