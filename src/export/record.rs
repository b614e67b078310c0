//! Export records
//!
//! The universal result type of a traversal: the whole snapshot, one
//! collection and one document are all an [`ExportRecord`].

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::store::FieldData;

/// Value stored under a record key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExportValue {
    /// An exported collection or document.
    Record(ExportRecord),
    /// A leaf field value of a document.
    Field(JsonValue),
}

/// Key-sorted mapping from identifier or field name to [`ExportValue`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExportRecord {
    entries: BTreeMap<String, ExportValue>,
}

impl ExportRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ExportValue> {
        self.entries.get(key)
    }

    /// Nested record stored under `key`, if the value is one.
    pub fn get_record(&self, key: &str) -> Option<&ExportRecord> {
        match self.entries.get(key) {
            Some(ExportValue::Record(record)) => Some(record),
            _ => None,
        }
    }

    /// Insert a value, returning the one it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: ExportValue) -> Option<ExportValue> {
        self.entries.insert(key.into(), value)
    }

    pub fn insert_record(&mut self, key: impl Into<String>, record: ExportRecord) -> Option<ExportValue> {
        self.insert(key, ExportValue::Record(record))
    }

    /// Apply a document's own fields on top of the record. A field replaces
    /// a sub-collection of the same name.
    pub fn merge_fields(&mut self, fields: FieldData) {
        for (name, value) in fields {
            self.entries.insert(name, ExportValue::Field(value));
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ExportValue> {
        self.entries.iter()
    }

    pub fn into_inner(self) -> BTreeMap<String, ExportValue> {
        self.entries
    }

    /// Plain JSON form of the record.
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.entries
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect(),
        )
    }
}

impl ExportValue {
    pub fn to_json(&self) -> JsonValue {
        match self {
            ExportValue::Record(record) => record.to_json(),
            ExportValue::Field(value) => value.clone(),
        }
    }
}

impl<'a> IntoIterator for &'a ExportRecord {
    type Item = (&'a String, &'a ExportValue);
    type IntoIter = btree_map::Iter<'a, String, ExportValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
