//! The record model (§3 Data Model: Record).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Opaque, unique identifier for a record. Plain strings so that stores are
/// free to mint ids however they like (UUIDs, source-native keys, hashes).
pub type RecordId = String;

/// A single ingested record: a flat map from field name to value, tagged
/// with the source collection it came from.
///
/// Records are immutable once ingested — the engine never mutates a
/// `Record` it reads back from a store; re-ingestion is the store's
/// business and produces a new id or a new version, not an in-place edit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub source: String,
    pub fields: HashMap<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Field value as a string, if present and string-typed. Nested objects
    /// are never matched against (§3: "nested not matched").
    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn field_is_null_or_absent(&self, field: &str) -> bool {
        match self.fields.get(field) {
            None => true,
            Some(Value::Null) => true,
            _ => false,
        }
    }
}

/// Order two record ids so that the smaller comes first, matching the
/// `record_id_a < record_id_b` invariant carried by every pair/edge type.
pub fn ordered_pair(a: RecordId, b: RecordId) -> (RecordId, RecordId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}
