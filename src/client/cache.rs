//! Normalized in-memory result cache
//!
//! Objects carrying `__typename` and `id` are stored once under
//! `Typename:id` and referenced from root records with `{"__ref": key}`.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::document::{Document, OperationKind};

const ROOT_QUERY: &str = "ROOT_QUERY";
const ROOT_MUTATION: &str = "ROOT_MUTATION";
const REF_KEY: &str = "__ref";

/// Normalized cache shared by all queries of one client
#[derive(Debug, Default)]
pub struct InMemoryCache {
    records: RwLock<HashMap<String, Map<String, Value>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for an entity object, if it is identifiable
    pub fn identify(object: &Map<String, Value>) -> Option<String> {
        let typename = object.get("__typename")?.as_str()?;
        let id = match object.get("id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(format!("{}:{}", typename, id))
    }

    /// Write the `data` payload of a result for `document`
    pub fn write(&self, document: &Document, data: &Value) {
        let root = match document.kind {
            OperationKind::Query => ROOT_QUERY,
            OperationKind::Mutation => ROOT_MUTATION,
            // Subscription payloads are delivered, not stored at the root
            OperationKind::Subscription => {
                if let Some(value) = data.get(&document.field) {
                    let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
                    normalize(value, &mut records);
                }
                return;
            }
        };

        let Some(value) = data.get(&document.field) else {
            return;
        };

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let normalized = normalize(value, &mut records);
        records
            .entry(root.to_string())
            .or_default()
            .insert(document.field.clone(), normalized);
    }

    /// Read a query result; `None` when any selected field is missing
    pub fn read(&self, document: &Document) -> Option<Value> {
        if document.kind != OperationKind::Query {
            return None;
        }

        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let stored = records.get(ROOT_QUERY)?.get(&document.field)?;
        let resolved = resolve(stored, &document.selection, &records)?;

        let mut data = Map::new();
        data.insert(document.field.clone(), resolved);
        Some(Value::Object(data))
    }

    /// Look up a normalized entity
    pub fn entity(&self, key: &str) -> Option<Map<String, Value>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.get(key).cloned()
    }

    /// Number of records, roots included
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize(value: &Value, records: &mut HashMap<String, Map<String, Value>>) -> Value {
    match value {
        Value::Object(object) => {
            let mut fields = Map::new();
            for (key, field) in object {
                fields.insert(key.clone(), normalize(field, records));
            }

            match InMemoryCache::identify(object) {
                Some(key) => {
                    records.entry(key.clone()).or_default().extend(fields);
                    let mut reference = Map::new();
                    reference.insert(REF_KEY.to_string(), Value::String(key));
                    Value::Object(reference)
                }
                None => Value::Object(fields),
            }
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| normalize(v, records)).collect()),
        other => other.clone(),
    }
}

fn resolve(
    value: &Value,
    selection: &[String],
    records: &HashMap<String, Map<String, Value>>,
) -> Option<Value> {
    match value {
        Value::Object(object) => {
            let object = match object.get(REF_KEY).and_then(Value::as_str) {
                Some(key) => records.get(key)?,
                None => object,
            };

            if selection.is_empty() {
                return Some(Value::Object(object.clone()));
            }

            let mut projected = Map::new();
            for field in selection {
                projected.insert(field.clone(), object.get(field)?.clone());
            }
            if let Some(typename) = object.get("__typename") {
                projected.insert("__typename".to_string(), typename.clone());
            }
            Some(Value::Object(projected))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| resolve(item, selection, records))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        other => Some(other.clone()),
    }
}
