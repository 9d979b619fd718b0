//! Records, scan entries and the update merge

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};
use crate::key::Key;

/// A stored value. Opaque to the client apart from its key field.
pub type Record = Value;

/// One `{key, value}` pair produced by a full scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub key: Key,
    pub value: Record,
}

impl Entry {
    pub fn new(key: Key, value: Record) -> Self {
        Self { key, value }
    }
}

/// Serialize a caller payload into a record.
pub fn to_record<T: Serialize + ?Sized>(payload: &T) -> EngineResult<Record> {
    serde_json::to_value(payload).map_err(|e| EngineError::Data(e.to_string()))
}

/// Read the in-line key of `record`, if the key field is present.
///
/// Records must be JSON objects for an in-line key path to apply.
pub fn inline_key(record: &Record, key_path: &str) -> EngineResult<Option<Key>> {
    let fields = as_object(record)?;
    fields.get(key_path).map(Key::from_json).transpose()
}

/// Write `key` into the key field of `record`.
pub fn inject_key(record: &mut Record, key_path: &str, key: &Key) -> EngineResult<()> {
    match record {
        Value::Object(fields) => {
            fields.insert(key_path.to_string(), key.to_json());
            Ok(())
        }
        _ => Err(not_an_object(record)),
    }
}

/// Shallow-merge `partial` over `existing`.
///
/// Top-level fields of `partial` replace the same fields of `existing`;
/// everything else in `existing` is kept. Nested objects are replaced, not
/// merged. The key field is then pinned back to `key` so the result is
/// always written at the record's original key.
pub fn shallow_merge(
    existing: Record,
    partial: &Record,
    key_path: &str,
    key: &Key,
) -> EngineResult<Record> {
    let overrides = as_object(partial)?;
    let mut merged = match existing {
        Value::Object(fields) => fields,
        other => return Err(not_an_object(&other)),
    };
    for (field, value) in overrides {
        merged.insert(field.clone(), value.clone());
    }
    merged.insert(key_path.to_string(), key.to_json());
    Ok(Value::Object(merged))
}

fn as_object(record: &Record) -> EngineResult<&Map<String, Value>> {
    record.as_object().ok_or_else(|| not_an_object(record))
}

fn not_an_object(record: &Record) -> EngineError {
    EngineError::Data(format!(
        "records with an in-line key must be objects, got {}",
        kind(record)
    ))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
