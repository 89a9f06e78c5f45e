use serde_json::{Map, Value};
use thiserror::Error;

/// A loosely typed record as produced by the per-format parsers.
pub type RawRecord = Map<String, Value>;

pub const ACCOUNTS_KEY: &str = "accounts";
pub const TRANSACTIONS_KEY: &str = "transactions";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CanonicalError {
    #[error("Payload is missing required key '{0}'")]
    MissingKey(String),
    #[error("Key '{0}' must hold an array of records")]
    NotAnArray(String),
    #[error("Record {index} under '{key}' is not an object")]
    NotARecord { key: String, index: usize },
    #[error("Invalid amount in field '{field}' of record {index}: {value}")]
    InvalidAmount {
        index: usize,
        field: String,
        value: Value,
    },
}

/// Returns the records held under `key`, failing fast when the key is absent.
pub fn records<'a>(payload: &'a Value, key: &str) -> Result<Vec<&'a RawRecord>, CanonicalError> {
    let items = payload
        .get(key)
        .ok_or_else(|| CanonicalError::MissingKey(key.to_string()))?
        .as_array()
        .ok_or_else(|| CanonicalError::NotAnArray(key.to_string()))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.as_object().ok_or_else(|| CanonicalError::NotARecord {
                key: key.to_string(),
                index,
            })
        })
        .collect()
}

/// Returns the field's value unless it is absent, null, or a blank string.
pub fn present<'a>(record: &'a RawRecord, field: &str) -> Option<&'a Value> {
    match record.get(field)? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        value => Some(value),
    }
}

/// Reads a field as text. Numbers and booleans are rendered, empty strings
/// and nulls are treated as missing.
pub fn text(record: &RawRecord, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
