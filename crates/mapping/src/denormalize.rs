use serde_json::Value;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::transform::Record;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DenormalizeError {
    #[error("Parent record {index} has no value for key '{key}'")]
    MissingPrimaryKey { index: usize, key: String },
    #[error("Relation name '{0}' is used more than once")]
    DuplicateRelation(String),
    #[error("Parent record {index} already has a field named '{name}'")]
    RelationShadowsField { index: usize, name: String },
}

/// A child record set that nests under its parent as `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildRelation {
    pub name: String,
    pub foreign_key: String,
    pub records: Vec<Record>,
}

impl ChildRelation {
    pub fn new(name: impl Into<String>, foreign_key: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            foreign_key: foreign_key.into(),
            records,
        }
    }
}

/// Hashable identity of a key value. `1` and `"1"` are distinct keys.
fn key_of(value: &Value) -> String {
    value.to_string()
}

/// Folds child records into nested arrays under their parents.
///
/// Parents are deduplicated by `primary_key`, first occurrence wins, and keep
/// their first-appearance order. Each relation contributes an array keyed by
/// its name to every document; a parent without children gets an empty
/// array. Children keep their relative order and lose their foreign-key
/// field. Children whose key matches no parent are dropped. A kept parent
/// that already carries a field named like a relation is an error.
pub fn denormalize(
    parents: &[Record],
    primary_key: &str,
    children: &[ChildRelation],
) -> Result<Vec<Record>, DenormalizeError> {
    let mut names = HashSet::new();
    for relation in children {
        if !names.insert(relation.name.as_str()) {
            return Err(DenormalizeError::DuplicateRelation(relation.name.clone()));
        }
    }

    let mut seen = HashSet::new();
    let mut ordered: Vec<(String, &Record)> = Vec::with_capacity(parents.len());
    for (index, parent) in parents.iter().enumerate() {
        let key = match parent.get(primary_key) {
            Some(value) if !value.is_null() => key_of(value),
            _ => {
                return Err(DenormalizeError::MissingPrimaryKey {
                    index,
                    key: primary_key.to_string(),
                })
            }
        };
        if seen.insert(key.clone()) {
            if let Some(relation) = children.iter().find(|r| parent.contains_key(&r.name)) {
                return Err(DenormalizeError::RelationShadowsField {
                    index,
                    name: relation.name.clone(),
                });
            }
            ordered.push((key, parent));
        }
    }

    let groups: Vec<HashMap<String, Vec<Record>>> = children
        .iter()
        .map(|relation| group_children(relation, &seen))
        .collect();

    let docs = ordered
        .into_iter()
        .map(|(key, parent)| {
            let mut doc = parent.clone();
            for (relation, group) in children.iter().zip(&groups) {
                let nested = group.get(&key).cloned().unwrap_or_default();
                doc.insert(
                    relation.name.clone(),
                    Value::Array(nested.into_iter().map(Value::Object).collect()),
                );
            }
            doc
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        documents = docs.len(),
        duplicates = parents.len() - docs.len(),
        relations = children.len(),
        "denormalized parent records"
    );
    Ok(docs)
}

fn group_children(relation: &ChildRelation, parent_keys: &HashSet<String>) -> HashMap<String, Vec<Record>> {
    let mut groups: HashMap<String, Vec<Record>> = HashMap::new();
    let mut orphans = 0usize;

    for child in &relation.records {
        let key = match child.get(&relation.foreign_key) {
            Some(value) if !value.is_null() => key_of(value),
            _ => {
                orphans += 1;
                continue;
            }
        };
        if !parent_keys.contains(&key) {
            orphans += 1;
            continue;
        }
        let mut nested = child.clone();
        nested.shift_remove(&relation.foreign_key);
        groups.entry(key).or_default().push(nested);
    }

    if orphans > 0 {
        tracing::debug!(relation = %relation.name, orphans, "dropped child records without a parent");
    }
    groups
}
