use serde_json::{Map, Value};
use thiserror::Error;

use crate::cast::{resolve, try_cast, CastError};
use crate::config::{CastMode, FieldRule, MappingConfig};

/// An insertion-ordered JSON object.
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransformError {
    #[error("Row {row}, field '{field}': {source}")]
    Cast {
        row: usize,
        field: String,
        source: CastError,
    },
}

/// Maps one source row onto the target fields of `cfg`.
///
/// Only declared fields are emitted, in declaration order. Errors can only
/// occur for strict casts; a single-row call reports them as row 0.
pub fn transform(row: &Record, cfg: &MappingConfig) -> Result<Record, TransformError> {
    transform_at(0, row, cfg)
}

/// Maps every row, keeping input order, count and duplicates.
pub fn transform_all(rows: &[Record], cfg: &MappingConfig) -> Result<Vec<Record>, TransformError> {
    let out = rows
        .iter()
        .enumerate()
        .map(|(idx, row)| transform_at(idx, row, cfg))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(
        rows = out.len(),
        fields = cfg.len(),
        source_kind = cfg.source_kind(),
        target_kind = cfg.target_kind(),
        "transformed rows"
    );
    Ok(out)
}

fn transform_at(idx: usize, row: &Record, cfg: &MappingConfig) -> Result<Record, TransformError> {
    let rules = cfg.rules();
    let mut out = Record::new();

    for (field, rule) in cfg.fields() {
        let raw = resolve(row, rule.candidates())
            .or_else(|| rule.default_value())
            .cloned()
            .unwrap_or(Value::Null);

        let mut value = cast_field(idx, field, rule, cfg, &raw)?;
        if rules.trim_strings {
            value = trim(value);
        }

        if value.is_null() && rules.drop_null_target_fields {
            continue;
        }
        out.insert(field.to_string(), value);
    }

    Ok(out)
}

/// Casts one cell according to the field's effective mode.
pub(crate) fn cast_field(
    row: usize,
    field: &str,
    rule: &FieldRule,
    cfg: &MappingConfig,
    value: &Value,
) -> Result<Value, TransformError> {
    match try_cast(value, rule.cast()) {
        Ok(cast) => Ok(cast),
        Err(source) => match rule.effective_mode(cfg.rules()) {
            CastMode::Lenient => {
                tracing::warn!(row, field, error = %source, "cast failed, keeping original value");
                Ok(value.clone())
            }
            CastMode::Strict => Err(TransformError::Cast {
                row,
                field: field.to_string(),
                source,
            }),
        },
    }
}

pub(crate) fn trim(value: Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.len() == s.len() {
                Value::String(s)
            } else {
                Value::String(trimmed.to_string())
            }
        }
        other => other,
    }
}
