use serde_json::Value;

use crate::config::MappingConfig;
use crate::table::Table;
use crate::transform::{cast_field, trim, TransformError};

/// Selects and renames the columns of `table` according to `cfg`.
///
/// Column choice is made once for the whole table: the first candidate that
/// exists as a source column wins, otherwise the output column is filled
/// with the field's default. Source cells are trimmed (when `trim_strings`
/// is set) and then cast; default-filled columns are only cast. With
/// `drop_null_target_fields`, columns that are null in every row are
/// omitted, which never applies to a table without rows.
pub fn project(table: &Table, cfg: &MappingConfig) -> Result<Table, TransformError> {
    let rules = cfg.rules();
    let row_count = table.len();
    let mut columns: Vec<(String, Vec<Value>)> = Vec::with_capacity(cfg.len());

    for (field, rule) in cfg.fields() {
        let source = rule
            .candidates()
            .iter()
            .find_map(|candidate| table.column(candidate));

        let cells = match source {
            Some(cells) => cells
                .enumerate()
                .map(|(row, cell)| {
                    let cell = if rules.trim_strings {
                        trim(cell.clone())
                    } else {
                        cell.clone()
                    };
                    cast_field(row, field, rule, cfg, &cell)
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => {
                let fill = rule.default_value().cloned().unwrap_or(Value::Null);
                let fill = cast_field(0, field, rule, cfg, &fill)?;
                vec![fill; row_count]
            }
        };

        let all_null = row_count > 0 && cells.iter().all(Value::is_null);
        if rules.drop_null_target_fields && all_null {
            tracing::debug!(field, "dropping all-null column");
            continue;
        }
        columns.push((field.to_string(), cells));
    }

    Ok(Table::from_columns(columns, row_count))
}
