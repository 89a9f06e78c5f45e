use anyhow::{bail, Context, Result};
use recast_mapping::{MappingConfig, Record, Table};
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

fn is_ext(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Reads a mapping from `.toml` or JSON.
pub fn read_mapping(path: &Path) -> Result<MappingConfig> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg = if is_ext(path, "toml") {
        MappingConfig::from_toml(&s)
    } else {
        MappingConfig::from_json(&s)
    };
    cfg.with_context(|| format!("invalid mapping {}", path.display()))
}

pub fn read_json(path: &Path) -> Result<Value> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    serde_json::from_reader(io::BufReader::new(file))
        .with_context(|| format!("parse {}", path.display()))
}

/// Reads a row set: a JSON array of objects, or a headed CSV table whose
/// cells load as strings (empty cells as null).
pub fn read_rows(path: &Path) -> Result<Vec<Record>> {
    if is_ext(path, "csv") {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        return read_csv_rows(file).with_context(|| format!("parse {}", path.display()));
    }

    match read_json(path)? {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Value::Object(record) => Ok(record),
                other => bail!("{}: item {idx} is not an object: {other}", path.display()),
            })
            .collect(),
        _ => bail!("{}: expected a JSON array of objects", path.display()),
    }
}

pub fn read_csv_rows<R: Read>(data: R) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(data);
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let row: Record = headers
            .iter()
            .zip(record.iter())
            .map(|(h, cell)| {
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                };
                (h.to_string(), value)
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Pretty JSON to `path`, or stdout when no path is given.
pub fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    let mut out = open_output(path)?;
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// Writes a table as CSV when the target ends in `.csv`, else as JSON records.
pub fn write_table(path: Option<&Path>, table: &Table) -> Result<()> {
    match path {
        Some(p) if is_ext(p, "csv") => {
            let file = File::create(p).with_context(|| format!("create {}", p.display()))?;
            write_csv(file, table)
        }
        _ => write_json(path, &table.clone().into_records()),
    }
}

pub fn write_csv<W: Write>(out: W, table: &Table) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(cell_text))?;
    }
    writer.flush()?;
    Ok(())
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) => Box::new(io::BufWriter::new(
            File::create(p).with_context(|| format!("create {}", p.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    })
}
