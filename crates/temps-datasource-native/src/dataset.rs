//! In-memory rows decoded from a local file.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::Path;
use temps_datasource::{AttributeInfo, DataRow, DataSourceError, FieldType, Result};

/// Supported file encodings, picked by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// A single JSON array of objects (`.json`)
    Json,
    /// One JSON object per line (`.jsonl`, `.ndjson`)
    JsonLines,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Some(FileFormat::Json),
            Some("jsonl") | Some("ndjson") => Some(FileFormat::JsonLines),
            _ => None,
        }
    }
}

/// Decoded rows plus the schema inferred from them
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    rows: Vec<DataRow>,
    attributes: Vec<AttributeInfo>,
}

impl Dataset {
    pub fn from_rows(rows: Vec<DataRow>) -> Self {
        let attributes = infer_attributes(&rows);
        Self { rows, attributes }
    }

    /// Decode file contents. The error message names `origin`.
    pub fn parse(origin: &str, contents: &str, format: FileFormat) -> Result<Self> {
        let rows = match format {
            FileFormat::Json => parse_json_array(contents)
                .map_err(|e| parse_error(origin, e))?,
            FileFormat::JsonLines => {
                let mut rows = Vec::new();
                for (index, line) in contents.lines().enumerate() {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let row = serde_json::from_str::<Value>(line)
                        .map_err(|e| e.to_string())
                        .and_then(into_row)
                        .map_err(|e| parse_error(origin, format!("line {}: {}", index + 1, e)))?;
                    rows.push(row);
                }
                rows
            }
        };

        Ok(Self::from_rows(rows))
    }

    /// Keep the rows matching every key of a JSON object filter
    pub fn filtered(self, filter: &Value) -> Result<Self> {
        let Value::Object(conditions) = filter else {
            return Err(DataSourceError::configuration(format!(
                "subset filter must be a JSON object, got {}",
                filter
            )));
        };

        let rows = self
            .rows
            .into_iter()
            .filter(|row| {
                conditions
                    .iter()
                    .all(|(column, expected)| row.get(column).unwrap_or(&Value::Null) == expected)
            })
            .collect();
        Ok(Self::from_rows(rows))
    }

    /// Type the named column as a timestamp when every value parses as one
    pub fn with_time_column(mut self, column: &str) -> Self {
        let all_times = self
            .rows
            .iter()
            .filter_map(|row| row.get(column))
            .filter(|value| !value.is_null())
            .all(|value| parse_time(value).is_some());

        if all_times {
            if let Some(attribute) = self.attributes.iter_mut().find(|a| a.name == column) {
                attribute.field_type = FieldType::Timestamp;
            }
        }
        self
    }

    pub fn attributes(&self) -> &[AttributeInfo] {
        &self.attributes
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Latest value of a time column; unparseable values are skipped
    pub fn max_time(&self, column: &str) -> Option<DateTime<Utc>> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column))
            .filter_map(parse_time)
            .max()
    }
}

fn parse_error(origin: &str, cause: impl std::fmt::Display) -> DataSourceError {
    DataSourceError::Serialization(format!("could not parse '{}': {}", origin, cause))
}

fn parse_json_array(contents: &str) -> std::result::Result<Vec<DataRow>, String> {
    let value: Value = serde_json::from_str(contents).map_err(|e| e.to_string())?;
    let Value::Array(items) = value else {
        return Err("expected an array of objects".to_string());
    };
    items.into_iter().map(into_row).collect()
}

fn into_row(value: Value) -> std::result::Result<DataRow, String> {
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(format!("expected an object, got {}", other)),
    }
}

/// RFC 3339 strings, or numbers as epoch milliseconds
pub fn parse_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|time| time.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn value_type(value: &Value) -> FieldType {
    match value {
        Value::Null => FieldType::Null,
        Value::Bool(_) => FieldType::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => FieldType::Int64,
        Value::Number(_) => FieldType::Float64,
        Value::String(s) if DateTime::parse_from_rfc3339(s).is_ok() => FieldType::Timestamp,
        Value::String(_) => FieldType::String,
        Value::Array(_) | Value::Object(_) => FieldType::Json,
    }
}

fn merge_types(current: FieldType, next: FieldType) -> FieldType {
    match (current, next) {
        (a, b) if a == b => a,
        (FieldType::Null, other) | (other, FieldType::Null) => other,
        (FieldType::Int64, FieldType::Float64) | (FieldType::Float64, FieldType::Int64) => {
            FieldType::Float64
        }
        (FieldType::Timestamp, FieldType::String) | (FieldType::String, FieldType::Timestamp) => {
            FieldType::String
        }
        _ => FieldType::Json,
    }
}

/// Columns by name, with the narrowest type covering all of their values
fn infer_attributes(rows: &[DataRow]) -> Vec<AttributeInfo> {
    let mut attributes: Vec<AttributeInfo> = Vec::new();

    for row in rows {
        let mut columns: Vec<&String> = row.keys().collect();
        columns.sort();
        for column in columns {
            let observed = value_type(&row[column]);
            match attributes.iter_mut().find(|a| &a.name == column) {
                Some(attribute) => {
                    attribute.field_type = merge_types(attribute.field_type, observed)
                }
                None => attributes.push(AttributeInfo::new(column.as_str(), observed)),
            }
        }
    }

    attributes
}
