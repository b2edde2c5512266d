//! Header-addressed tabular reading with bad-row skipping.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use serde_json::Value as JsonValue;

use crate::AdapterError;

/// One parsed row addressed by column name. Blank cells read as absent.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<(String, String)>,
}

impl Row {
    pub fn from_pairs(values: Vec<(String, String)>) -> Self {
        Self { values }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn text(&self, column: &str) -> &str {
        self.get(column).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    pub rows: Vec<Row>,
    /// Rows dropped because they did not parse (too many fields, bad encoding).
    pub malformed_rows: usize,
}

pub(crate) fn open(path: &Path) -> Result<File, AdapterError> {
    File::open(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            AdapterError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            AdapterError::Io {
                path: path.to_path_buf(),
                source: err,
            }
        }
    })
}

/// Reads a delimited file; records that fail to parse are counted and skipped.
pub fn read_delimited(
    path: &Path,
    delimiter: u8,
    row_limit: Option<usize>,
) -> Result<Table, AdapterError> {
    let file = open(path)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(file);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AdapterError::Malformed {
            path: path.to_path_buf(),
            reason: format!("unreadable header: {e}"),
        })?
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut table = Table::default();
    let mut record = StringRecord::new();
    loop {
        if row_limit.is_some_and(|limit| table.rows.len() >= limit) {
            break;
        }
        match reader.read_record(&mut record) {
            // Extra fields cannot be attributed to a column; missing trailing
            // fields read as empty cells.
            Ok(true) if record.len() > headers.len() => table.malformed_rows += 1,
            Ok(true) => {
                let values = headers
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.clone(), record.get(i).unwrap_or_default().to_string()))
                    .collect();
                table.rows.push(Row::from_pairs(values));
            }
            Ok(false) => break,
            Err(err) if is_record_level(&err) => table.malformed_rows += 1,
            Err(err) => {
                return Err(AdapterError::Malformed {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                })
            }
        }
    }
    Ok(table)
}

fn is_record_level(err: &csv::Error) -> bool {
    matches!(
        err.kind(),
        csv::ErrorKind::UnequalLengths { .. } | csv::ErrorKind::Utf8 { .. }
    )
}

/// Comma-separated unless the header is a single column that contains `|`.
pub fn sniff_delimiter(path: &Path) -> Result<u8, AdapterError> {
    let mut first_line = String::new();
    BufReader::new(open(path)?)
        .read_line(&mut first_line)
        .map_err(|e| AdapterError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
    if !first_line.contains(',') && first_line.contains('|') {
        Ok(b'|')
    } else {
        Ok(b',')
    }
}

/// Reads a JSON array of flat objects (or an object wrapping one such array).
pub fn read_json_records(path: &Path, row_limit: Option<usize>) -> Result<Table, AdapterError> {
    let file = open(path)?;
    let value: JsonValue =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| AdapterError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    let items = match value {
        JsonValue::Array(items) => items,
        JsonValue::Object(map) => map
            .into_iter()
            .find_map(|(_, v)| match v {
                JsonValue::Array(items) => Some(items),
                _ => None,
            })
            .ok_or_else(|| AdapterError::Malformed {
                path: path.to_path_buf(),
                reason: "object holds no array of records".to_string(),
            })?,
        _ => {
            return Err(AdapterError::Malformed {
                path: path.to_path_buf(),
                reason: "expected an array of records".to_string(),
            })
        }
    };

    let mut table = Table::default();
    for item in items {
        if row_limit.is_some_and(|limit| table.rows.len() >= limit) {
            break;
        }
        let JsonValue::Object(map) = item else {
            table.malformed_rows += 1;
            continue;
        };
        let values = map
            .into_iter()
            .filter_map(|(k, v)| json_text(&v).map(|text| (k, text)))
            .collect();
        table.rows.push(Row::from_pairs(values));
    }
    Ok(table)
}

fn json_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        }),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Array(items) => Some(
            items
                .iter()
                .filter_map(json_text)
                .filter(|s| !s.trim().is_empty())
                .collect::<Vec<_>>()
                .join(", "),
        ),
        JsonValue::Object(_) => None,
    }
}
