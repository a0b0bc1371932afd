//! Source file adapters: format detection plus the CSV and JSON table readers.

use std::fs;
use std::path::{Path, PathBuf};

use crmetl_core::{Cell, Row, Table};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, error, warn};

pub const CRATE_NAME: &str = "crmetl-adapters";

/// CSV tokens read as missing values, matching the pandas `read_csv` defaults.
pub const NA_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Json,
}

impl SourceFormat {
    /// Detect the format from the (case-insensitive) file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("unsupported format for {}: {reason}", path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing CSV {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("parsing JSON {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub trait TableReader: Send + Sync {
    fn format(&self) -> SourceFormat;

    fn read(&self, path: &Path) -> Result<Table, ExtractError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvTableReader;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTableReader;

impl TableReader for CsvTableReader {
    fn format(&self) -> SourceFormat {
        SourceFormat::Csv
    }

    fn read(&self, path: &Path) -> Result<Table, ExtractError> {
        let content = read_source(path)?;
        table_from_csv(&content).map_err(|source| ExtractError::Csv {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl TableReader for JsonTableReader {
    fn format(&self) -> SourceFormat {
        SourceFormat::Json
    }

    fn read(&self, path: &Path) -> Result<Table, ExtractError> {
        let content = read_source(path)?;
        let value: JsonValue =
            serde_json::from_str(&content).map_err(|source| ExtractError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        table_from_json(value).map_err(|reason| ExtractError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason,
        })
    }
}

pub fn reader_for_format(format: SourceFormat) -> Box<dyn TableReader> {
    match format {
        SourceFormat::Csv => Box::new(CsvTableReader),
        SourceFormat::Json => Box::new(JsonTableReader),
    }
}

pub fn reader_for_path(path: &Path) -> Result<Box<dyn TableReader>, ExtractError> {
    SourceFormat::from_path(path)
        .map(reader_for_format)
        .ok_or_else(|| ExtractError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: "only .csv and .json files are supported".to_string(),
        })
}

/// Read one source file into a [`Table`]. Failures are logged before they are returned.
pub fn extract_from_file(path: impl AsRef<Path>) -> Result<Table, ExtractError> {
    let path = path.as_ref();
    match extract(path) {
        Ok(table) => {
            debug!(
                path = %path.display(),
                rows = table.len(),
                columns = table.columns().len(),
                "extracted source table"
            );
            Ok(table)
        }
        Err(err) => {
            error!(path = %path.display(), error = %err, "extract failed");
            Err(err)
        }
    }
}

fn extract(path: &Path) -> Result<Table, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::FileNotFound(path.to_path_buf()));
    }
    reader_for_path(path)?.read(path)
}

fn read_source(path: &Path) -> Result<String, ExtractError> {
    fs::read_to_string(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn table_from_csv(content: &str) -> Result<Table, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            if idx == 0 {
                header.trim_start_matches('\u{feff}').to_string()
            } else {
                header.to_string()
            }
        })
        .collect();

    let mut table = Table::new(columns.clone());
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() > columns.len() {
            warn!(
                record = line + 1,
                fields = record.len(),
                columns = columns.len(),
                "csv record has more fields than the header; extra fields ignored"
            );
        }
        let row = columns
            .iter()
            .enumerate()
            .fold(Row::new(), |row, (idx, column)| {
                row.with(column.clone(), csv_cell(record.get(idx)))
            });
        table.push_row(row);
    }
    Ok(table)
}

fn csv_cell(raw: Option<&str>) -> Cell {
    match raw {
        Some(value) if !NA_TOKENS.contains(&value) => Cell::Text(value.to_string()),
        _ => Cell::Null,
    }
}

fn table_from_json(value: JsonValue) -> Result<Table, String> {
    let objects = match value {
        JsonValue::Object(map) => vec![map],
        JsonValue::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| match item {
                JsonValue::Object(map) => Ok(map),
                other => Err(format!(
                    "array element {idx} is {} rather than an object",
                    json_kind(&other)
                )),
            })
            .collect::<Result<Vec<_>, _>>()?,
        other => {
            return Err(format!(
                "top-level JSON {} is neither an object nor an array of objects",
                json_kind(&other)
            ))
        }
    };

    let mut columns: Vec<String> = Vec::new();
    for map in &objects {
        for key in map.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let rows = objects
        .into_iter()
        .map(|map| {
            map.into_iter()
                .fold(Row::new(), |row, (key, value)| row.with(key, json_cell(value)))
        })
        .collect();
    Ok(Table::from_rows(columns, rows))
}

fn json_cell(value: JsonValue) -> Cell {
    match value {
        JsonValue::Null => Cell::Null,
        JsonValue::Bool(b) => Cell::Bool(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Cell::Integer(i),
            None => n.as_f64().map_or(Cell::Null, Cell::Float),
        },
        JsonValue::String(s) => Cell::Text(s),
        nested => Cell::Text(nested.to_string()),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
