use std::io::{Cursor, Read};
use std::path::Path;

use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use zip::ZipArchive;

use crate::table::{Table, Value};
use crate::RECORD_EXTENSION;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid archive: {0}")]
    InvalidArchive(#[from] zip::result::ZipError),
    #[error("Malformed archive entry {entry}: {message}")]
    MalformedArchiveEntry { entry: String, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;

/// Upper bound on the buffer reserved up front for one entry. The declared
/// size comes from the archive and is not trusted beyond this.
const MAX_ENTRY_PREALLOC: u64 = 64 << 20;

/// What an ingestion run saw in the archive.
#[derive(Debug, Default, Clone)]
pub struct IngestReport {
    /// Total entries in the archive, directories included.
    pub entries_total: usize,
    /// Record entries read, with the number of records each contributed.
    pub entries_read: Vec<(String, usize)>,
    /// Entries skipped because they are not record files.
    pub entries_ignored: Vec<String>,
}

impl IngestReport {
    pub fn records(&self) -> usize {
        self.entries_read.iter().map(|(_, n)| n).sum()
    }
}

/// Read every `.json` entry of an in-memory zip archive into one table.
///
/// Each record becomes one row; nested objects are flattened into dotted
/// column names. Columns are the union of all fields seen. An archive
/// without record entries yields an empty table, not an error.
pub fn ingest(archive_bytes: &[u8]) -> Result<Table> {
    ingest_with_report(archive_bytes).map(|(table, _)| table)
}

/// Like [`ingest`], also returning what was read and skipped.
pub fn ingest_with_report(archive_bytes: &[u8]) -> Result<(Table, IngestReport)> {
    let mut archive = ZipArchive::new(Cursor::new(archive_bytes))?;
    let mut table = Table::new();
    let mut report = IngestReport {
        entries_total: archive.len(),
        ..Default::default()
    };

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();

        if entry.is_dir() {
            continue;
        }
        if !is_record_entry(&name) {
            report.entries_ignored.push(name);
            continue;
        }

        let mut contents = Vec::with_capacity(entry.size().min(MAX_ENTRY_PREALLOC) as usize);
        entry
            .read_to_end(&mut contents)
            .map_err(|e| IngestError::MalformedArchiveEntry {
                entry: name.clone(),
                message: e.to_string(),
            })?;

        let records = parse_records(&name, &contents)?;
        let count = records.len();
        for record in records {
            table.push_row(flatten_record(record));
        }
        report.entries_read.push((name, count));
    }

    Ok((table, report))
}

/// Read an archive from disk and ingest it.
pub fn ingest_file(path: &Path) -> Result<Table> {
    let bytes = std::fs::read(path)?;
    ingest(&bytes)
}

/// Entry names are matched on the `.json` suffix only, case-insensitively.
pub fn is_record_entry(name: &str) -> bool {
    name.to_ascii_lowercase()
        .strip_suffix(RECORD_EXTENSION)
        .is_some_and(|stem| stem.ends_with('.'))
}

/// Parse an entry as either a JSON array of record objects or a single object.
fn parse_records(entry: &str, contents: &[u8]) -> Result<Vec<Map<String, JsonValue>>> {
    let malformed = |message: String| IngestError::MalformedArchiveEntry {
        entry: entry.to_string(),
        message,
    };

    // Exports written on Windows sometimes carry a UTF-8 BOM
    let contents = contents.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(contents);

    let parsed: JsonValue =
        serde_json::from_slice(contents).map_err(|e| malformed(e.to_string()))?;

    match parsed {
        JsonValue::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                JsonValue::Object(record) => Ok(record),
                other => Err(malformed(format!(
                    "record {i} is not an object (found {})",
                    json_kind(&other)
                ))),
            })
            .collect(),
        JsonValue::Object(record) => Ok(vec![record]),
        other => Err(malformed(format!(
            "expected an array of records, found {}",
            json_kind(&other)
        ))),
    }
}

/// Flatten one record into (column, value) pairs. Nested objects expand into
/// `parent.child` names; arrays stay opaque.
pub fn flatten_record(record: Map<String, JsonValue>) -> Vec<(String, Value)> {
    let mut out = Vec::with_capacity(record.len());
    flatten_into(None, record, &mut out);
    out
}

fn flatten_into(prefix: Option<&str>, object: Map<String, JsonValue>, out: &mut Vec<(String, Value)>) {
    for (key, value) in object {
        let name = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key,
        };
        match value {
            JsonValue::Object(inner) => flatten_into(Some(&name), inner, out),
            leaf => out.push((name, Value::from_json(leaf))),
        }
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
