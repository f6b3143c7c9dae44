//! CSV encoding and decoding of [`TabularBuffer`]s.
//!
//! Files are comma-separated UTF-8 with a mandatory header row. Fields holding
//! the delimiter, a quote or a line break are quoted and inner quotes doubled.
//! NULL is written as an empty field, and an empty field reads back as NULL,
//! so an empty string does not survive a file round trip: it comes back NULL.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use csv::{ErrorKind, ReaderBuilder, WriterBuilder};

use super::TabularBuffer;
use crate::error::{GatewayError, Result};
use crate::store::Value;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes `buffer` to `path` and returns the number of data rows written.
///
/// The file is written next to `path` under a temporary name and renamed into
/// place once complete.
pub fn write_delimited(buffer: &TabularBuffer, path: &Path) -> Result<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            GatewayError::write_failed(format!("cannot create {}: {e}", parent.display()))
        })?;
    }

    let temp = temp_path(path);
    let result = write_to(buffer, &temp).and_then(|written| {
        fs::rename(&temp, path).map_err(|e| {
            GatewayError::write_failed(format!("cannot move file to {}: {e}", path.display()))
        })?;
        Ok(written)
    });

    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

fn write_to(buffer: &TabularBuffer, path: &Path) -> Result<u64> {
    let write_err =
        |e: csv::Error| GatewayError::write_failed(format!("{}: {e}", path.display()));

    let mut writer = WriterBuilder::new().from_path(path).map_err(write_err)?;
    writer.write_record(buffer.columns()).map_err(write_err)?;

    let mut written = 0u64;
    for row in buffer.rows() {
        writer
            .write_record(row.iter().map(|v| v.to_field().unwrap_or_default()))
            .map_err(write_err)?;
        written += 1;
    }

    writer
        .flush()
        .map_err(|e| GatewayError::write_failed(format!("{}: {e}", path.display())))?;
    Ok(written)
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.{}.{seq}.tmp", std::process::id()))
}

/// Reads a CSV document with a header row into a buffer of text values.
pub fn read_delimited<R: Read>(reader: R) -> Result<TabularBuffer> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let header: Vec<String> = reader
        .headers()
        .map_err(map_read_error)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if header.is_empty() || header.iter().all(String::is_empty) {
        return Err(GatewayError::parse_failed("file has no header row"));
    }
    if let Some(blank) = header.iter().position(String::is_empty) {
        return Err(GatewayError::parse_failed(format!(
            "header column {} is empty",
            blank + 1
        )));
    }
    for (i, name) in header.iter().enumerate() {
        if header[..i].contains(name) {
            return Err(GatewayError::parse_failed(format!(
                "header column '{name}' appears more than once"
            )));
        }
    }

    let mut buffer = TabularBuffer::new(header);
    for record in reader.records() {
        let record = record.map_err(map_read_error)?;
        let row = record
            .iter()
            .map(|field| {
                if field.is_empty() {
                    Value::Null
                } else {
                    Value::String(field.to_string())
                }
            })
            .collect();
        buffer.push_row(row)?;
    }
    Ok(buffer)
}

/// Reads a CSV file from disk.
pub fn read_delimited_file(path: &Path) -> Result<TabularBuffer> {
    let file = fs::File::open(path)
        .map_err(|e| GatewayError::read_failed(format!("{}: {e}", path.display())))?;
    read_delimited(file)
}

fn map_read_error(error: csv::Error) -> GatewayError {
    let line = error
        .position()
        .map(|p| format!(" (line {})", p.line()))
        .unwrap_or_default();
    match error.kind() {
        ErrorKind::Io(e) => GatewayError::read_failed(e.to_string()),
        ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => GatewayError::parse_failed(format!(
            "record has {len} fields, header has {expected_len}{line}"
        )),
        ErrorKind::Utf8 { .. } => {
            GatewayError::parse_failed(format!("file is not valid UTF-8{line}"))
        }
        _ => GatewayError::parse_failed(format!("{error}")),
    }
}
