use crate::error::{PipelineError, Result};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// A CSV file held in memory as its header plus string rows.
#[derive(Debug, Clone)]
pub struct Table {
    pub path: PathBuf,
    pub headers: StringRecord,
    pub rows: Vec<StringRecord>,
}

impl Table {
    /// Index of `name` in the header, compared case-insensitively.
    pub fn column(&self, name: &str) -> Result<usize> {
        locate_column(&self.headers, name).ok_or_else(|| PipelineError::MissingColumn {
            path: self.path.clone(),
            column: name.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn locate_column(headers: &StringRecord, requested: &str) -> Option<usize> {
    headers
        .iter()
        .position(|name| name.trim().eq_ignore_ascii_case(requested.trim()))
}

/// Reject an empty path before any I/O happens.
pub fn require_path<'a>(path: &'a Path, what: &'static str) -> Result<&'a Path> {
    if path.as_os_str().is_empty() {
        return Err(input_missing(path, what));
    }
    Ok(path)
}

pub fn require_file<'a>(path: &'a Path, what: &'static str) -> Result<&'a Path> {
    if !require_path(path, what)?.is_file() {
        return Err(input_missing(path, what));
    }
    Ok(path)
}

pub fn require_dir<'a>(path: &'a Path, what: &'static str) -> Result<&'a Path> {
    if !require_path(path, what)?.is_dir() {
        return Err(input_missing(path, what));
    }
    Ok(path)
}

fn input_missing(path: &Path, what: &'static str) -> PipelineError {
    PipelineError::InputMissing {
        what,
        path: path.to_path_buf(),
    }
}

pub fn read_table(path: &Path) -> Result<Table> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?);
    }
    Ok(Table {
        path: path.to_path_buf(),
        headers,
        rows,
    })
}

/// Write `headers` and `rows` to `path`, replacing any existing file.
pub fn write_table<'r>(
    path: &Path,
    headers: &StringRecord,
    rows: impl IntoIterator<Item = &'r StringRecord>,
) -> Result<usize> {
    let mut writer = WriterBuilder::new().from_path(path)?;
    writer.write_record(headers)?;
    let mut count = 0;
    for row in rows {
        writer.write_record(row)?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

/// Append `rows` to `path`, writing `headers` first only when the file is new.
/// Returns true when the header was written.
pub fn append_rows<'r>(
    path: &Path,
    headers: &StringRecord,
    rows: impl IntoIterator<Item = &'r StringRecord>,
) -> Result<bool> {
    let is_new = !path.exists();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
    if is_new {
        writer.write_record(headers)?;
    }
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(is_new)
}
