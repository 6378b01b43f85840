//! Row extraction and CSV inspection.
//!
//! The extractor treats the first record of every file as a header and never
//! synthesizes it.  Data records are filtered down to the selected column:
//! records too short to have that column are skipped silently, values are
//! trimmed, and values empty after trimming are dropped.  Source record
//! order is preserved.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Number of data records shown by [`inspect`].
pub const PREVIEW_ROWS: usize = 10;

// ---------------------------------------------------------------------------
// SourceError
// ---------------------------------------------------------------------------

/// Errors raised while reading source files.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The file could not be opened or decoded as delimited UTF-8 text.
    #[error("cannot read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A directory scan failed.
    #[error("cannot list {}: {source}", .path.display())]
    Dir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Row extraction
// ---------------------------------------------------------------------------

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, SourceError> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|source| SourceError::Unreadable {
            path: path.to_path_buf(),
            source,
        })
}

/// Extract the trimmed, non-empty values of one column, in record order.
///
/// The header record is always discarded, even when it is empty.  Records
/// with fewer than `column_index + 1` fields are skipped, not errored.
pub fn extract_rows(path: &Path, column_index: usize) -> Result<Vec<String>, SourceError> {
    let mut reader = open_reader(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| SourceError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let Some(field) = record.get(column_index) else {
            continue;
        };
        let text = field.trim();
        if !text.is_empty() {
            rows.push(text.to_string());
        }
    }

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

/// Header names plus the first few data records of a source file, gathered
/// so a caller can pick a column before starting a run.
#[derive(Debug, Clone, Default)]
pub struct CsvSummary {
    pub headers: Vec<String>,
    pub preview: Vec<Vec<String>>,
}

impl CsvSummary {
    /// The trimmed, non-empty preview values of one column, joined with
    /// blank lines — the text a preview synthesis call would speak.
    pub fn preview_text(&self, column_index: usize) -> String {
        self.preview
            .iter()
            .filter_map(|row| row.get(column_index))
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Read a source file's headers and up to [`PREVIEW_ROWS`] data records.
pub fn inspect(path: &Path) -> Result<CsvSummary, SourceError> {
    let mut reader = open_reader(path)?;

    let unreadable = |source| SourceError::Unreadable {
        path: path.to_path_buf(),
        source,
    };

    let headers = reader
        .headers()
        .map_err(unreadable)?
        .iter()
        .map(String::from)
        .collect();

    let mut preview = Vec::new();
    for record in reader.records().take(PREVIEW_ROWS) {
        let record = record.map_err(unreadable)?;
        preview.push(record.iter().map(String::from).collect());
    }

    Ok(CsvSummary { headers, preview })
}

// ---------------------------------------------------------------------------
// Directory scan
// ---------------------------------------------------------------------------

/// All `*.csv` files (case-insensitive extension) directly inside `dir`,
/// sorted by path.
pub fn find_csv_files(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let to_dir_err = |source| SourceError::Dir {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(to_dir_err)? {
        let path = entry.map_err(to_dir_err)?.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
