//! Source-file module: row extraction and CSV inspection helpers.
//!
//! The batch runner pulls rows through [`extract_rows`]; the CLI uses
//! [`inspect`] for column selection and [`find_csv_files`] for folder-batch
//! mode.

pub mod extract;

pub use extract::{
    extract_rows, find_csv_files, inspect, CsvSummary, SourceError, PREVIEW_ROWS,
};
