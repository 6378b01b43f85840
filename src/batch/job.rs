//! Job and result-record types for batch runs.

use std::path::PathBuf;

use serde::Serialize;

use crate::speech::OutputFormat;

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One requested (source file, column, voice/model/format) unit of batch
/// work.  Immutable once constructed; one job produces zero or more
/// [`ResultRecord`]s.
#[derive(Debug, Clone)]
pub struct Job {
    /// Delimited-text source file.
    pub source_path: PathBuf,
    /// Zero-based index of the column to synthesize.
    pub column_index: usize,
    /// Voice identifier sent with every request of this job.
    pub voice: String,
    /// Model identifier sent with every request of this job.
    pub model: String,
    /// Optional voice style instructions (advanced model only).
    pub instructions: Option<String>,
    /// Directory that receives the produced audio files.
    pub output_dir: PathBuf,
    /// Audio container format for produced files.
    pub format: OutputFormat,
}

impl Job {
    /// The source file's name, for progress messages.
    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned()
    }

    /// Destination path for the row with 1-based sequence number `seq`:
    /// `{output_dir}/{source_stem}_{seq}.{ext}`.
    ///
    /// Jobs sharing a source stem and output directory overwrite each
    /// other's files — a documented limitation.
    pub fn output_path(&self, seq: usize) -> PathBuf {
        let stem = self
            .source_path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy();
        self.output_dir
            .join(format!("{stem}_{seq}.{}", self.format.extension()))
    }
}

// ---------------------------------------------------------------------------
// ResultRecord
// ---------------------------------------------------------------------------

/// Record of one successfully synthesized row's input/output mapping.
///
/// Created exactly once per success; the full ordered sequence is the
/// terminal output of a batch run and the input of the export stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub text: String,
    pub voice: String,
    pub model: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
