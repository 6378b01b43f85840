//! Export stage: copy previously produced audio files to a destination
//! directory chosen after the run.

use std::path::Path;

use thiserror::Error;

use crate::batch::ResultRecord;

/// Errors raised while exporting produced files.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot create export directory {}: {source}", .path.display())]
    CreateDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to copy {}: {source}", .path.display())]
    Copy {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Copy every record's output file (by base name) into `dest_dir`, creating
/// it if needed, and return the number of files copied.
///
/// Records whose output file no longer exists are skipped, not errored.
pub fn export_results(results: &[ResultRecord], dest_dir: &Path) -> Result<usize, ExportError> {
    std::fs::create_dir_all(dest_dir).map_err(|source| ExportError::CreateDir {
        path: dest_dir.to_path_buf(),
        source,
    })?;

    let mut copied = 0;
    for record in results {
        if !record.output_path.exists() {
            log::warn!(
                "skipping missing output file {}",
                record.output_path.display()
            );
            continue;
        }
        let Some(file_name) = record.output_path.file_name() else {
            continue;
        };

        std::fs::copy(&record.output_path, dest_dir.join(file_name)).map_err(|source| {
            ExportError::Copy {
                path: record.output_path.clone(),
                source,
            }
        })?;
        copied += 1;
    }

    Ok(copied)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
