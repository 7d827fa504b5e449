//! Append-only CSV log of submitted records and their predictions

use crate::types::Table;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Durable log of every scored submission.
///
/// Rows are only ever appended. Columns that are entirely empty are stripped
/// before writing, and the header is written only when the file is new.
/// Appends are serialized so concurrent requests never interleave rows.
pub struct SubmissionLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SubmissionLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the rows of `table`. Returns the number of rows written.
    pub fn append(&self, table: &Table) -> Result<usize> {
        let mut table = table.clone();
        table.drop_empty_columns();
        if table.row_count() == 0 || table.column_count() == 0 {
            return Ok(0);
        }

        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let is_new = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open submission log {}", self.path.display()))?;

        table
            .write_csv(BufWriter::new(file), is_new)
            .with_context(|| format!("Failed to append to submission log {}", self.path.display()))?;

        debug!(
            path = %self.path.display(),
            rows = table.row_count(),
            header = is_new,
            "Submission appended"
        );

        Ok(table.row_count())
    }
}
