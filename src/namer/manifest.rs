use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::namer::types::Outcome;

pub const MANIFEST_FILE_NAME: &str = "_manifest.csv";

const MANIFEST_HEADER: [&str; 4] = ["src", "dest", "status", "reason"];

/// Terminal status of one manifest row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Ok,
    Skip,
    Error,
}

/// One row of the run manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    pub src: String,
    /// Empty for skipped records.
    pub dest: String,
    pub status: RowStatus,
    pub reason: String,
}

/// Append-only list of manifest rows, written once at the end of a run.
#[derive(Debug, Default)]
pub struct Manifest {
    rows: Vec<ManifestRow>,
}

impl RowStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Skip => "SKIP",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ManifestRow {
    #[must_use]
    pub fn from_outcome(source: &Path, outcome: &Outcome) -> Self {
        let src = crate::path_to_string(source);
        match outcome {
            Outcome::Transferred { destination, action } => Self {
                src,
                dest: crate::path_to_string(destination),
                status: RowStatus::Ok,
                reason: action.as_str().to_string(),
            },
            Outcome::Skipped(reason) => Self {
                src,
                dest: String::new(),
                status: RowStatus::Skip,
                reason: reason.to_string(),
            },
            Outcome::Failed { destination, error } => Self {
                src,
                dest: crate::path_to_string(destination),
                status: RowStatus::Error,
                reason: format!("transfer_failed:{error}"),
            },
        }
    }
}

impl Manifest {
    pub fn push(&mut self, row: ManifestRow) {
        self.rows.push(row);
    }

    #[must_use]
    pub fn rows(&self) -> &[ManifestRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write all rows as UTF-8 CSV with a `src,dest,status,reason` header.
    ///
    /// The parent directory is created if needed.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create manifest directory: {}", parent.display()))?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_path(path)
            .with_context(|| format!("Failed to create manifest: {}", path.display()))?;

        writer.write_record(MANIFEST_HEADER)?;
        for row in &self.rows {
            writer.write_record([row.src.as_str(), row.dest.as_str(), row.status.as_str(), row.reason.as_str()])?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
        Ok(())
    }

    /// Count rows marked OK whose destination is not a file anymore.
    #[must_use]
    pub fn count_missing_after_ok(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.status == RowStatus::Ok)
            .filter(|row| row.dest.is_empty() || !Path::new(&row.dest).is_file())
            .count()
    }
}
