use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::date::RunKey;
use crate::namer::types::{Branch, QualityTag, TransferRecord};

/// Build the canonical file name for a record.
///
/// Single: `{run_key}-{set}-{base}_{tag}_{index}{ext}`
/// Multi: `{run_key}-{stop}-{set}-{base}_{tag}_{index}{ext}`
///
/// Returns `None` if the record has no parsed index.
#[must_use]
pub fn compose_name(record: &TransferRecord, tag: QualityTag, run_key: &RunKey) -> Option<String> {
    let parsed = record.parsed.as_ref()?;
    let prefix = match &record.branch {
        Branch::Single => format!("{run_key}-{}", record.set_id),
        Branch::Multi { stop_id } => format!("{run_key}-{stop_id}-{}", record.set_id),
    };
    Some(format!(
        "{prefix}-{}_{tag}_{}{}",
        parsed.base, parsed.index, parsed.extension
    ))
}

/// Output directory for an index: `{out_root}/{run_key}/{index}`
#[must_use]
pub fn compose_output_dir(out_root: &Path, run_key: &RunKey, index: &str) -> PathBuf {
    out_root.join(run_key.as_str()).join(index)
}

/// Output directories already created during this run.
#[derive(Debug, Default)]
pub struct OutputDirs {
    created: HashSet<PathBuf>,
}

impl OutputDirs {
    /// Create the directory once, later calls for the same path do nothing.
    pub fn ensure(&mut self, dir: &Path) -> io::Result<()> {
        if self.created.contains(dir) {
            return Ok(());
        }
        fs::create_dir_all(dir)?;
        self.created.insert(dir.to_path_buf());
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.created.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }
}
