use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;

use crate::namer::config::NamerSettings;
use crate::namer::run::RunPlan;
use crate::namer::stats::RunStats;
use crate::namer::types::Outcome;

/// Simple file logger for a run with buffered writes.
///
/// Write errors are ignored so logging never affects the run itself.
pub struct FileLogger {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl FileLogger {
    /// Create a new file logger, writing to `~/logs/image-namer/namer_<timestamp>.log`
    pub fn new() -> Result<Self> {
        let log_dir = crate::config::log_dir().context("Failed to get home directory")?;
        if !log_dir.exists() {
            fs::create_dir_all(&log_dir).context("Failed to create log directory")?;
        }

        let log_path = log_dir.join(format!("namer_{}.log", Local::now().format("%Y-%m-%d_%H-%M-%S")));
        Self::with_path(log_path)
    }

    /// Create a file logger that appends to the given file.
    pub fn with_path(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to create log file: {}", path.display()))?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn timestamp() -> String {
        Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Log the resolved run before processing starts
    pub fn log_init(&mut self, plan: &RunPlan, settings: &NamerSettings) {
        let _ = writeln!(
            self.writer,
            "[{}] INIT \"{}\"",
            Self::timestamp(),
            plan.b_date_root().display()
        );
        let _ = writeln!(self.writer, "  run_key: {}", plan.run_key());
        let _ = writeln!(self.writer, "  a_date_root: {}", plan.a_date_root().display());
        let _ = writeln!(self.writer, "  mode: {}", plan.mode());
        let _ = writeln!(self.writer, "  files: {}", plan.total());
        let _ = writeln!(self.writer, "  retry_attempts: {}", settings.transfer.retry_attempts);
        let _ = writeln!(self.writer, "  verify_size: {}", settings.transfer.verify_size);
        let _ = writeln!(self.writer, "  fsync: {}", settings.transfer.fsync);
        let _ = writeln!(self.writer, "  sort: {}", settings.sort);
        let _ = self.writer.flush();
    }

    /// Log a record that was skipped or failed. Successful transfers are only in the manifest.
    pub fn log_outcome(&mut self, source: &Path, outcome: &Outcome) {
        match outcome {
            Outcome::Transferred { .. } => return,
            Outcome::Skipped(reason) => {
                let _ = writeln!(
                    self.writer,
                    "[{}] SKIP    \"{}\" | {reason}",
                    Self::timestamp(),
                    source.display()
                );
            }
            Outcome::Failed { destination, error } => {
                let _ = writeln!(
                    self.writer,
                    "[{}] ERROR   \"{}\" -> \"{}\" | {error}",
                    Self::timestamp(),
                    source.display(),
                    destination.display()
                );
            }
        }
        let _ = self.writer.flush();
    }

    pub fn log_warning(&mut self, message: &str) {
        let _ = writeln!(self.writer, "[{}] WARNING {message}", Self::timestamp());
        let _ = self.writer.flush();
    }

    /// Log final statistics
    pub fn log_stats(&mut self, stats: &RunStats, elapsed: Duration) {
        let _ = writeln!(self.writer, "[{}] STATISTICS", Self::timestamp());
        let _ = writeln!(self.writer, "  Total:            {}", stats.total);
        let _ = writeln!(self.writer, "  Succeeded:        {}", stats.succeeded);
        let _ = writeln!(self.writer, "  Skipped:          {}", stats.skipped());
        if stats.skipped() > 0 {
            let _ = writeln!(self.writer, "    - No number:      {}", stats.skip_no_number);
            let _ = writeln!(self.writer, "    - No set folder:  {}", stats.skip_no_set_dir);
            let _ = writeln!(self.writer, "    - Empty set:      {}", stats.skip_empty_set);
            let _ = writeln!(self.writer, "    - No quality tag: {}", stats.skip_no_quality_tag);
            let _ = writeln!(self.writer, "    - Cancelled:      {}", stats.skip_cancelled);
        }
        let _ = writeln!(self.writer, "  Transfer errors:  {}", stats.transfer_errors);
        let _ = writeln!(self.writer, "  Missing after OK: {}", stats.missing_after_ok);
        let _ = writeln!(self.writer, "  Total time: {}", crate::format_duration(elapsed));
        let _ = writeln!(self.writer, "[{}] END", Self::timestamp());
        let _ = self.writer.flush();
    }
}
