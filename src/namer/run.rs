use std::collections::HashMap;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::date::{self, RunKey};
use crate::namer::compose::{OutputDirs, compose_name, compose_output_dir};
use crate::namer::config::NamerSettings;
use crate::namer::logger::FileLogger;
use crate::namer::manifest::{MANIFEST_FILE_NAME, Manifest, ManifestRow};
use crate::namer::quality::{QualityIndex, build_quality_index, sample_file_names};
use crate::namer::stats::{RunStats, SharedStats};
use crate::namer::transfer::{Copier, TransferEngine};
use crate::namer::types::{Branch, Mode, Outcome, QualityTag, SetKey, SkipReason, TransferRecord};
use crate::namer::walk::{SINGLE_DIR_NAME, enumerate_b_files, find_child_dir_ignore_case};

/// Number of file names attached to an `empty_set` skip.
const EMPTY_SET_SAMPLES: usize = 3;

/// Default capacity of the progress message channel.
pub const DEFAULT_MESSAGE_CAPACITY: usize = 1024;

/// Roots and mode for one run, as given by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// One date folder of the B tree.
    pub b_date_root: PathBuf,
    /// Folder containing A date folders, or an A date folder itself.
    pub a_root: PathBuf,
    pub mode: Mode,
}

/// Failures that abort a run before any file is touched.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("{role} directory does not exist: {}", path.display())]
    MissingDirectory { role: &'static str, path: PathBuf },

    #[error("Not a date folder, expected YYMMDD or YYYYMMDD: {0}")]
    NotDateFolder(String),

    #[error("No date folder matching {run_key} under {}", a_root.display())]
    DateFolderNotFound { a_root: PathBuf, run_key: RunKey },

    #[error("Date mismatch: B folder is {b_key} but A folder is {a_key}")]
    RunKeyMismatch { b_key: RunKey, a_key: RunKey },

    #[error("No files to process under {}", .0.display())]
    NoFiles(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Validated run: resolved roots and the full list of records.
#[derive(Debug)]
pub struct RunPlan {
    run_key: RunKey,
    b_date_root: PathBuf,
    a_date_root: PathBuf,
    a_single_dir: PathBuf,
    mode: Mode,
    records: Vec<TransferRecord>,
}

/// Handles shared between a running [`Namer`] and its front end.
#[derive(Debug, Clone)]
pub struct RunControl {
    stats: Arc<SharedStats>,
    messages: SyncSender<String>,
    cancel: Arc<AtomicBool>,
}

/// Final result of a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stats: RunStats,
    /// `None` if the manifest could not be written.
    pub manifest_path: Option<PathBuf>,
    pub warnings: Vec<String>,
    pub elapsed: Duration,
}

/// Drives every record of a [`RunPlan`] through lookup, naming and transfer.
pub struct Namer {
    plan: RunPlan,
    settings: NamerSettings,
    engine: TransferEngine,
    logger: Option<FileLogger>,
    sets: HashMap<SetKey, SetLookup>,
    output_dirs: OutputDirs,
    manifest: Manifest,
}

/// A background run started with [`spawn`].
pub struct RunHandle {
    stats: Arc<SharedStats>,
    messages: Receiver<String>,
    cancel: Arc<AtomicBool>,
    worker: JoinHandle<RunReport>,
}

/// Cached state of one A-side set folder.
#[derive(Debug)]
struct SetLookup {
    exists: bool,
    index: QualityIndex,
    samples: Vec<String>,
}

/// Sets the done flag when dropped, so it flips even if the worker panics.
struct MarkDone<'a>(&'a SharedStats);

impl Drop for MarkDone<'_> {
    fn drop(&mut self) {
        self.0.mark_done();
    }
}

impl RunPlan {
    /// Validate the roots, resolve the A date folder and list the B files.
    pub fn prepare(request: RunRequest, settings: &NamerSettings) -> Result<Self, SetupError> {
        let RunRequest {
            b_date_root,
            a_root,
            mode,
        } = request;

        require_dir("B date", &b_date_root)?;
        require_dir("A root", &a_root)?;
        if let Mode::Sorted { out_root, .. } = &mode {
            require_dir("Output", out_root)?;
        }

        let b_name = crate::path_to_filename_string(&b_date_root);
        let run_key = RunKey::from_folder_name(&b_name).ok_or(SetupError::NotDateFolder(b_name))?;
        let a_date_root = resolve_a_date_root(&a_root, &run_key, settings.allow_date_mismatch)?;

        let a_single_dir = find_child_dir_ignore_case(&a_date_root, SINGLE_DIR_NAME)
            .map_err(|source| SetupError::Io {
                path: a_date_root.clone(),
                source,
            })?
            .unwrap_or_else(|| a_date_root.join("Single"));

        let records = enumerate_b_files(&b_date_root, settings.sort).map_err(|source| SetupError::Io {
            path: b_date_root.clone(),
            source,
        })?;
        if records.is_empty() {
            return Err(SetupError::NoFiles(b_date_root));
        }

        Ok(Self {
            run_key,
            b_date_root,
            a_date_root,
            a_single_dir,
            mode,
            records,
        })
    }

    #[must_use]
    pub const fn run_key(&self) -> &RunKey {
        &self.run_key
    }

    #[must_use]
    pub fn b_date_root(&self) -> &Path {
        &self.b_date_root
    }

    #[must_use]
    pub fn a_date_root(&self) -> &Path {
        &self.a_date_root
    }

    #[must_use]
    pub const fn mode(&self) -> &Mode {
        &self.mode
    }

    #[must_use]
    pub fn records(&self) -> &[TransferRecord] {
        &self.records
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.records.len()
    }

    /// `{out_root}/{run_key}/_manifest.csv`, or `{b_date_root}/_manifest.csv` when renaming in place.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        match &self.mode {
            Mode::Sorted { out_root, .. } => out_root.join(self.run_key.as_str()).join(MANIFEST_FILE_NAME),
            Mode::InPlace => self.b_date_root.join(MANIFEST_FILE_NAME),
        }
    }

    /// A-side set folder matching the record.
    #[must_use]
    pub fn a_set_dir(&self, record: &TransferRecord) -> PathBuf {
        match &record.branch {
            Branch::Single => self.a_single_dir.join(&record.set_id),
            Branch::Multi { stop_id } => self.a_date_root.join(stop_id).join(&record.set_id),
        }
    }
}

impl RunControl {
    /// Create control handles for a run of `total` records,
    /// returning the receiving end of the progress messages.
    #[must_use]
    pub fn new(total: usize, capacity: usize) -> (Self, Receiver<String>) {
        let (sender, receiver) = mpsc::sync_channel(capacity.max(1));
        let control = Self {
            stats: Arc::new(SharedStats::new(total)),
            messages: sender,
            cancel: Arc::new(AtomicBool::new(false)),
        };
        (control, receiver)
    }

    #[must_use]
    pub const fn stats(&self) -> &Arc<SharedStats> {
        &self.stats
    }

    /// Request cancellation. Records not yet started are skipped.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Queue a progress message, dropping it if the queue is full or nobody listens.
    pub fn send(&self, message: String) {
        let _ = self.messages.try_send(message);
    }
}

impl Namer {
    #[must_use]
    pub fn new(plan: RunPlan, settings: NamerSettings) -> Self {
        let engine = TransferEngine::new(settings.transfer);
        Self {
            plan,
            settings,
            engine,
            logger: None,
            sets: HashMap::new(),
            output_dirs: OutputDirs::default(),
            manifest: Manifest::default(),
        }
    }

    /// Write SKIP and ERROR records and the final statistics to a run log.
    #[must_use]
    pub fn with_logger(mut self, logger: FileLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Use a custom copier for the copy stage of transfers.
    #[must_use]
    pub fn with_copier(mut self, copier: Box<dyn Copier>) -> Self {
        self.engine = TransferEngine::with_copier(self.settings.transfer, copier);
        self
    }

    #[must_use]
    pub const fn plan(&self) -> &RunPlan {
        &self.plan
    }

    /// Process every record in order and write the manifest.
    ///
    /// Per-record failures end up in the manifest and counters, so this always
    /// reaches the done state.
    pub fn run(mut self, control: &RunControl) -> RunReport {
        let start = Instant::now();
        let stats = control.stats();
        let _done = MarkDone(stats);
        let total = self.plan.total();
        let records = mem::take(&mut self.plan.records);
        let mut warnings = Vec::new();

        if let Some(logger) = &mut self.logger {
            logger.log_init(&self.plan, &self.settings);
        }

        let mut cancelled = false;
        for (position, record) in records.iter().enumerate() {
            if !cancelled && control.is_cancelled() {
                cancelled = true;
                let warning = format!("Cancelled, skipping remaining {} file(s)", total - position);
                self.warn(control, &mut warnings, warning);
            }

            let outcome = if cancelled {
                Outcome::Skipped(SkipReason::Cancelled)
            } else {
                self.process_record(record)
            };

            stats.record(&outcome);
            self.report(control, record, &outcome);
            if let Some(logger) = &mut self.logger {
                logger.log_outcome(&record.source, &outcome);
            }
            self.manifest.push(ManifestRow::from_outcome(&record.source, &outcome));
        }

        let manifest_path = self.plan.manifest_path();
        let manifest_path = match self.manifest.write(&manifest_path) {
            Ok(()) => Some(manifest_path),
            Err(error) => {
                self.warn(control, &mut warnings, format!("Failed to write manifest: {error:#}"));
                None
            }
        };

        let missing = self.manifest.count_missing_after_ok();
        stats.set_missing_after_ok(missing);
        if missing > 0 {
            self.warn(
                control,
                &mut warnings,
                format!("{missing} file(s) marked OK are missing, check the manifest"),
            );
        }

        stats.mark_done();
        let elapsed = start.elapsed();
        let snapshot = stats.snapshot();
        if let Some(logger) = &mut self.logger {
            logger.log_stats(&snapshot, elapsed);
        }

        RunReport {
            stats: snapshot,
            manifest_path,
            warnings,
            elapsed,
        }
    }

    fn process_record(&mut self, record: &TransferRecord) -> Outcome {
        let Some(parsed) = &record.parsed else {
            return Outcome::Skipped(SkipReason::NoNumber);
        };

        let tag = match self.set_lookup(record).resolve(&parsed.index) {
            Ok(tag) => tag,
            Err(reason) => return Outcome::Skipped(reason),
        };

        let Some(file_name) = compose_name(record, tag, &self.plan.run_key) else {
            return Outcome::Skipped(SkipReason::NoNumber);
        };

        let dir = match &self.plan.mode {
            Mode::Sorted { out_root, .. } => {
                let dir = compose_output_dir(out_root, &self.plan.run_key, &parsed.index);
                if let Err(error) = self.output_dirs.ensure(&dir) {
                    return Outcome::Failed {
                        destination: dir.join(&file_name),
                        error: format!("Failed to create {}: {error}", dir.display()),
                    };
                }
                dir
            }
            Mode::InPlace => record
                .source
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
        };

        let destination = crate::namer::transfer::unique_destination(&dir.join(file_name));
        match self
            .engine
            .transfer(self.plan.mode.discipline(), &record.source, &destination)
        {
            Ok(()) => Outcome::Transferred {
                destination,
                action: self.plan.mode.action(),
            },
            Err(error) => Outcome::Failed {
                destination,
                error: format!("{error:#}"),
            },
        }
    }

    /// Cached lookup for the record's A-side set, built on first use.
    fn set_lookup(&mut self, record: &TransferRecord) -> &SetLookup {
        let set_dir = self.plan.a_set_dir(record);
        self.sets
            .entry(record.set_key())
            .or_insert_with(|| SetLookup::build(&set_dir))
    }

    fn report(&self, control: &RunControl, record: &TransferRecord, outcome: &Outcome) {
        let name = crate::get_relative_path_or_filename(&record.source, self.plan.b_date_root());
        match outcome {
            Outcome::Transferred { .. } | Outcome::Skipped(SkipReason::Cancelled) => {}
            Outcome::Skipped(reason) => control.send(format!("Skipped {name}: {reason}")),
            Outcome::Failed { error, .. } => control.send(format!("Failed {name}: {error}")),
        }

        let snapshot = control.stats().snapshot();
        if snapshot.processed % self.settings.message_every.max(1) == 0 {
            control.send(format!(
                "Processed {}/{} | succeeded {} | skipped {} | errors {}",
                snapshot.processed,
                snapshot.total,
                snapshot.succeeded,
                snapshot.skipped(),
                snapshot.transfer_errors
            ));
        }
    }

    fn warn(&mut self, control: &RunControl, warnings: &mut Vec<String>, warning: String) {
        if let Some(logger) = &mut self.logger {
            logger.log_warning(&warning);
        }
        control.send(warning.clone());
        warnings.push(warning);
    }
}

impl SetLookup {
    fn build(set_dir: &Path) -> Self {
        let exists = set_dir.is_dir();
        let index = build_quality_index(set_dir);
        let samples = if exists && index.is_empty() {
            sample_file_names(set_dir, EMPTY_SET_SAMPLES)
        } else {
            Vec::new()
        };
        Self { exists, index, samples }
    }

    /// Tag for the index, or the reason the set cannot provide one.
    fn resolve(&self, index: &str) -> Result<QualityTag, SkipReason> {
        if !self.exists {
            return Err(SkipReason::NoSetDir);
        }
        if self.index.is_empty() {
            return Err(SkipReason::EmptySet {
                samples: self.samples.clone(),
            });
        }
        self.index.get(index).ok_or(SkipReason::NoQualityTag)
    }
}

impl RunHandle {
    #[must_use]
    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }

    #[must_use]
    pub const fn messages(&self) -> &Receiver<String> {
        &self.messages
    }

    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the worker and return its report.
    pub fn join(self) -> anyhow::Result<RunReport> {
        self.worker
            .join()
            .map_err(|_| anyhow::anyhow!("Namer worker thread panicked"))
    }
}

/// Run the namer on a background thread.
pub fn spawn(namer: Namer, capacity: usize) -> io::Result<RunHandle> {
    let (control, messages) = RunControl::new(namer.plan().total(), capacity);
    let stats = Arc::clone(control.stats());
    let cancel = control.cancel_flag();
    let worker = thread::Builder::new()
        .name("namer".to_string())
        .spawn(move || namer.run(&control))?;

    Ok(RunHandle {
        stats,
        messages,
        cancel,
        worker,
    })
}

fn require_dir(role: &'static str, path: &Path) -> Result<(), SetupError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(SetupError::MissingDirectory {
            role,
            path: path.to_path_buf(),
        })
    }
}

/// Find the A date folder for the run key.
///
/// Falls back to `a_root` itself when it is a date folder.
fn resolve_a_date_root(a_root: &Path, run_key: &RunKey, allow_mismatch: bool) -> Result<PathBuf, SetupError> {
    let found = date::find_date_folder(a_root, run_key).map_err(|source| SetupError::Io {
        path: a_root.to_path_buf(),
        source,
    })?;
    if let Some(path) = found {
        return Ok(path);
    }

    match RunKey::from_folder_name(&crate::path_to_filename_string(a_root)) {
        Some(a_key) if a_key == *run_key || allow_mismatch => Ok(a_root.to_path_buf()),
        Some(a_key) => Err(SetupError::RunKeyMismatch {
            b_key: run_key.clone(),
            a_key,
        }),
        None => Err(SetupError::DateFolderNotFound {
            a_root: a_root.to_path_buf(),
            run_key: run_key.clone(),
        }),
    }
}
