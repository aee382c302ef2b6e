//! Atomic copy and move of a single file.
//!
//! Copies go through a `.part` file next to the destination.
//! The temporary file is size checked and synced before it is renamed to the final name,
//! so the destination either does not exist or holds the complete file.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::namer::types::TransferDiscipline;

/// Suffix appended to the destination file name while copying.
pub const TEMP_SUFFIX: &str = ".part";

/// Copies file contents. Swappable so failures can be injected in tests.
pub trait Copier: Send {
    /// Copy the contents of `source` into the already opened `destination`,
    /// returning the number of bytes written.
    fn copy(&self, source: &Path, destination: &mut File) -> io::Result<u64>;
}

/// Copier backed by [`io::copy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FsCopier;

impl Copier for FsCopier {
    fn copy(&self, source: &Path, destination: &mut File) -> io::Result<u64> {
        let mut reader = File::open(source)?;
        io::copy(&mut reader, destination)
    }
}

/// Retry and durability settings for transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    /// Total number of copy attempts.
    pub retry_attempts: u32,
    /// Sleep before the next attempt, multiplied by the attempt number.
    pub retry_backoff: Duration,
    /// Sleep before retrying a move that hit a busy or permission error.
    pub busy_retry_delay: Duration,
    pub verify_size: bool,
    pub fsync: bool,
}

impl TransferSettings {
    /// Sleep before the attempt following `attempt`, saturating at [`Duration::MAX`].
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff.checked_mul(attempt).unwrap_or(Duration::MAX)
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(150),
            busy_retry_delay: Duration::from_millis(50),
            verify_size: true,
            fsync: true,
        }
    }
}

/// Performs copies and moves according to [`TransferSettings`].
pub struct TransferEngine {
    settings: TransferSettings,
    copier: Box<dyn Copier>,
}

impl TransferEngine {
    #[must_use]
    pub fn new(settings: TransferSettings) -> Self {
        Self::with_copier(settings, Box::new(FsCopier))
    }

    #[must_use]
    pub fn with_copier(settings: TransferSettings, copier: Box<dyn Copier>) -> Self {
        Self { settings, copier }
    }

    #[must_use]
    pub const fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    /// Transfer `source` to `destination` with the given discipline.
    ///
    /// The destination directory must already exist.
    pub fn transfer(&self, discipline: TransferDiscipline, source: &Path, destination: &Path) -> Result<()> {
        match discipline {
            TransferDiscipline::Copy => self.copy_atomic(source, destination),
            TransferDiscipline::Move => self.move_file(source, destination),
        }
    }

    /// Copy through a temporary file and publish it with a rename.
    ///
    /// Each failed attempt removes the temporary file before the next one.
    pub fn copy_atomic(&self, source: &Path, destination: &Path) -> Result<()> {
        let temp = temp_path(destination);
        let attempts = self.settings.retry_attempts.max(1);

        let mut attempt = 1;
        loop {
            match self.copy_once(source, destination, &temp) {
                Ok(()) => return Ok(()),
                Err(error) => {
                    let _ = fs::remove_file(&temp);
                    if attempt >= attempts {
                        return Err(error.context(format!("Copy failed after {attempts} attempt(s)")));
                    }
                }
            }
            thread::sleep(self.settings.backoff(attempt));
            attempt += 1;
        }
    }

    /// Rename on the same device, otherwise copy atomically and remove the source.
    ///
    /// A busy or permission error is retried once after a short delay.
    pub fn move_file(&self, source: &Path, destination: &Path) -> Result<()> {
        match self.move_once(source, destination) {
            Err(error) if is_busy(&error) => {
                thread::sleep(self.settings.busy_retry_delay);
                self.move_once(source, destination)
                    .context("Move failed again after busy retry")
            }
            result => result,
        }
    }

    fn copy_once(&self, source: &Path, destination: &Path, temp: &Path) -> Result<()> {
        if temp.exists() {
            let _ = fs::remove_file(temp);
        }

        let source_metadata =
            fs::metadata(source).with_context(|| format!("Failed to read metadata: {}", source.display()))?;

        // Written, timestamped and synced through our own handle.
        // Permissions are copied only after it is closed, since the source may be read-only.
        let mut file = File::create(temp).with_context(|| format!("Failed to create {}", temp.display()))?;
        self.copier
            .copy(source, &mut file)
            .with_context(|| format!("Failed to copy {} to {}", source.display(), temp.display()))?;

        if self.settings.verify_size {
            let expected = source_metadata.len();
            let actual = file
                .metadata()
                .with_context(|| format!("Failed to read metadata: {}", temp.display()))?
                .len();
            if expected != actual {
                anyhow::bail!("Size mismatch: expected {expected} bytes, copied {actual} bytes");
            }
        }

        if let Ok(modified) = source_metadata.modified() {
            file.set_modified(modified)
                .with_context(|| format!("Failed to set modified time: {}", temp.display()))?;
        }
        if self.settings.fsync {
            file.sync_all()
                .with_context(|| format!("Failed to sync {}", temp.display()))?;
        }
        drop(file);

        fs::set_permissions(temp, source_metadata.permissions())
            .with_context(|| format!("Failed to set permissions: {}", temp.display()))?;

        fs::rename(temp, destination)
            .with_context(|| format!("Failed to rename {} to {}", temp.display(), destination.display()))?;

        if self.settings.fsync
            && let Some(parent) = destination.parent()
        {
            sync_dir(parent);
        }
        Ok(())
    }

    fn move_once(&self, source: &Path, destination: &Path) -> Result<()> {
        let parent = destination.parent().unwrap_or_else(|| Path::new("."));
        if same_device(source, parent) {
            match fs::rename(source, destination) {
                Ok(()) => return Ok(()),
                Err(error) if error.kind() == io::ErrorKind::CrossesDevices => {}
                Err(error) => {
                    return Err(error).with_context(|| {
                        format!("Failed to rename {} to {}", source.display(), destination.display())
                    });
                }
            }
        }

        self.copy_atomic(source, destination)?;
        fs::remove_file(source).with_context(|| format!("Failed to remove source: {}", source.display()))
    }
}

/// Return the path itself if it is free,
/// otherwise the first free `_dup1`, `_dup2`, … variant of it.
#[must_use]
pub fn unique_destination(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let mut counter: usize = 1;
    loop {
        let candidate = crate::insert_suffix_before_extension(path, &format!("_dup{counter}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Temporary copy target next to the destination, e.g. `name.jpg.part`.
#[must_use]
pub fn temp_path(destination: &Path) -> PathBuf {
    let mut name = destination.file_name().unwrap_or_default().to_os_string();
    name.push(TEMP_SUFFIX);
    destination.with_file_name(name)
}

fn is_busy(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause.downcast_ref::<io::Error>().is_some_and(|io_error| {
            matches!(
                io_error.kind(),
                io::ErrorKind::PermissionDenied | io::ErrorKind::ResourceBusy
            )
        })
    })
}

#[cfg(unix)]
fn same_device(source: &Path, directory: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (fs::metadata(source), fs::metadata(directory)) {
        (Ok(source), Ok(directory)) => source.dev() == directory.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_device(_source: &Path, _directory: &Path) -> bool {
    // Rename reports `CrossesDevices` when it is not.
    true
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
const fn sync_dir(_dir: &Path) {}

#[cfg(test)]
mod transfer_tests {
    use super::*;

    use std::io::Write;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::SystemTime;

    use tempfile::TempDir;

    fn test_settings() -> TransferSettings {
        TransferSettings {
            retry_backoff: Duration::ZERO,
            busy_retry_delay: Duration::ZERO,
            ..TransferSettings::default()
        }
    }

    fn create_file_with_content(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).expect("Failed to write test file");
        path
    }

    /// Writes half of the source and then fails.
    struct PartialWriteCopier {
        attempts: Arc<AtomicUsize>,
    }

    impl Copier for PartialWriteCopier {
        fn copy(&self, source: &Path, destination: &mut File) -> io::Result<u64> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let content = fs::read(source)?;
            destination.write_all(&content[..content.len() / 2])?;
            Err(io::Error::other("simulated failure mid-copy"))
        }
    }

    /// Writes half of the source and reports success.
    struct ShortCopier {
        attempts: Arc<AtomicUsize>,
    }

    impl Copier for ShortCopier {
        fn copy(&self, source: &Path, destination: &mut File) -> io::Result<u64> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let content = fs::read(source)?;
            destination.write_all(&content[..content.len() / 2])?;
            Ok((content.len() / 2) as u64)
        }
    }

    #[test]
    fn copy_publishes_complete_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let source = create_file_with_content(dir.path(), "lumi_01.jpg", b"image data");
        let destination = dir.path().join("out.jpg");

        let engine = TransferEngine::new(test_settings());
        engine
            .transfer(TransferDiscipline::Copy, &source, &destination)
            .expect("copy should succeed");

        assert_eq!(fs::read(&destination).expect("read destination"), b"image data");
        assert!(source.exists());
        assert!(!temp_path(&destination).exists());
    }

    #[test]
    fn failed_copy_leaves_no_artifacts() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let source = create_file_with_content(dir.path(), "lumi_01.jpg", b"0123456789");
        let destination = dir.path().join("out.jpg");
        let attempts = Arc::new(AtomicUsize::new(0));

        let engine = TransferEngine::with_copier(
            test_settings(),
            Box::new(PartialWriteCopier {
                attempts: Arc::clone(&attempts),
            }),
        );
        let result = engine.transfer(TransferDiscipline::Copy, &source, &destination);

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(!destination.exists());
        assert!(!temp_path(&destination).exists());
        assert_eq!(fs::read(&source).expect("read source"), b"0123456789");
    }

    #[test]
    fn size_mismatch_is_retried_and_reported() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let source = create_file_with_content(dir.path(), "lumi_01.jpg", b"0123456789");
        let destination = dir.path().join("out.jpg");
        let attempts = Arc::new(AtomicUsize::new(0));

        let settings = TransferSettings {
            retry_attempts: 2,
            ..test_settings()
        };
        let engine = TransferEngine::with_copier(
            settings,
            Box::new(ShortCopier {
                attempts: Arc::clone(&attempts),
            }),
        );
        let error = engine
            .copy_atomic(&source, &destination)
            .expect_err("size mismatch should fail");

        assert!(format!("{error:#}").contains("Size mismatch"));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(!destination.exists());
        assert!(!temp_path(&destination).exists());
    }

    #[test]
    fn copy_keeps_modification_time() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let source = create_file_with_content(dir.path(), "lumi_01.jpg", b"data");
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        File::options()
            .write(true)
            .open(&source)
            .and_then(|file| file.set_modified(modified))
            .expect("Failed to set modified time");
        let destination = dir.path().join("out.jpg");

        TransferEngine::new(test_settings())
            .copy_atomic(&source, &destination)
            .expect("copy should succeed");

        let copied = fs::metadata(&destination)
            .and_then(|metadata| metadata.modified())
            .expect("read modified time");
        assert_eq!(copied, modified);
    }

    #[test]
    fn read_only_source_is_copied_with_fsync() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let source = create_file_with_content(dir.path(), "lumi_01.jpg", b"locked");
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        File::options()
            .write(true)
            .open(&source)
            .and_then(|file| file.set_modified(modified))
            .expect("Failed to set modified time");
        let mut permissions = fs::metadata(&source).expect("read metadata").permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&source, permissions).expect("Failed to make source read-only");
        let destination = dir.path().join("out.jpg");

        let settings = TransferSettings {
            fsync: true,
            ..test_settings()
        };
        TransferEngine::new(settings)
            .copy_atomic(&source, &destination)
            .expect("copy of a read-only source should succeed");

        let metadata = fs::metadata(&destination).expect("read destination metadata");
        assert_eq!(fs::read(&destination).expect("read destination"), b"locked");
        assert!(metadata.permissions().readonly());
        assert_eq!(metadata.modified().expect("read modified time"), modified);
        assert!(!temp_path(&destination).exists());

        for path in [&source, &destination] {
            let mut permissions = fs::metadata(path).expect("read metadata").permissions();
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            fs::set_permissions(path, permissions).expect("Failed to restore permissions");
        }
    }

    #[test]
    fn backoff_grows_per_attempt_and_saturates() {
        let settings = test_settings();
        assert_eq!(settings.backoff(3), Duration::ZERO);

        let settings = TransferSettings {
            retry_backoff: Duration::from_millis(150),
            ..test_settings()
        };
        assert_eq!(settings.backoff(1), Duration::from_millis(150));
        assert_eq!(settings.backoff(3), Duration::from_millis(450));

        let settings = TransferSettings {
            retry_backoff: Duration::from_millis(u64::MAX),
            ..test_settings()
        };
        assert_eq!(settings.backoff(2), Duration::MAX);
    }

    #[test]
    fn move_within_device_renames() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let source = create_file_with_content(dir.path(), "lumi_01.jpg", b"moved");
        fs::create_dir(dir.path().join("out")).expect("Failed to create directory");
        let destination = dir.path().join("out").join("250527-0001-lumi_H_01.jpg");

        TransferEngine::new(test_settings())
            .transfer(TransferDiscipline::Move, &source, &destination)
            .expect("move should succeed");

        assert!(!source.exists());
        assert_eq!(fs::read(&destination).expect("read destination"), b"moved");
    }

    #[test]
    fn move_to_missing_directory_fails_and_keeps_source() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let source = create_file_with_content(dir.path(), "lumi_01.jpg", b"kept");
        let destination = dir.path().join("missing").join("out.jpg");

        let result = TransferEngine::new(test_settings()).transfer(TransferDiscipline::Move, &source, &destination);

        assert!(result.is_err());
        assert_eq!(fs::read(&source).expect("read source"), b"kept");
    }

    #[test]
    fn unique_destination_appends_dup_suffix() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("250527-0001-lumi_H_01.jpg");
        assert_eq!(unique_destination(&path), path);

        create_file_with_content(dir.path(), "250527-0001-lumi_H_01.jpg", b"");
        assert_eq!(
            unique_destination(&path),
            dir.path().join("250527-0001-lumi_H_01_dup1.jpg")
        );

        create_file_with_content(dir.path(), "250527-0001-lumi_H_01_dup1.jpg", b"");
        assert_eq!(
            unique_destination(&path),
            dir.path().join("250527-0001-lumi_H_01_dup2.jpg")
        );
    }

    #[test]
    fn temp_path_appends_suffix_to_full_name() {
        assert_eq!(
            temp_path(Path::new("out/250527/01/a_H_01.jpg")),
            Path::new("out/250527/01/a_H_01.jpg.part")
        );
    }

    #[test]
    fn busy_errors_are_detected_through_context() {
        let error = anyhow::Error::from(io::Error::from(io::ErrorKind::PermissionDenied)).context("Failed to rename");
        assert!(is_busy(&error));

        let error = anyhow::Error::from(io::Error::from(io::ErrorKind::NotFound)).context("Failed to rename");
        assert!(!is_busy(&error));
    }
}
