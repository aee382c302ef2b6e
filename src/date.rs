//! Date folder classification and lookup.
//!
//! Capture folders are named either `YYMMDD` or `YYYYMMDD`.
//! Both reduce to the same six digit run key.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

static RE_DATE_FOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[0-9]{6}|[0-9]{8})$").expect("Failed to create regex pattern for date folder"));

/// Length of the canonical run key.
const RUN_KEY_LENGTH: usize = 6;

/// Canonical six digit date that identifies one run, for example `250527`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunKey(String);

impl RunKey {
    /// Create a run key from a date folder name.
    ///
    /// Returns `None` if the name is not a date folder.
    #[must_use]
    pub fn from_folder_name(name: &str) -> Option<Self> {
        is_date_folder(name).then(|| Self(to_run_key(name).to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RunKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check if the name is exactly 6 or exactly 8 ASCII digits.
#[must_use]
pub fn is_date_folder(name: &str) -> bool {
    RE_DATE_FOLDER.is_match(name)
}

/// Return the last six characters of a date folder name.
///
/// The caller is expected to have checked the name with [`is_date_folder`].
#[must_use]
pub fn to_run_key(name: &str) -> &str {
    name.char_indices()
        .rev()
        .nth(RUN_KEY_LENGTH - 1)
        .map_or(name, |(start, _)| &name[start..])
}

/// Find the A-side date folder matching the run key directly under `a_root`.
///
/// A folder matches when the last six of all digits in its name equal the run key.
/// Priority: a folder named exactly the run key, then a folder whose digits are
/// exactly eight long, then any other match. Ties are broken by the smallest name.
/// Returns `Ok(None)` if `a_root` does not exist or nothing matches.
pub fn find_date_folder(a_root: &Path, run_key: &RunKey) -> io::Result<Option<PathBuf>> {
    let entries = match fs::read_dir(a_root) {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error),
    };

    let mut candidates: Vec<(String, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = crate::os_str_to_string(&entry.file_name());
        if digit_suffix_matches(&name, run_key) {
            candidates.push((name, path));
        }
    }

    if let Some((_, path)) = candidates.iter().find(|(name, _)| name == run_key.as_str()) {
        return Ok(Some(path.clone()));
    }

    let eight_digit = candidates
        .iter()
        .filter(|(name, _)| digits(name).len() == 8)
        .min_by(|a, b| a.0.cmp(&b.0));

    Ok(eight_digit
        .or_else(|| candidates.iter().min_by(|a, b| a.0.cmp(&b.0)))
        .map(|(_, path)| path.clone()))
}

/// Collect the ASCII digits of a name.
fn digits(name: &str) -> String {
    name.chars().filter(char::is_ascii_digit).collect()
}

fn digit_suffix_matches(name: &str, run_key: &RunKey) -> bool {
    let digits = digits(name);
    digits.len() >= RUN_KEY_LENGTH && digits[digits.len() - RUN_KEY_LENGTH..] == *run_key.as_str()
}
