use std::fmt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Deserialize;

/// Which part of the date folder a file was found in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Branch {
    /// `<date>/Single/<set>/<file>`
    Single,
    /// `<date>/<stop>/<set>/<file>`
    Multi { stop_id: String },
}

/// How a file gets to its destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDiscipline {
    /// Copy through a temporary file, verify, sync and publish atomically
    Copy,
    /// Rename on the same device, otherwise copy and delete the source
    #[default]
    Move,
}

/// Where the renamed files end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Transfer into `<out_root>/<run key>/<index>/`.
    Sorted {
        out_root: PathBuf,
        discipline: TransferDiscipline,
    },
    /// Rename inside the source directory.
    InPlace,
}

/// Quality classification taken from the A-side file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityTag {
    /// High
    H,
    /// Middle
    M,
}

/// Index, base and extension parsed from a B-side file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    /// Two digit index, e.g. `"13"`.
    pub index: String,
    /// Everything before the index with trailing underscores removed.
    pub base: String,
    /// Original extension including the dot, or empty.
    pub extension: String,
}

/// One B-side file to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub branch: Branch,
    pub set_id: String,
    pub source: PathBuf,
    /// `None` when the file name has no trailing index.
    pub parsed: Option<ParsedName>,
}

/// Cache key for one A-side set folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SetKey {
    pub branch: Branch,
    pub set_id: String,
}

/// Why a record was not transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The B file name has no trailing two digit index.
    NoNumber,
    /// The A-side set folder does not exist.
    NoSetDir,
    /// The A-side set folder exists but has no usable files.
    EmptySet { samples: Vec<String> },
    /// The A-side set has no quality tag for this index.
    NoQualityTag,
    /// The run was cancelled before this record was reached.
    Cancelled,
}

/// What kind of transfer produced a destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferAction {
    Copied,
    Moved,
    RenamedInPlace,
}

/// Terminal outcome of a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Transferred { destination: PathBuf, action: TransferAction },
    Skipped(SkipReason),
    Failed { destination: PathBuf, error: String },
}

impl Branch {
    #[must_use]
    pub fn stop_id(&self) -> Option<&str> {
        match self {
            Self::Single => None,
            Self::Multi { stop_id } => Some(stop_id),
        }
    }
}

impl Mode {
    /// Transfer discipline used for this mode.
    ///
    /// In-place renames stay in the source directory, so they always move.
    #[must_use]
    pub const fn discipline(&self) -> TransferDiscipline {
        match self {
            Self::Sorted { discipline, .. } => *discipline,
            Self::InPlace => TransferDiscipline::Move,
        }
    }

    /// Action recorded for a successful transfer in this mode.
    #[must_use]
    pub const fn action(&self) -> TransferAction {
        match self {
            Self::Sorted {
                discipline: TransferDiscipline::Copy,
                ..
            } => TransferAction::Copied,
            Self::Sorted {
                discipline: TransferDiscipline::Move,
                ..
            } => TransferAction::Moved,
            Self::InPlace => TransferAction::RenamedInPlace,
        }
    }
}

impl QualityTag {
    /// Map a matched quality token to a tag.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_lowercase().as_str() {
            "high" | "h" => Some(Self::H),
            "middle" | "m" => Some(Self::M),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::H => "H",
            Self::M => "M",
        }
    }
}

impl TransferRecord {
    #[must_use]
    pub fn set_key(&self) -> SetKey {
        SetKey {
            branch: self.branch.clone(),
            set_id: self.set_id.clone(),
        }
    }

    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl SkipReason {
    /// Short reason code used in the manifest.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoNumber => "no_number",
            Self::NoSetDir => "no_set_dir",
            Self::EmptySet { .. } => "empty_set",
            Self::NoQualityTag => "no_HM",
            Self::Cancelled => "cancelled",
        }
    }
}

impl TransferAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Copied => "copied",
            Self::Moved => "moved",
            Self::RenamedInPlace => "renamed_in_place",
        }
    }
}

impl fmt::Display for QualityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TransferDiscipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => write!(f, "copy"),
            Self::Move => write!(f, "move"),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sorted { out_root, discipline } => write!(f, "{discipline} to {}", out_root.display()),
            Self::InPlace => write!(f, "rename in place"),
        }
    }
}

/// Manifest reason text, e.g. `empty_set:a.jpg;b.jpg`.
impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySet { samples } if !samples.is_empty() => write!(f, "empty_set:{}", samples.join(";")),
            _ => f.write_str(self.code()),
        }
    }
}
