//! Quality tags for A-side set folders.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;

use crate::namer::types::QualityTag;

/// Index right before the final extension, e.g. `raw_High_07.jpg`.
static RE_INDEX_BEFORE_EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"_([0-9]{2})\.[^.]+$").expect("Failed to create regex pattern for index before extension")
});

/// Digit runs that can hold an index.
static RE_DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{2,}").expect("Failed to create regex pattern for digit run"));

/// Quality token. Note that `_` is a word character, so `raw_h_01` has no stand-alone `h`.
static RE_QUALITY_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(high|middle|\bh\b|\bm\b)").expect("Failed to create regex pattern for quality token")
});

/// Mapping from two digit index to quality tag for one set folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualityIndex {
    tags: BTreeMap<String, QualityTag>,
}

impl QualityIndex {
    /// Insert a tag for the index.
    ///
    /// An existing entry is only replaced by `H`, so High wins regardless of scan order.
    pub fn insert(&mut self, index: String, tag: QualityTag) {
        if tag == QualityTag::H || !self.tags.contains_key(&index) {
            self.tags.insert(index, tag);
        }
    }

    #[must_use]
    pub fn get(&self, index: &str) -> Option<QualityTag> {
        self.tags.get(index).copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, QualityTag)> {
        self.tags.iter().map(|(index, tag)| (index.as_str(), *tag))
    }
}

/// Derive the index from an A-side file name.
///
/// Prefers `_NN` right before the extension,
/// otherwise uses the last two digits of the right-most digit run in the stem.
#[must_use]
pub fn index_from_a_name(file_name: &str) -> Option<String> {
    if let Some(captures) = RE_INDEX_BEFORE_EXTENSION.captures(file_name) {
        return captures.get(1).map(|m| m.as_str().to_string());
    }
    let stem = Path::new(file_name)
        .file_stem()
        .map_or_else(|| file_name.to_string(), crate::os_str_to_string);
    RE_DIGIT_RUN
        .find_iter(&stem)
        .last()
        .map(|run| run.as_str()[run.as_str().len() - 2..].to_string())
}

/// Find the quality tag from the left-most quality token in the file name.
#[must_use]
pub fn quality_tag(file_name: &str) -> Option<QualityTag> {
    RE_QUALITY_TOKEN
        .find(file_name)
        .and_then(|token| QualityTag::from_token(token.as_str()))
}

/// Build the quality index for one A-side set folder.
///
/// Only regular files directly inside the folder are considered.
/// A missing folder gives an empty index.
#[must_use]
pub fn build_quality_index(set_dir: &Path) -> QualityIndex {
    let mut index = QualityIndex::default();
    let Ok(entries) = fs::read_dir(set_dir) else {
        return index;
    };

    for entry in entries.filter_map(Result::ok) {
        if !entry.path().is_file() {
            continue;
        }
        let name = crate::os_str_to_string(&entry.file_name());
        let Some(file_index) = index_from_a_name(&name) else {
            continue;
        };
        let Some(tag) = quality_tag(&name) else {
            continue;
        };
        index.insert(file_index, tag);
    }

    index
}

/// Return up to `limit` file names from the folder, sorted by name.
///
/// Used to describe set folders that produced no usable tags.
#[must_use]
pub fn sample_file_names(dir: &Path, limit: usize) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .map(|entry| crate::os_str_to_string(&entry.file_name()))
        .sorted_unstable()
        .take(limit)
        .collect()
}
