use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::namer::parse::parse_index_and_base;
use crate::namer::types::{Branch, TransferRecord};

/// Name of the folder that holds the single branch, compared case-insensitively.
pub const SINGLE_DIR_NAME: &str = "single";

/// Check if the name is exactly four ASCII digits, as used for stops and sets.
#[must_use]
pub fn is_four_digit_name(name: &str) -> bool {
    name.len() == 4 && name.bytes().all(|b| b.is_ascii_digit())
}

/// Find a child directory whose name equals `name` ignoring case.
///
/// If several match, the smallest name is returned.
/// Returns `Ok(None)` if `parent` does not exist.
pub fn find_child_dir_ignore_case(parent: &Path, name: &str) -> io::Result<Option<PathBuf>> {
    let entries = match fs::read_dir(parent) {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error),
    };

    let wanted = name.to_lowercase();
    let mut matches: Vec<(String, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let entry_name = crate::os_str_to_string(&entry.file_name());
        if path.is_dir() && entry_name.to_lowercase() == wanted {
            matches.push((entry_name, path));
        }
    }

    Ok(matches.into_iter().min_by(|a, b| a.0.cmp(&b.0)).map(|(_, path)| path))
}

/// List every B-side file of one date folder.
///
/// Single branch files come first, followed by the multi branch stops.
/// Unexpected files and folders at any level and dangling links are skipped.
/// A set or stop folder that cannot be read is an error.
/// With `sort` enabled, sets, stops and files are visited in name order,
/// otherwise in directory order.
pub fn enumerate_b_files(b_root: &Path, sort: bool) -> io::Result<Vec<TransferRecord>> {
    // Surface an unreadable root instead of silently returning nothing.
    fs::read_dir(b_root)?;

    let mut records = Vec::new();

    if let Some(single_dir) = find_child_dir_ignore_case(b_root, SINGLE_DIR_NAME)? {
        records.extend(
            walk_files(&single_dir, 2, sort)?
                .iter()
                .map(|entry| record_from_entry(entry, Branch::Single)),
        );
    }

    for entry in walk_files(b_root, 3, sort)? {
        let stop_id = entry
            .path()
            .parent()
            .and_then(Path::parent)
            .map(crate::path_to_filename_string)
            .unwrap_or_default();
        records.push(record_from_entry(&entry, Branch::Multi { stop_id }));
    }

    Ok(records)
}

/// Walk `root` down to `file_depth`, following only four digit directories.
///
/// The single folder never passes the four digit check, so the multi branch walk skips it.
fn walk_files(root: &Path, file_depth: usize, sort: bool) -> io::Result<Vec<DirEntry>> {
    let mut walker = WalkDir::new(root).max_depth(file_depth).follow_links(true);
    if sort {
        walker = walker.sort_by_file_name();
    }

    let entries = walker.into_iter().filter_entry(|entry| {
        let depth = entry.depth();
        if depth == 0 || depth == file_depth {
            return true;
        }
        let name = crate::os_str_to_string(entry.file_name());
        entry.file_type().is_dir() && is_four_digit_name(&name)
    });

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) if entry.depth() == file_depth && entry.file_type().is_file() => files.push(entry),
            Ok(_) => {}
            Err(error) if is_dangling_link(&error) => {}
            Err(error) => return Err(error.into()),
        }
    }
    Ok(files)
}

fn is_dangling_link(error: &walkdir::Error) -> bool {
    error.path().is_some_and(|path| path.is_symlink() && !path.exists())
}

fn record_from_entry(entry: &DirEntry, branch: Branch) -> TransferRecord {
    let source = entry.path().to_path_buf();
    let set_id = source
        .parent()
        .map(crate::path_to_filename_string)
        .unwrap_or_default();
    let parsed = parse_index_and_base(&crate::os_str_to_string(entry.file_name()));

    TransferRecord {
        branch,
        set_id,
        source,
        parsed,
    }
}
