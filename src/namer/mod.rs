//! Rename converted image files using quality tags from the raw capture tree.
//!
//! The B tree holds converted files with short names like `lumi_13.jpg`:
//!
//! ```text
//! 250527/
//!   Single/0001/lumi_13.jpg
//!   0012/0003/x_05.jpg
//! ```
//!
//! The A tree mirrors the same layout with raw files whose names carry a quality token,
//! for example `raw_High_13.CR3`. Each B file is renamed to
//! `250527-0001-lumi_H_13.jpg` (or `250527-0012-0003-x_M_05.jpg` for a stop)
//! and transferred to `<out>/250527/13/`, or renamed in place.
//! Every record ends up as one row in `_manifest.csv`.

mod compose;
mod config;
mod logger;
mod manifest;
mod parse;
mod quality;
mod run;
mod stats;
mod transfer;
mod types;
mod walk;

pub use compose::{OutputDirs, compose_name, compose_output_dir};
pub use config::{DEFAULT_MESSAGE_EVERY, DEFAULT_TICK_MS, NamerConfig, NamerSettings};
pub use logger::FileLogger;
pub use manifest::{MANIFEST_FILE_NAME, Manifest, ManifestRow, RowStatus};
pub use parse::parse_index_and_base;
pub use quality::{QualityIndex, build_quality_index, index_from_a_name, quality_tag, sample_file_names};
pub use run::{
    DEFAULT_MESSAGE_CAPACITY, Namer, RunControl, RunHandle, RunPlan, RunReport, RunRequest, SetupError, spawn,
};
pub use stats::{RunStats, SharedStats};
pub use transfer::{Copier, FsCopier, TEMP_SUFFIX, TransferEngine, TransferSettings, temp_path, unique_destination};
pub use types::{
    Branch, Mode, Outcome, ParsedName, QualityTag, SetKey, SkipReason, TransferAction, TransferDiscipline,
    TransferRecord,
};
pub use walk::{SINGLE_DIR_NAME, enumerate_b_files, find_child_dir_ignore_case, is_four_digit_name};
