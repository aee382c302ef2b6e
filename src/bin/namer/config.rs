use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use image_namer::namer::{Mode, NamerConfig, NamerSettings, RunRequest, TransferDiscipline};

use crate::NamerArgs;

/// Final config combined from CLI arguments and user config file.
#[derive(Debug)]
pub struct Config {
    pub(crate) b_date: PathBuf,
    pub(crate) a_root: PathBuf,
    pub(crate) mode: Mode,
    pub(crate) settings: NamerSettings,
    pub(crate) tick: Duration,
    pub(crate) log: bool,
    pub(crate) debug: bool,
    pub(crate) verbose: bool,
}

impl Config {
    /// Create config from given command line args and user config file.
    pub fn from_args(args: NamerArgs) -> Result<Self> {
        Self::from_parts(args, &NamerConfig::get_user_config())
    }

    fn from_parts(args: NamerArgs, user_config: &NamerConfig) -> Result<Self> {
        let b_date = absolute_path(args.b_date.context("B date folder is required")?)?;
        let a_root = absolute_path(args.a_root.context("A root folder is required")?)?;

        let in_place = args.in_place || user_config.in_place;
        let mode = if in_place {
            Mode::InPlace
        } else {
            let output = args
                .output
                .context("Output folder is required unless renaming in place")?;
            let discipline = if args.copy {
                TransferDiscipline::Copy
            } else {
                args.discipline.or(user_config.discipline).unwrap_or_default()
            };
            Mode::Sorted {
                out_root: absolute_path(output)?,
                discipline,
            }
        };

        let mut settings = user_config.settings();
        settings.allow_date_mismatch |= args.force;

        Ok(Self {
            b_date,
            a_root,
            mode,
            settings,
            tick: user_config.tick(),
            log: !args.no_log && user_config.log_enabled(),
            debug: args.debug || user_config.debug,
            verbose: args.verbose || user_config.verbose,
        })
    }

    pub fn run_request(&self) -> RunRequest {
        RunRequest {
            b_date_root: self.b_date.clone(),
            a_root: self.a_root.clone(),
            mode: self.mode.clone(),
        }
    }
}

/// Canonical path when it exists.
/// Missing paths are kept as given so the run setup can report which folder is missing.
fn absolute_path(path: PathBuf) -> Result<PathBuf> {
    if path.exists() {
        image_namer::resolve_input_path(Some(&path))
    } else {
        Ok(path)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Config:")?;
        writeln!(f, "  b_date:         {}", self.b_date.display())?;
        writeln!(f, "  a_root:         {}", self.a_root.display())?;
        writeln!(f, "  mode:           {}", self.mode)?;
        writeln!(f, "  retry_attempts: {}", self.settings.transfer.retry_attempts)?;
        writeln!(f, "  retry_backoff:  {:?}", self.settings.transfer.retry_backoff)?;
        writeln!(
            f,
            "  verify_size:    {}",
            image_namer::colorize_bool(self.settings.transfer.verify_size)
        )?;
        writeln!(f, "  fsync:          {}", image_namer::colorize_bool(self.settings.transfer.fsync))?;
        writeln!(
            f,
            "  date mismatch:  {}",
            image_namer::colorize_bool(self.settings.allow_date_mismatch)
        )?;
        writeln!(f, "  sort:           {}", image_namer::colorize_bool(self.settings.sort))?;
        writeln!(f, "  log:            {}", image_namer::colorize_bool(self.log))?;
        writeln!(f, "  debug:          {}", image_namer::colorize_bool(self.debug))?;
        write!(f, "  verbose:        {}", image_namer::colorize_bool(self.verbose))
    }
}

#[cfg(test)]
mod namer_cli_config_tests {
    use super::*;

    use std::fs;
    use std::path::Path;

    use clap::Parser;
    use tempfile::TempDir;

    struct Dirs {
        _root: TempDir,
        b_date: PathBuf,
        a_root: PathBuf,
        out: PathBuf,
    }

    fn create_dirs() -> Dirs {
        let root = TempDir::new().expect("Failed to create temp dir");
        let create = |name: &str| {
            let path = root.path().join(name);
            fs::create_dir_all(&path).expect("Failed to create directory");
            dunce::canonicalize(path).expect("Failed to canonicalize")
        };
        let b_date = create("B/250527");
        let a_root = create("A");
        let out = create("out");
        Dirs {
            _root: root,
            b_date,
            a_root,
            out,
        }
    }

    fn parse(args: &[&str]) -> NamerArgs {
        NamerArgs::try_parse_from(std::iter::once("namer").chain(args.iter().copied())).expect("valid args")
    }

    fn path_str(path: &Path) -> &str {
        path.to_str().expect("utf-8 path")
    }

    #[test]
    fn sorted_mode_defaults_to_move() {
        let dirs = create_dirs();
        let args = parse(&[
            path_str(&dirs.b_date),
            path_str(&dirs.a_root),
            "--output",
            path_str(&dirs.out),
        ]);
        let config = Config::from_parts(args, &NamerConfig::default()).expect("valid config");

        assert_eq!(
            config.mode,
            Mode::Sorted {
                out_root: dirs.out.clone(),
                discipline: TransferDiscipline::Move,
            }
        );
        assert!(config.log);
        assert_eq!(config.settings, NamerSettings::default());
    }

    #[test]
    fn copy_flag_selects_copy_discipline() {
        let dirs = create_dirs();
        let args = parse(&[path_str(&dirs.b_date), path_str(&dirs.a_root), "-o", path_str(&dirs.out), "-c"]);
        let config = Config::from_parts(args, &NamerConfig::default()).expect("valid config");

        assert!(matches!(
            config.mode,
            Mode::Sorted {
                discipline: TransferDiscipline::Copy,
                ..
            }
        ));
    }

    #[test]
    fn user_config_discipline_is_used_without_cli_option() {
        let dirs = create_dirs();
        let user_config = NamerConfig::from_toml_str("[namer]\ndiscipline = \"copy\"").expect("valid toml");
        let args = parse(&[path_str(&dirs.b_date), path_str(&dirs.a_root), "-o", path_str(&dirs.out)]);
        let config = Config::from_parts(args, &user_config).expect("valid config");
        assert!(matches!(
            config.mode,
            Mode::Sorted {
                discipline: TransferDiscipline::Copy,
                ..
            }
        ));

        let args = parse(&[
            path_str(&dirs.b_date),
            path_str(&dirs.a_root),
            "-o",
            path_str(&dirs.out),
            "--discipline",
            "move",
        ]);
        let config = Config::from_parts(args, &user_config).expect("valid config");
        assert!(matches!(
            config.mode,
            Mode::Sorted {
                discipline: TransferDiscipline::Move,
                ..
            }
        ));
    }

    #[test]
    fn output_is_required_unless_in_place() {
        let dirs = create_dirs();
        let args = parse(&[path_str(&dirs.b_date), path_str(&dirs.a_root)]);
        assert!(Config::from_parts(args, &NamerConfig::default()).is_err());

        let args = parse(&[path_str(&dirs.b_date), path_str(&dirs.a_root), "--in-place"]);
        let config = Config::from_parts(args, &NamerConfig::default()).expect("valid config");
        assert_eq!(config.mode, Mode::InPlace);
    }

    #[test]
    fn flags_are_merged_with_user_config() {
        let dirs = create_dirs();
        let user_config =
            NamerConfig::from_toml_str("[namer]\nin_place = true\nverbose = true\nlog = true").expect("valid toml");
        let args = parse(&[path_str(&dirs.b_date), path_str(&dirs.a_root), "--force", "--no-log"]);
        let config = Config::from_parts(args, &user_config).expect("valid config");

        assert_eq!(config.mode, Mode::InPlace);
        assert!(config.verbose);
        assert!(!config.log);
        assert!(config.settings.allow_date_mismatch);
    }

    #[test]
    fn missing_folder_is_kept_for_setup_error() {
        let dirs = create_dirs();
        let missing = dirs.a_root.join("missing");
        let args = parse(&[path_str(&dirs.b_date), path_str(&missing), "--in-place"]);
        let config = Config::from_parts(args, &NamerConfig::default()).expect("valid config");
        assert_eq!(config.a_root, missing);
    }

    #[test]
    fn copy_conflicts_with_discipline() {
        let result = NamerArgs::try_parse_from(["namer", "b", "a", "-c", "-d", "move"]);
        assert!(result.is_err());
    }

    #[test]
    fn completion_does_not_require_paths() {
        let args = NamerArgs::try_parse_from(["namer", "--completion", "zsh"]).expect("valid args");
        assert!(args.completion.is_some());
        assert!(args.b_date.is_none());
    }
}
