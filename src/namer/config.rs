use std::fs;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::namer::transfer::TransferSettings;
use crate::namer::types::TransferDiscipline;
use crate::print_error;

/// Default number of processed records between progress messages.
pub const DEFAULT_MESSAGE_EVERY: usize = 50;

/// Default polling interval for the progress display in milliseconds.
pub const DEFAULT_TICK_MS: u64 = 50;

/// User configuration from the `[namer]` section of the config file.
#[derive(Debug, Default, Deserialize)]
pub struct NamerConfig {
    #[serde(default)]
    pub discipline: Option<TransferDiscipline>,
    #[serde(default)]
    pub in_place: bool,
    #[serde(default)]
    pub retry_attempts: Option<u32>,
    #[serde(default)]
    pub retry_backoff_ms: Option<u64>,
    #[serde(default)]
    pub busy_retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub verify_size: Option<bool>,
    #[serde(default)]
    pub fsync: Option<bool>,
    #[serde(default)]
    pub message_every: Option<usize>,
    #[serde(default)]
    pub tick_ms: Option<u64>,
    #[serde(default)]
    pub allow_date_mismatch: bool,
    #[serde(default)]
    pub sort: Option<bool>,
    #[serde(default)]
    pub log: Option<bool>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub debug: bool,
}

/// Wrapper needed for parsing the user config file section.
#[derive(Debug, Default, Deserialize)]
struct UserConfig {
    #[serde(default)]
    namer: NamerConfig,
}

/// Settings used by the core during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamerSettings {
    pub transfer: TransferSettings,
    /// Send a progress message every this many processed records.
    pub message_every: usize,
    /// Accept an A date folder whose run key differs from the B folder.
    pub allow_date_mismatch: bool,
    /// Visit folders and files in name order.
    pub sort: bool,
}

impl Default for NamerSettings {
    fn default() -> Self {
        Self {
            transfer: TransferSettings::default(),
            message_every: DEFAULT_MESSAGE_EVERY,
            allow_date_mismatch: false,
            sort: true,
        }
    }
}

impl NamerConfig {
    /// Try to read user config from the file if it exists.
    /// Otherwise, fall back to default config.
    #[must_use]
    pub fn get_user_config() -> Self {
        crate::config_path()
            .filter(|path| path.exists())
            .and_then(|path| {
                fs::read_to_string(path)
                    .map_err(|e| {
                        print_error!("Error reading config file {}: {e}", path.display());
                    })
                    .ok()
            })
            .and_then(|config_string| {
                Self::from_toml_str(&config_string)
                    .map_err(|e| {
                        print_error!("{e}");
                    })
                    .ok()
            })
            .unwrap_or_default()
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns an error if the TOML string is invalid.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str::<UserConfig>(toml_str)
            .map(|config| config.namer)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {e}"))
    }

    /// Core settings with defaults for every missing key.
    #[must_use]
    pub fn settings(&self) -> NamerSettings {
        let defaults = NamerSettings::default();
        NamerSettings {
            transfer: TransferSettings {
                retry_attempts: self.retry_attempts.unwrap_or(defaults.transfer.retry_attempts).max(1),
                retry_backoff: self
                    .retry_backoff_ms
                    .map_or(defaults.transfer.retry_backoff, Duration::from_millis),
                busy_retry_delay: self
                    .busy_retry_delay_ms
                    .map_or(defaults.transfer.busy_retry_delay, Duration::from_millis),
                verify_size: self.verify_size.unwrap_or(defaults.transfer.verify_size),
                fsync: self.fsync.unwrap_or(defaults.transfer.fsync),
            },
            message_every: self.message_every.unwrap_or(defaults.message_every).max(1),
            allow_date_mismatch: self.allow_date_mismatch,
            sort: self.sort.unwrap_or(defaults.sort),
        }
    }

    /// Progress polling interval.
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.unwrap_or(DEFAULT_TICK_MS).max(1))
    }

    /// Whether the run log file is enabled.
    #[must_use]
    pub fn log_enabled(&self) -> bool {
        self.log.unwrap_or(true)
    }
}

#[cfg(test)]
mod namer_config_tests {
    use super::*;

    #[test]
    fn from_toml_str_parses_empty_config() {
        let config = NamerConfig::from_toml_str("").expect("should parse empty config");
        assert!(config.discipline.is_none());
        assert!(!config.in_place);
        assert!(!config.allow_date_mismatch);
        assert!(!config.verbose);
        assert!(!config.debug);
        assert!(config.log_enabled());
        assert_eq!(config.settings(), NamerSettings::default());
        assert_eq!(config.tick(), Duration::from_millis(DEFAULT_TICK_MS));
    }

    #[test]
    fn from_toml_str_parses_namer_section() {
        let toml = r#"
[namer]
discipline = "copy"
in_place = true
retry_attempts = 5
retry_backoff_ms = 10
busy_retry_delay_ms = 20
verify_size = false
fsync = false
message_every = 10
tick_ms = 100
allow_date_mismatch = true
sort = false
log = false
verbose = true
debug = true
"#;
        let config = NamerConfig::from_toml_str(toml).expect("should parse config");
        assert_eq!(config.discipline, Some(TransferDiscipline::Copy));
        assert!(config.in_place);
        assert!(config.verbose);
        assert!(config.debug);
        assert!(!config.log_enabled());
        assert_eq!(config.tick(), Duration::from_millis(100));

        let settings = config.settings();
        assert_eq!(settings.transfer.retry_attempts, 5);
        assert_eq!(settings.transfer.retry_backoff, Duration::from_millis(10));
        assert_eq!(settings.transfer.busy_retry_delay, Duration::from_millis(20));
        assert!(!settings.transfer.verify_size);
        assert!(!settings.transfer.fsync);
        assert_eq!(settings.message_every, 10);
        assert!(settings.allow_date_mismatch);
        assert!(!settings.sort);
    }

    #[test]
    fn zero_values_are_clamped() {
        let toml = r"
[namer]
retry_attempts = 0
message_every = 0
tick_ms = 0
";
        let config = NamerConfig::from_toml_str(toml).expect("should parse config");
        let settings = config.settings();
        assert_eq!(settings.transfer.retry_attempts, 1);
        assert_eq!(settings.message_every, 1);
        assert_eq!(config.tick(), Duration::from_millis(1));
    }

    #[test]
    fn from_toml_str_invalid_discipline_returns_error() {
        let toml = r#"
[namer]
discipline = "teleport"
"#;
        assert!(NamerConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn from_toml_str_invalid_toml_returns_error() {
        assert!(NamerConfig::from_toml_str("this is not valid toml {{{").is_err());
    }

    #[test]
    fn from_toml_str_ignores_other_sections() {
        let toml = r"
[other_section]
some_value = true

[namer]
verbose = true
";
        let config = NamerConfig::from_toml_str(toml).expect("should parse config");
        assert!(config.verbose);
        assert!(!config.in_place);
    }
}
