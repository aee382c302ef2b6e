use std::path::{Path, PathBuf};
use std::sync::LazyLock;

const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

/// Path to the user config file: `$HOME/.config/image-namer.toml`
///
/// Returns `None` if the home directory cannot be determined.
static CONFIG_PATH: LazyLock<Option<PathBuf>> = LazyLock::new(|| {
    let home_dir = dirs::home_dir()?;
    Some(home_dir.join(".config").join(format!("{PROJECT_NAME}.toml")))
});

/// Path to the user config file, if the home directory is known.
#[must_use]
pub fn config_path() -> Option<&'static Path> {
    CONFIG_PATH.as_deref()
}

/// Directory for run logs: `$HOME/logs/image-namer`
#[must_use]
pub fn log_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join("logs").join(PROJECT_NAME))
}
