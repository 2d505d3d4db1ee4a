//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "GYMVISION_ROOT_FOLDER";

/// Environment variable overriding the config file location
pub const CONFIG_FILE_ENV: &str = "GYMVISION_CONFIG";

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. Value from the TOML config file
/// 4. OS-dependent compiled default
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config_value: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = config_value {
        return path.to_path_buf();
    }

    default_root_folder()
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/gymvision (or /var/lib/gymvision for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("gymvision"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/gymvision"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/gymvision
        dirs::data_dir()
            .map(|d| d.join("gymvision"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/gymvision"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\gymvision
        dirs::data_local_dir()
            .map(|d| d.join("gymvision"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\gymvision"))
    } else {
        PathBuf::from("./gymvision_data")
    }
}

/// Locate the config file: CLI argument, then environment, then the
/// per-user config directory (`<config dir>/gymvision/<file_name>`)
pub fn resolve_config_path(cli_arg: Option<&Path>, file_name: &str) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir().map(|d| d.join("gymvision").join(file_name))
}

/// Load and deserialize a TOML file
///
/// A missing file is not an error: a warning is logged and `T::default()`
/// is returned. A file that exists but cannot be read or parsed is an error.
pub fn load_toml_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        warn!(
            "Config file not found at {}, using built-in defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let value = load_toml(path)?;
    info!("Loaded configuration from {}", path.display());
    Ok(value)
}

/// Load and deserialize a TOML file that must exist
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Resolve a possibly relative path against the root folder
pub fn resolve_under(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
