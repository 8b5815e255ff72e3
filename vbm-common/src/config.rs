//! Bootstrap configuration loading and root folder resolution
//!
//! The TOML file holds bootstrap concerns only (root folder, logging).
//! Service-specific sections live in the same file and are parsed by the
//! crate that owns them.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the SQLite database file inside the root folder
pub const DATABASE_FILE_NAME: &str = "vbm.db";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root folder for the database and stored recordings (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Default configuration file path for the platform
///
/// `~/.config/vbm/config.toml` on Linux, the platform config dir elsewhere.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vbm").join("config.toml"))
}

/// Read the raw TOML document
///
/// An explicit path must exist. Without one, the platform default is used
/// when present and an empty document otherwise.
pub fn load_toml_document(explicit_path: Option<&Path>) -> Result<toml::Table> {
    let path = match explicit_path {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => {
                debug!("No config file found, using built-in defaults");
                return Ok(toml::Table::new());
            }
        },
    };

    let content = std::fs::read_to_string(&path)?;
    let table = content.parse::<toml::Table>().map_err(|e| {
        Error::Config(format!("Invalid TOML in {}: {}", path.display(), e))
    })?;

    info!(path = %path.display(), "Loaded configuration file");
    Ok(table)
}

impl TomlConfig {
    /// Extract the bootstrap section from a parsed document
    pub fn from_document(document: &toml::Table) -> Result<Self> {
        toml::Value::Table(document.clone())
            .try_into()
            .map_err(|e| Error::Config(format!("Invalid bootstrap configuration: {}", e)))
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/vbm (or /var/lib/vbm for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("vbm"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/vbm"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("vbm"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/vbm"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("vbm"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\vbm"))
    } else {
        PathBuf::from("./vbm_data")
    }
}

/// Create the root folder when missing and return the database path inside it
pub fn prepare_root_folder(root_folder: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(root_folder).map_err(|e| {
        Error::Config(format!(
            "Failed to create root folder {}: {}",
            root_folder.display(),
            e
        ))
    })?;
    Ok(root_folder.join(DATABASE_FILE_NAME))
}
