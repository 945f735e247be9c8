//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`NRP_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "NRP_ROOT_FOLDER";

/// SQLite database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "nrp.db";

/// Bootstrap configuration loaded from TOML
///
/// Every field is optional; anything missing falls back to CLI/env values or
/// built-in defaults in the service that consumes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Data folder holding the database and uploads
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Interface the HTTP server binds to
    #[serde(default)]
    pub bind_address: Option<String>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Where uploaded CSV files are stored while their job runs
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,

    /// CORS allowed origin (`*` for any)
    #[serde(default)]
    pub allowed_origin: Option<String>,

    /// Maximum accepted upload size in bytes
    #[serde(default)]
    pub max_upload_bytes: Option<usize>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
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

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Platform config file location (`~/.config/nrp/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("nrp").join("config.toml"))
}

/// Load the bootstrap config
///
/// An explicitly requested file must exist. The platform default file is
/// optional; when absent an empty config is returned.
pub fn load_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        info!("Loading config from {}", path.display());
        return load_toml_config(path);
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            info!("Loading config from {}", path.display());
            load_toml_config(&path)
        }
        _ => {
            debug!("No config file found, using defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Resolve the root folder following the documented priority order
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/nrp (or /var/lib/nrp for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("nrp"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/nrp"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("nrp"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/nrp"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("nrp"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\nrp"))
    } else {
        PathBuf::from("./nrp_data")
    }
}

/// Resolved root folder with the paths derived from it
#[derive(Debug, Clone)]
pub struct RootFolder {
    path: PathBuf,
}

impl RootFolder {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the root folder if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.path.exists() {
            std::fs::create_dir_all(&self.path).map_err(|e| {
                Error::Config(format!(
                    "Failed to create root folder {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
            info!("Created root folder: {}", self.path.display());
        }
        Ok(())
    }

    /// SQLite database path
    pub fn database_path(&self) -> PathBuf {
        self.path.join(DATABASE_FILE_NAME)
    }

    /// Upload directory used when none is configured
    pub fn default_upload_dir(&self) -> PathBuf {
        self.path.join("uploads")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_folder_derived_paths() {
        let root = RootFolder::new(PathBuf::from("/srv/nrp"));
        assert_eq!(root.database_path(), PathBuf::from("/srv/nrp/nrp.db"));
        assert_eq!(root.default_upload_dir(), PathBuf::from("/srv/nrp/uploads"));
    }

    #[test]
    fn test_logging_defaults_to_info() {
        let config: TomlConfig = toml::from_str("port = 8080").unwrap();
        assert_eq!(config.port, Some(8080));
        assert_eq!(config.logging.level, "info");
        assert!(config.root_folder.is_none());
    }
}
