//! Runtime configuration.
//!
//! A `Config` is built once per invocation and passed by reference to the
//! storage adapter and the content operations. Resolution order:
//! 1. Built-in defaults
//! 2. TOML file (`$SNIP_CONFIG`, else `<config dir>/snip/config.toml` if present)
//! 3. `SNIP_PATH` environment variable for the storage file
//! 4. CLI flags, applied by the caller

use crate::db::SnipError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_LIMIT: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// SQLite database file.
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    /// Page size used when a search does not give a limit.
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    /// `tracing` filter directive, for example `warn` or `snipbase=debug`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Strip ANSI escape sequences from human-readable output.
    #[serde(default)]
    pub no_ansi: bool,
}

fn default_storage_path() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("snip")
        .join("snip.db")
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: default_storage_path(),
            default_limit: default_limit(),
            log_level: default_log_level(),
            no_ansi: false,
        }
    }
}

impl Config {
    /// Load configuration from the default file location and environment.
    pub fn load() -> Result<Self, SnipError> {
        let file = match std::env::var("SNIP_CONFIG") {
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => dirs::config_dir()
                .map(|dir| dir.join("snip").join("config.toml"))
                .filter(|p| p.exists()),
        };

        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Config::default(),
        };

        if let Ok(path) = std::env::var("SNIP_PATH") {
            config.storage_path = PathBuf::from(path);
        }

        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, SnipError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SnipError::Config(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
            .map_err(|e| SnipError::Config(format!("{} in {}", e, path.display())))
    }

    pub fn from_toml(text: &str) -> Result<Self, SnipError> {
        toml::from_str(text).map_err(|e| SnipError::Config(format!("invalid config: {}", e)))
    }
}
