//! Configuration parsing
//!
//! Reads settings from `~/.filehash/config.toml`. Every field is optional;
//! anything missing falls back to the built-in default.

use crate::scan::hasher::MIN_BLOCK_SIZE;
use crate::scan::host::local_hostname;
use crate::scan::scanner::{ScanConfig, DEFAULT_BATCH_SIZE, DEFAULT_CHUNK_SIZE};
use crate::scan::walker::{IgnoreRules, DEFAULT_IGNORE_DIRS, DEFAULT_IGNORE_EXTENSIONS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the inventory database.
pub const DEFAULT_DATABASE_NAME: &str = "filehashdata.sqlite";

/// Error type for config operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Config not found at: {0}")]
    NotFound(String),
}

/// Result type for config operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings from config.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilehashConfig {
    /// Inventory database location (default: next to the executable)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Hash worker threads (0 = one per CPU)
    #[serde(default)]
    pub workers: usize,

    /// Records per database transaction
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Tasks handed to a worker at a time
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Read block size for hashing, in bytes (minimum 64 KiB)
    #[serde(default = "default_read_block_size")]
    pub read_block_size: usize,

    /// Directory names whose subtrees are skipped
    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,

    /// File extensions that are skipped
    #[serde(default = "default_ignore_extensions")]
    pub ignore_extensions: Vec<String>,
}

impl Default for FilehashConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            workers: 0,
            batch_size: default_batch_size(),
            chunk_size: default_chunk_size(),
            read_block_size: default_read_block_size(),
            ignore_dirs: default_ignore_dirs(),
            ignore_extensions: default_ignore_extensions(),
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_read_block_size() -> usize {
    MIN_BLOCK_SIZE
}

fn default_ignore_dirs() -> Vec<String> {
    DEFAULT_IGNORE_DIRS.iter().map(|s| s.to_string()).collect()
}

fn default_ignore_extensions() -> Vec<String> {
    DEFAULT_IGNORE_EXTENSIONS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl FilehashConfig {
    /// Database path from config, else `filehashdata.sqlite` beside the executable.
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }

    /// Scanner settings derived from this config.
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            workers: self.workers,
            chunk_size: self.chunk_size.max(1),
            batch_size: self.batch_size.max(1),
            block_size: self.read_block_size.max(MIN_BLOCK_SIZE),
            ignore: IgnoreRules::new(
                self.ignore_dirs.iter().cloned(),
                self.ignore_extensions.iter().cloned(),
            ),
            host: local_hostname(),
        }
    }

    /// Write this config as TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// `filehashdata.sqlite` in the executable's directory, or the working
/// directory if the executable path is unknown.
pub fn default_database_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_DATABASE_NAME)))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_NAME))
}

/// Load configuration from a specific file. A missing file yields defaults.
pub fn load_config(config_path: &Path) -> Result<FilehashConfig> {
    if !config_path.exists() {
        return Ok(FilehashConfig::default());
    }

    let content = std::fs::read_to_string(config_path)?;
    Ok(toml::from_str(&content)?)
}

/// Default config location: `~/.filehash/config.toml`
pub fn default_config_path() -> Result<PathBuf> {
    let home = filehash_logging::filehash_home()
        .map_err(|e| ConfigError::NotFound(e.to_string()))?;
    Ok(home.join("config.toml"))
}

/// Load configuration from the default location
pub fn load_default_config() -> Result<FilehashConfig> {
    load_config(&default_config_path()?)
}
