//! Ledger configuration.
//!
//! Read from `<data_dir>/config.toml`. Every section and field has a
//! default, so an empty or missing file yields a working configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{LedgerError, Result};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "ROYALTY_DATA_DIR";

/// Complete ledger configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Event log settings.
    #[serde(default)]
    pub events: EventConfig,
    /// Registration limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Event log configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventConfig {
    /// Live subscriber buffer. Slower subscribers lag and skip ahead.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

/// Registration limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum right holders per track. 0 = unlimited.
    #[serde(default = "default_max_right_holders")]
    pub max_right_holders: usize,
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
    /// Snapshot file name, relative to the data directory.
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
}

fn default_buffer_capacity() -> usize {
    1000
}

fn default_max_right_holders() -> usize {
    0
}

fn default_snapshot_file() -> String {
    "ledger.json".to_string()
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_right_holders: default_max_right_holders(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            snapshot_file: default_snapshot_file(),
        }
    }
}

impl LimitsConfig {
    /// The holder limit, or `None` when unlimited.
    pub fn holder_limit(&self) -> Option<usize> {
        (self.max_right_holders > 0).then_some(self.max_right_holders)
    }
}

impl LedgerConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path, falling back to defaults
    /// if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml_str(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| LedgerError::Config(e.to_string()))
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Path of the ledger snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir().join(&self.storage.snapshot_file)
    }

    fn config_path() -> PathBuf {
        default_data_dir().join("config.toml")
    }
}

/// Platform-specific default data directory.
fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    #[cfg(target_os = "macos")]
    {
        home_fallback("Library/Application Support/Royalty")
    }
    #[cfg(target_os = "windows")]
    {
        home_fallback("Royalty")
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        home_fallback(".royalty")
    }
}

fn home_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/royalty"))
}
