//! TOML configuration for the `chainvault` binary.
//!
//! Every section is optional; command-line flags override whatever the file
//! provides.

use std::fs;
use std::path::{Path, PathBuf};

use chainvault_core::fragment::DEFAULT_CHUNK_SIZE;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("store.chunk_size must be greater than zero")]
    ZeroChunkSize,
}

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub store: StoreSection,
    pub ledger: LedgerSection,
    pub key: KeySection,
    pub log: LogSection,
}

/// `[store]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Directory holding one JSON document per content address.
    pub dir: PathBuf,
    /// Fragment window in bytes.
    pub chunk_size: usize,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("vault"),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// `[ledger]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    /// JSON snapshot standing in for the on-chain registry. When unset every
    /// ledger query is treated as unavailable.
    pub snapshot: Option<PathBuf>,
}

/// `[key]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct KeySection {
    /// File containing the 64 hex character fragment key.
    pub file: Option<PathBuf>,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl VaultConfig {
    /// Load from `path`, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        Ok(())
    }
}
