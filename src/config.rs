//! Configuration file handling

use crate::error::{ConfigError, Result};
use crate::indexer::{DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// RPC endpoint URL
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// SQLite database path
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Scan settings
    #[serde(default)]
    pub scan: ScanSettings,

    /// Query server settings
    #[serde(default)]
    pub server: ServerSettings,
}

/// Scan settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Blocks per log request
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Concurrent log requests
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// Query server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind address for the HTTP query API
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_rpc_url() -> String {
    "http://localhost:8545".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("tokenscan.db")
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            db_path: default_db_path(),
            scan: ScanSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tokenscan")
            .join("config.toml")
    }

    /// Load from default path
    pub fn load_default() -> Result<Option<Self>> {
        let path = Self::default_path();
        if path.exists() {
            Ok(Some(Self::load(&path)?))
        } else {
            Ok(None)
        }
    }

    /// Load from a specific path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::InvalidFile(format!("{}: {}", path.display(), e)))?;

        let config: Self = toml::from_str(&content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Save to a specific path
    pub fn save(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::InvalidFile(format!("Failed to create directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidFile(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::InvalidFile(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Save to default path
    pub fn save_default(&self) -> Result<()> {
        self.save(&Self::default_path())
    }
}
