//! Fabric configuration.
//!
//! Loaded from a TOML file or built in code; every field has a default.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tunables of the sync fabric.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Cool-down between writes on a link, in milliseconds (default: 100).
    ///
    /// This is the only pacing knob: it bounds outbound traffic per link and
    /// gives the store time to coalesce rapid updates into one batch.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// How long a peer may take to complete the Join/Welcome handshake, in
    /// milliseconds (default: 5000). Streams that stall are dropped.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

fn default_cooldown_ms() -> u64 {
    100
}

fn default_handshake_timeout_ms() -> u64 {
    5000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
        }
    }
}

impl SyncConfig {
    /// The cool-down as a [`Duration`].
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// The handshake timeout as a [`Duration`].
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Override the cool-down (tests use short intervals).
    pub fn with_cooldown_ms(mut self, ms: u64) -> Self {
        self.cooldown_ms = ms;
        self
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse the configuration file.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
