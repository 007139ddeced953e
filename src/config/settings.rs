//! Application settings

use crate::core::device::DEFAULT_DEVICE;
use crate::core::engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration file problems
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read
    #[error("Cannot read config file {path}: {source}")]
    Io {
        /// Offending file
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`AppConfig`]
    #[error("Invalid config file {path}: {source}")]
    Parse {
        /// Offending file
        path: PathBuf,
        /// Underlying error
        source: toml::de::Error,
    },

    /// Could not serialize the configuration
    #[error("Cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Serial device the modem is attached to
    pub device: String,
    /// Colored output with transient notes
    pub color: bool,
    /// Handshake timing
    pub timing: TimingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            color: true,
            timing: TimingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from the default location, or defaults when there is no file
    pub fn load() -> Result<Self, ConfigError> {
        match super::config_file() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from an explicit file; it must exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Handshake timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// How long each command waits for an answer
    pub command_timeout_secs: u64,
    /// Pause between arming the listener and sending
    pub arm_delay_ms: u64,
    /// Inter-byte read timeout, in deciseconds
    pub read_timeout_ds: u8,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            command_timeout_secs: engine.command_timeout.as_secs(),
            arm_delay_ms: u64::try_from(engine.arm_delay.as_millis()).unwrap_or(u64::MAX),
            read_timeout_ds: engine.read_timeout_ds,
        }
    }
}

impl TimingConfig {
    /// Engine settings for these timings
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            arm_delay: Duration::from_millis(self.arm_delay_ms),
            read_timeout_ds: self.read_timeout_ds.max(1),
        }
    }
}
