//! Configuration module
//!
//! Handles application settings

mod settings;

pub use settings::{AppConfig, ConfigError, TimingConfig};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "atsms", "atsms").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default location of `config.toml`
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}
