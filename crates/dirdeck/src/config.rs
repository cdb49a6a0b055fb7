//! Configuration management for dirdeck.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/dirdeck/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sort::SortKey;
use crate::state::MAX_EVENT_CAPACITY;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("event_capacity must be between 1 and {max}, got {0}", max = MAX_EVENT_CAPACITY)]
    InvalidEventCapacity(usize),

    #[error("start_directory must not be empty")]
    EmptyStartDirectory,
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration.
    pub general: GeneralConfig,

    /// Directory browsing preferences.
    pub browser: BrowserConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Write logs to this file instead of stderr.
    pub log_file: Option<PathBuf>,
}

/// Directory browsing preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrowserConfig {
    /// Directory opened at startup.
    pub start_directory: PathBuf,

    /// Whether entries starting with '.' are listed.
    pub include_hidden: bool,

    /// Initial sort key.
    pub sort_key: SortKey,

    /// Initial sort direction.
    pub sort_ascending: bool,

    /// Buffer size of the event channel.
    pub event_capacity: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            start_directory: default_start_directory(),
            include_hidden: true,
            sort_key: SortKey::Name,
            sort_ascending: true,
            event_capacity: 256,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dirdeck")
        .join("config.toml")
}

/// The current directory, falling back to the home directory.
fn default_start_directory() -> PathBuf {
    std::env::current_dir()
        .ok()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - DIRDECK_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - DIRDECK_START_DIR: Override the start directory
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("DIRDECK_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.general.log_level = level;
            }
        }

        if let Ok(dir) = std::env::var("DIRDECK_START_DIR") {
            if !dir.is_empty() {
                tracing::info!("Overriding start_directory from environment: {}", dir);
                self.browser.start_directory = PathBuf::from(dir);
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.general.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.general.log_level.clone()));
        }

        if !(1..=MAX_EVENT_CAPACITY).contains(&self.browser.event_capacity) {
            return Err(ConfigError::InvalidEventCapacity(self.browser.event_capacity));
        }

        if self.browser.start_directory.as_os_str().is_empty() {
            return Err(ConfigError::EmptyStartDirectory);
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
