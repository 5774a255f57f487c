//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\playlist-bridge\config.toml
//! - macOS: ~/Library/Application Support/playlist-bridge/config.toml
//! - Linux: ~/.config/playlist-bridge/config.toml
//!
//! The config file is human-readable and editable. Every section is
//! optional; missing values fall back to defaults. Command-line flags
//! override file values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::{DEFAULT_BATCH_SIZE, RetryPolicy};
use crate::convert::ConvertOptions;
use crate::convert::orchestrator::{DEFAULT_MAX_CONCURRENT, DEFAULT_NAME_SUFFIX};
use crate::convert::progress::DEFAULT_EVENT_CAPACITY;

/// Application directory name under the OS config/data dirs
const APP_DIR: &str = "playlist-bridge";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Conversion pipeline settings
    pub conversion: ConversionConfig,

    /// Retry policy for catalog and destination calls
    pub retry: RetryConfig,

    /// Checkpoint storage
    pub checkpoint: CheckpointConfig,

    /// Catalog bridge connection
    pub bridge: BridgeConfig,
}

impl Config {
    /// Options for the converter built from this config.
    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            max_concurrent: self.conversion.max_concurrent.max(1),
            retry: self.retry.policy(),
            name_suffix: self.conversion.playlist_name_suffix.clone(),
        }
    }
}

/// Conversion pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Tracks resolved at once
    pub max_concurrent: usize,

    /// Appended to the source name when naming the destination playlist
    pub playlist_name_suffix: String,

    /// Events buffered per job before slow observers start skipping
    pub event_capacity: usize,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            playlist_name_suffix: DEFAULT_NAME_SUFFIX.to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per call, including the first
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.initial_delay_ms)),
        }
    }
}

/// Checkpoint storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    /// One JSON file per job
    #[default]
    Json,
    /// Rows in a SQLite database
    Sqlite,
}

/// Checkpoint settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub backend: CheckpointBackend,

    /// Directory for JSON checkpoints (default: data dir)
    pub directory: Option<PathBuf>,

    /// SQLite database file (default: data dir)
    pub database: Option<PathBuf>,
}

impl CheckpointConfig {
    /// Resolved JSON checkpoint directory.
    pub fn directory(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| data_dir().join("checkpoints"))
    }

    /// Resolved SQLite database path.
    pub fn database(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| data_dir().join("checkpoints.db"))
    }
}

/// Catalog bridge settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Base URL of the bridge service
    pub base_url: String,

    /// Bearer token sent with every request
    pub token: Option<String>,

    /// Per-request timeout
    pub timeout_secs: u64,

    /// Ids per add request
    pub batch_size: usize,

    /// How long to wait for the user to finish signing in
    pub auth_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8765".to_string(),
            token: None,
            timeout_secs: 30,
            batch_size: DEFAULT_BATCH_SIZE,
            auth_timeout_secs: 300,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR))
}

/// Get the full path to the default config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Directory for application data, falling back to the working directory
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR))
}

/// Load configuration from `path`, or from the default location.
///
/// Returns default config if the file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load(path: Option<&Path>) -> Config {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match config_path() {
            Some(p) => p,
            None => {
                tracing::warn!("Could not determine config directory, using defaults");
                return Config::default();
            }
        },
    };

    if !path.exists() {
        tracing::debug!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to `path`, or to the default location.
///
/// Creates the parent directory if it doesn't exist.
pub fn save(config: &Config, path: Option<&Path>) -> Result<(), ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path().ok_or(ConfigError::NoConfigDir)?,
    };

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, &path)
        .map_err(|e| ConfigError::Rename(temp_path, path.clone(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
