//! Configuration for the case editor
//!
//! Loaded from `~/.config/impress/case.toml` when present, otherwise the
//! defaults apply.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Editor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseConfig {
    /// Clipboard transfer settings
    pub clipboard: ClipboardConfig,
    /// Collaboration settings
    pub collab: CollabConfig,
    /// Topic search settings
    pub search: SearchConfig,
}

/// Clipboard transfer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardConfig {
    /// Write the binary record format instead of text
    pub binary: bool,
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self { binary: false }
    }
}

/// Collaboration configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollabConfig {
    /// Default collaboration server
    pub url: String,
    /// Seconds to wait for a server reply during login
    pub login_timeout_secs: u64,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:7700/collab".to_string(),
            login_timeout_secs: 30,
        }
    }
}

/// Search configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum number of matches returned (0 = unlimited)
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { max_results: 50 }
    }
}

impl CaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Format(e.to_string()))
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Format(e.to_string()))
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Standard config location: `<config dir>/impress/case.toml`
    pub fn standard_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("impress").join("case.toml"))
    }

    /// Load from the standard location, falling back to defaults.
    pub fn load_standard() -> Self {
        match Self::standard_path() {
            Some(path) if path.exists() => Self::load(&path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load {}: {}, using defaults", path.display(), e);
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.collab.url;
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue(format!(
                "collab.url must be a ws:// or wss:// url, got {}",
                url
            )));
        }

        if self.collab.login_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "collab.login_timeout_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid config format: {0}")]
    Format(String),

    #[error("Invalid config value: {0}")]
    InvalidValue(String),

    #[error("Unable to read config: {0}")]
    Io(String),
}
