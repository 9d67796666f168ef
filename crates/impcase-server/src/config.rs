//! Server configuration
//!
//! Read from a TOML file; `IMPCASE_ADDR` and `IMPCASE_STATUS_ADDR` override
//! the listen addresses.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Websocket listen address for collaboration clients
    pub addr: String,
    /// HTTP listen address for the status API (disabled if unset)
    pub status_addr: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:7700".to_string(),
            status_addr: Some("127.0.0.1:7701".to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid config: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self, ServerError> {
        toml::from_str(toml_str).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Apply environment overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(addr) = std::env::var("IMPCASE_ADDR") {
            self.addr = addr;
        }
        if let Ok(addr) = std::env::var("IMPCASE_STATUS_ADDR") {
            self.status_addr = (!addr.is_empty()).then_some(addr);
        }
        self
    }
}
