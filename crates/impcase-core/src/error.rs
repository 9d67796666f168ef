//! Error types for impcase-core

use impress_frames::FrameError;
use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for case operations
pub type Result<T> = std::result::Result<T, CaseError>;

/// Main error type for case operations
#[derive(Error, Debug)]
pub enum CaseError {
    /// Rejected edit; the document is unchanged
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Malformed clipboard payload, snapshot, or record text
    #[error("Parse error: {0}")]
    Parse(#[from] FrameError),

    /// Collaboration transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Case is a read-only link to another case
    #[error("Case is read-only")]
    ReadOnly,

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Edit validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Folder already exists: {0}")]
    DuplicateFolder(String),

    #[error("Folder must be empty to be deleted: {0}")]
    FolderNotEmpty(String),

    #[error("Unknown folder: {0}")]
    UnknownFolder(String),

    #[error("Cannot delete the last folder")]
    LastFolder,

    #[error("Main topic cannot be deleted")]
    MainTopic,

    #[error("Topics cannot be added to the scrap folder")]
    ScrapFolder,

    #[error("Topic ids are issued by the collaboration server")]
    DelegatedIds,

    #[error("Not enough topic ids: needed {needed}, got {got}")]
    MissingIds { needed: usize, got: usize },

    #[error("Invalid case snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Collaboration transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Unable to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Connection lost")]
    ConnectionLost,

    /// Error reported by the collaboration server
    #[error("Server error: {0}")]
    Remote(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Not connected to a collaboration")]
    NotConnected,
}

impl From<serde_json::Error> for CaseError {
    fn from(err: serde_json::Error) -> Self {
        CaseError::Config(ConfigError::Format(err.to_string()))
    }
}

impl From<FrameError> for TransportError {
    fn from(err: FrameError) -> Self {
        TransportError::Protocol(err.to_string())
    }
}
