//! Error types for pinlab core
//!
//! [`PinlabError`] covers setup and configuration failures. Per-request failures
//! are [`pinlab_types::RequestError`] and never leave `execute` as a `PinlabError`.

use pinlab_types::{PinConfigError, RegistryError};
use thiserror::Error;

/// Result type for pinlab core setup operations
pub type Result<T> = core::result::Result<T, PinlabError>;

/// pinlab core error types
#[derive(Debug, Error)]
pub enum PinlabError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// TLS stack could not be set up
    #[error("TLS error: {0}")]
    Tls(String),

    /// Pin registry error
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Malformed pin material
    #[error("Pin configuration error: {0}")]
    PinConfig(#[from] PinConfigError),

    /// I/O error while loading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PinlabError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new TLS error
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }
}

impl From<rustls::Error> for PinlabError {
    fn from(err: rustls::Error) -> Self {
        Self::Tls(err.to_string())
    }
}

impl From<serde_json::Error> for PinlabError {
    fn from(err: serde_json::Error) -> Self {
        Self::Registry(RegistryError::from(err))
    }
}
