//! Error types shared by every pinlab crate
//!
//! [`RequestError`] is the per-request failure taxonomy surfaced to callers and
//! recorded in request snapshots. The remaining types cover pin parsing and the
//! process-wide pin registry lifecycle.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// Host name could not be resolved
    Dns,
    /// TCP connection could not be established
    Connect,
    /// TLS negotiation failed for a reason unrelated to pinning
    Tls,
    /// The bounded request timeout elapsed
    Timeout,
    /// Read or write failure on an established connection
    Io,
    /// The peer answered with something that is not an HTTP/1.x response
    Protocol,
}

impl TransportErrorKind {
    /// Stable lowercase name used in logs and JSON output
    pub fn as_str(self) -> &'static str {
        match self {
            TransportErrorKind::Dns => "dns",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Tls => "tls",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Io => "io",
            TransportErrorKind::Protocol => "protocol",
        }
    }
}

impl core::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single request execution
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RequestError {
    /// The request URL could not be parsed; no connection was attempted
    #[error("malformed URL: {0}")]
    MalformedUrl(String),

    /// Pin validation rejected the presented certificate chain
    #[error("server trust rejected: {0}")]
    TrustRejected(String),

    /// Connection, handshake or I/O failure
    #[error("{kind} error: {message}")]
    Transport {
        /// Failure category
        kind: TransportErrorKind,
        /// Underlying cause, preserved for display
        message: String,
    },

    /// The exchange completed but the status code was not 200
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    /// The execution ended before reaching a terminal result
    #[error("request aborted before completion")]
    Aborted,
}

impl RequestError {
    /// Build a transport error
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
        }
    }

    /// Whether the failure came from pin validation
    pub fn is_trust_failure(&self) -> bool {
        matches!(self, RequestError::TrustRejected(_))
    }

    /// Transport category, if this is a transport error
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            RequestError::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Stable error code for display surfaces
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::MalformedUrl(_) => "MALFORMED_URL",
            RequestError::TrustRejected(_) => "TRUST_REJECTED",
            RequestError::Transport { .. } => "TRANSPORT_ERROR",
            RequestError::UnexpectedStatus(_) => "UNEXPECTED_STATUS",
            RequestError::Aborted => "ABORTED",
        }
    }
}

/// Invalid pin material
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PinConfigError {
    /// The string is not Base64 of a 32-byte SHA-256 digest
    #[error("invalid SPKI hash {value:?}: {reason}")]
    InvalidHash {
        /// Offending input
        value: String,
        /// Why it was refused
        reason: String,
    },
}

/// Pin registry loading and lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// `initialize` was called while a registry is already installed
    #[error("pin registry is already initialized")]
    AlreadyInitialized,

    /// The shared registry was used before `initialize`
    #[error("pin registry has not been initialized")]
    NotInitialized,

    /// The registry document could not be parsed
    #[error("failed to load pin registry: {0}")]
    Load(String),
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Load(err.to_string())
    }
}
