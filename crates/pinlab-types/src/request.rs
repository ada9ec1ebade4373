//! Request lifecycle and trust decision types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::RequestError;

/// Lifecycle phase of a request definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPhase {
    /// Never executed
    #[default]
    Idle,
    /// An execution is in flight
    Loading,
    /// The last execution returned HTTP 200
    Succeeded,
    /// The last execution failed
    Failed,
}

impl RequestPhase {
    /// `Succeeded` or `Failed`
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestPhase::Succeeded | RequestPhase::Failed)
    }

    /// Lowercase name for logs
    pub fn as_str(self) -> &'static str {
        match self {
            RequestPhase::Idle => "idle",
            RequestPhase::Loading => "loading",
            RequestPhase::Succeeded => "succeeded",
            RequestPhase::Failed => "failed",
        }
    }
}

impl core::fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a request's state, as published to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    /// Current phase
    pub phase: RequestPhase,
    /// Error of the last failed execution; cleared when loading starts
    pub last_error: Option<RequestError>,
    /// HTTP status of the last execution that received a response
    pub status_code: Option<u16>,
    /// When this snapshot was produced
    pub updated_at: DateTime<Utc>,
}

impl RequestSnapshot {
    /// Initial snapshot of a never-executed request
    pub fn idle() -> Self {
        Self {
            phase: RequestPhase::Idle,
            last_error: None,
            status_code: None,
            updated_at: Utc::now(),
        }
    }

    /// Snapshot for an execution that has just started
    pub fn loading() -> Self {
        Self {
            phase: RequestPhase::Loading,
            last_error: None,
            status_code: None,
            updated_at: Utc::now(),
        }
    }

    /// Snapshot for a successful execution
    pub fn succeeded(status_code: u16) -> Self {
        Self {
            phase: RequestPhase::Succeeded,
            last_error: None,
            status_code: Some(status_code),
            updated_at: Utc::now(),
        }
    }

    /// Snapshot for a failed execution
    pub fn failed(error: RequestError) -> Self {
        let status_code = match error {
            RequestError::UnexpectedStatus(code) => Some(code),
            _ => None,
        };
        Self {
            phase: RequestPhase::Failed,
            last_error: Some(error),
            status_code,
            updated_at: Utc::now(),
        }
    }
}

impl Default for RequestSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

/// Outcome of a trust evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Continue the handshake
    Accept,
    /// Abort the handshake
    Reject,
}

impl Decision {
    /// True for [`Decision::Accept`]
    pub fn is_accept(self) -> bool {
        self == Decision::Accept
    }
}

/// Result of the platform's standard chain and hostname validation
///
/// Pinning only ever narrows trust: an `Untrusted` chain is rejected no matter
/// which pins it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformTrust {
    /// Standard validation succeeded
    Trusted,
    /// Standard validation failed
    Untrusted,
}
