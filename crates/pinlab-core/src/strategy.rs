//! Request definitions and the trust strategy each one is executed with

use std::fmt;
use std::sync::Arc;

use pinlab_types::{Decision, PinConfiguration, PlatformTrust};

use crate::chain::CertificateChain;

/// External authority that decides trust for a host
///
/// Called from inside the TLS handshake, so implementations must return
/// promptly and must not block.
pub trait TrustDelegate: Send + Sync + fmt::Debug {
    /// Decide whether `chain`, presented by `host`, is acceptable
    fn evaluate(&self, host: &str, chain: &CertificateChain, platform: PlatformTrust) -> Decision;
}

/// How the server's certificate chain is judged during the handshake
#[derive(Debug, Clone, Default)]
pub enum TrustStrategy {
    /// Platform trust only
    #[default]
    NoPinning,
    /// Platform trust narrowed to the given SPKI pins
    PinByHash(PinConfiguration),
    /// Platform trust narrowed by an external delegate
    ExternalLibraryDelegate(Arc<dyn TrustDelegate>),
}

impl TrustStrategy {
    /// Whether this strategy needs a certificate chain to succeed
    ///
    /// An empty pin set does not.
    pub fn requires_certificate(&self) -> bool {
        match self {
            TrustStrategy::NoPinning => false,
            TrustStrategy::PinByHash(config) => !config.is_disabled(),
            TrustStrategy::ExternalLibraryDelegate(_) => true,
        }
    }

    /// Short label for logs and reports
    pub fn label(&self) -> &'static str {
        match self {
            TrustStrategy::NoPinning => "none",
            TrustStrategy::PinByHash(_) => "pin_by_hash",
            TrustStrategy::ExternalLibraryDelegate(_) => "delegate",
        }
    }
}

/// A named request to execute, immutable once built
#[derive(Debug, Clone)]
pub struct RequestDefinition {
    name: String,
    url: String,
    trust: TrustStrategy,
}

impl RequestDefinition {
    /// Definition using platform trust only
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::with_trust(name, url, TrustStrategy::NoPinning)
    }

    /// Definition pinned to `pins`
    pub fn pinned(name: impl Into<String>, url: impl Into<String>, pins: PinConfiguration) -> Self {
        Self::with_trust(name, url, TrustStrategy::PinByHash(pins))
    }

    /// Definition judged by `delegate`
    pub fn delegated(
        name: impl Into<String>,
        url: impl Into<String>,
        delegate: Arc<dyn TrustDelegate>,
    ) -> Self {
        Self::with_trust(name, url, TrustStrategy::ExternalLibraryDelegate(delegate))
    }

    /// Definition with an explicit strategy
    pub fn with_trust(
        name: impl Into<String>,
        url: impl Into<String>,
        trust: TrustStrategy,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            trust,
        }
    }

    /// Display label
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target URL, unparsed
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Trust strategy
    pub fn trust(&self) -> &TrustStrategy {
        &self.trust
    }

    /// Per-request pins, if this definition pins by hash
    pub fn pin_config(&self) -> Option<&PinConfiguration> {
        match &self.trust {
            TrustStrategy::PinByHash(config) => Some(config),
            _ => None,
        }
    }
}
