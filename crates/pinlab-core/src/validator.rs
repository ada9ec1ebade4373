//! SPKI pin validation
//!
//! [`PinValidator`] only ever narrows trust. It runs after the platform's standard
//! chain and hostname validation and receives that outcome as [`PlatformTrust`].

use tracing::{debug, warn};

use pinlab_types::{Decision, PinConfiguration, PlatformTrust};

use crate::chain::CertificateChain;

/// Decides whether a certificate chain satisfies a pin configuration
///
/// Pure and deterministic: the same inputs always yield the same [`Decision`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PinValidator;

impl PinValidator {
    /// Create a validator
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `chain` against `config`
    ///
    /// - an untrusted chain is rejected whatever the pins say
    /// - an empty pin set accepts
    /// - otherwise the chain is scanned leaf first and the first element whose
    ///   SPKI pin is configured accepts; no match rejects
    ///
    /// Elements whose public key cannot be extracted are skipped.
    pub fn evaluate(
        &self,
        chain: &CertificateChain,
        config: &PinConfiguration,
        platform: PlatformTrust,
    ) -> Decision {
        if platform == PlatformTrust::Untrusted {
            debug!("standard validation failed, rejecting before pin check");
            return Decision::Reject;
        }
        if config.is_disabled() {
            return Decision::Accept;
        }

        for (position, link) in chain.iter().enumerate() {
            let hash = match link.spki_hash() {
                Ok(hash) => hash,
                Err(e) => {
                    warn!(position, kind = link.kind(), error = %e, "skipping chain element");
                    continue;
                }
            };
            if config.contains(&hash) {
                debug!(position, kind = link.kind(), pin = %hash, "pin matched");
                return Decision::Accept;
            }
        }

        debug!(chain_len = chain.len(), pins = config.len(), "no pin matched");
        Decision::Reject
    }
}
