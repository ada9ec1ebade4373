//! Whole-certificate pinning
//!
//! A [`CertificatePins`] delegate trusts a chain only if the validated path
//! contains one of its certificates. Presented certificates match byte for
//! byte. A trust anchor has no certificate bytes, so it matches on subject
//! and public key.

use rustls::pki_types::{CertificateDer, TrustAnchor};
use tracing::debug;

use pinlab_types::{Decision, PlatformTrust};

use crate::chain::{
    anchor_subject_and_spki, subject_and_spki, CertificateChain, ChainLink, KeyExtractionError,
};
use crate::strategy::TrustDelegate;

/// A certificate a chain must contain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedCertificate {
    der: Option<CertificateDer<'static>>,
    subject: Vec<u8>,
    spki: Vec<u8>,
}

impl PinnedCertificate {
    /// Pin a DER certificate
    pub fn from_der(der: CertificateDer<'static>) -> Result<Self, KeyExtractionError> {
        let (subject, spki) = subject_and_spki(der.as_ref())?;
        Ok(Self {
            der: Some(der),
            subject,
            spki,
        })
    }

    /// Pin the certificate behind a root store entry
    ///
    /// Without certificate bytes, presented certificates match on subject and
    /// public key as anchors do.
    pub fn from_anchor(anchor: &TrustAnchor<'_>) -> Self {
        let (subject, spki) = anchor_subject_and_spki(anchor);
        Self {
            der: None,
            subject,
            spki,
        }
    }

    /// Whether `link` is this certificate
    pub fn matches(&self, link: &ChainLink) -> bool {
        match (link, &self.der) {
            (ChainLink::Certificate(der), Some(pinned)) => der == pinned,
            (ChainLink::Certificate(der), None) => match subject_and_spki(der.as_ref()) {
                Ok((subject, spki)) => subject == self.subject && spki == self.spki,
                Err(_) => false,
            },
            (ChainLink::TrustAnchor { subject, spki }, _) => {
                *subject == self.subject && spki.as_ref() == self.spki.as_slice()
            }
        }
    }
}

/// Delegate that accepts trusted chains containing a pinned certificate
#[derive(Debug, Clone, Default)]
pub struct CertificatePins {
    certificates: Vec<PinnedCertificate>,
}

impl CertificatePins {
    /// Pins for `certificates`; an empty set accepts any trusted chain
    pub fn new(certificates: impl IntoIterator<Item = PinnedCertificate>) -> Self {
        Self {
            certificates: certificates.into_iter().collect(),
        }
    }

    /// Number of pinned certificates
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// True when nothing is pinned
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

impl TrustDelegate for CertificatePins {
    fn evaluate(&self, host: &str, chain: &CertificateChain, platform: PlatformTrust) -> Decision {
        if platform == PlatformTrust::Untrusted {
            return Decision::Reject;
        }
        if self.certificates.is_empty() {
            return Decision::Accept;
        }

        for (position, link) in chain.iter().enumerate() {
            if self.certificates.iter().any(|pinned| pinned.matches(link)) {
                debug!(host, position, kind = link.kind(), "pinned certificate found");
                return Decision::Accept;
            }
        }
        debug!(host, chain_len = chain.len(), "no pinned certificate in chain");
        Decision::Reject
    }
}
