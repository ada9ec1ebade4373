//! Certificate chains as seen by the pin validator
//!
//! During a handshake the chain is the path webpki validated: end entity, the
//! intermediates it actually used, then the trust anchor it ended in. Extra
//! certificates the peer sends but the path does not need never take part in
//! a pin check. Servers rarely send their root, so the anchor comes from the
//! root store, which is what makes root pins usable.

use rustls::pki_types::{
    CertificateDer, SignatureVerificationAlgorithm, SubjectPublicKeyInfoDer, TrustAnchor, UnixTime,
};
use rustls::RootCertStore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use webpki::{EndEntityCert, KeyUsage, VerifiedPath};
use x509_parser::prelude::*;

use pinlab_types::SpkiHash;

/// ASN.1 SEQUENCE tag
const DER_SEQUENCE: u8 = 0x30;

/// The public key of a chain element could not be read
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot extract public key: {0}")]
pub struct KeyExtractionError(String);

/// One element of a certificate chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainLink {
    /// DER certificate presented by the peer
    Certificate(CertificateDer<'static>),
    /// Trust anchor from the local root store
    TrustAnchor {
        /// DER subject name
        subject: Vec<u8>,
        /// DER SubjectPublicKeyInfo
        spki: SubjectPublicKeyInfoDer<'static>,
    },
}

impl ChainLink {
    /// Link for a root store entry
    pub fn anchor(anchor: &TrustAnchor<'_>) -> Self {
        let (subject, spki) = anchor_subject_and_spki(anchor);
        ChainLink::TrustAnchor {
            subject,
            spki: SubjectPublicKeyInfoDer::from(spki),
        }
    }

    /// SPKI pin of this element
    pub fn spki_hash(&self) -> Result<SpkiHash, KeyExtractionError> {
        match self {
            ChainLink::Certificate(der) => spki_hash_of_certificate(der.as_ref()),
            ChainLink::TrustAnchor { spki, .. } => Ok(spki_hash_of_spki(spki.as_ref())),
        }
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ChainLink::Certificate(_) => "certificate",
            ChainLink::TrustAnchor { .. } => "trust_anchor",
        }
    }
}

/// Ordered, leaf-first snapshot of a peer's chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateChain {
    links: Vec<ChainLink>,
}

impl CertificateChain {
    /// Chain made only of the given DER certificates, in order
    pub fn from_certificates(certs: &[CertificateDer<'_>]) -> Self {
        Self {
            links: certs.iter().map(owned_certificate).collect(),
        }
    }

    /// Chain as presented during a handshake: end entity first, then intermediates
    pub fn presented(
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
    ) -> Self {
        let mut links = Vec::with_capacity(intermediates.len() + 1);
        links.push(owned_certificate(end_entity));
        links.extend(intermediates.iter().map(owned_certificate));
        Self { links }
    }

    /// Chain along the path webpki builds from `end_entity` to one of `roots`
    ///
    /// `intermediates` are only candidates: the result holds the end entity,
    /// the intermediates the validated path goes through, and its anchor.
    pub fn validated_path(
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        roots: &RootCertStore,
        algorithms: &[&dyn SignatureVerificationAlgorithm],
        now: UnixTime,
    ) -> Result<Self, webpki::Error> {
        let cert = EndEntityCert::try_from(end_entity)?;
        let path = cert.verify_for_usage(
            algorithms,
            &roots.roots,
            intermediates,
            now,
            KeyUsage::server_auth(),
            None,
            None,
        )?;
        Ok(Self::from_path(end_entity, &path))
    }

    fn from_path(end_entity: &CertificateDer<'_>, path: &VerifiedPath<'_>) -> Self {
        let mut links = vec![owned_certificate(end_entity)];
        links.extend(
            path.intermediate_certificates()
                .map(|cert| owned_certificate(&cert.der())),
        );
        links.push(ChainLink::anchor(path.anchor()));
        Self { links }
    }

    /// Append an arbitrary link
    pub fn push(&mut self, link: ChainLink) {
        self.links.push(link);
    }

    /// Iterate leaf first
    pub fn iter(&self) -> impl Iterator<Item = &ChainLink> {
        self.links.iter()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// True for a chain with no elements
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Pin of the public key carried by a DER certificate
///
/// Hashes the complete `subjectPublicKeyInfo` field, algorithm identifier included.
pub fn spki_hash_of_certificate(der: &[u8]) -> Result<SpkiHash, KeyExtractionError> {
    let (_, spki) = subject_and_spki(der)?;
    Ok(spki_hash_of_spki(&spki))
}

/// Pin of a DER SubjectPublicKeyInfo
pub fn spki_hash_of_spki(spki_der: &[u8]) -> SpkiHash {
    let digest: [u8; 32] = Sha256::digest(spki_der).into();
    SpkiHash::from_digest(digest)
}

/// DER subject name and DER SubjectPublicKeyInfo of a certificate
pub(crate) fn subject_and_spki(der: &[u8]) -> Result<(Vec<u8>, Vec<u8>), KeyExtractionError> {
    let (_, cert) =
        X509Certificate::from_der(der).map_err(|e| KeyExtractionError(e.to_string()))?;
    let spki = cert.public_key().raw;
    if spki.is_empty() {
        return Err(KeyExtractionError("empty subjectPublicKeyInfo".to_string()));
    }
    Ok((cert.subject().as_raw().to_vec(), spki.to_vec()))
}

/// DER subject name and DER SubjectPublicKeyInfo of a root store entry
pub(crate) fn anchor_subject_and_spki(anchor: &TrustAnchor<'_>) -> (Vec<u8>, Vec<u8>) {
    // Root stores keep both fields without their outer SEQUENCE header.
    (
        der_sequence(anchor.subject.as_ref()),
        der_sequence(anchor.subject_public_key_info.as_ref()),
    )
}

fn owned_certificate(der: &CertificateDer<'_>) -> ChainLink {
    ChainLink::Certificate(der.clone().into_owned())
}

/// Wrap `contents` in a DER SEQUENCE header
fn der_sequence(contents: &[u8]) -> Vec<u8> {
    let len = contents.len();
    let mut out = Vec::with_capacity(len + 6);
    out.push(DER_SEQUENCE);
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(contents);
    out
}
