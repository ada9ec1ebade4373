//! Built-in request catalog and pin registry

use std::sync::Arc;

use serde::Serialize;

use pinlab_core::{
    CertificatePins, ChainLink, PinlabError, PinnedCertificate, RequestDefinition, TrustDelegate,
};
use pinlab_types::{PinConfigError, PinConfiguration, PinRegistry, SpkiHash};

/// SPKI pin of ISRG Root X1
pub const ISRG_ROOT_X1_PIN: &str = "C5+lpZ7tcVwmwQIMcRtPbsQtWLABXhQzejna0wHFr8M=";

/// Well-formed pin that matches no key, used as a backup pin and to show a failure
pub const DUD_PIN: &str = "ABCABCABCABCABCABCABCABCABCABCABCABCABCABCA=";

/// Pin of the raw ecc384.badssl.com key bytes rather than its SPKI
///
/// Never matches an SPKI pin; kept to show the difference.
pub const ECC384_KEY_PIN: &str = "9Fk6HgfMnM7/vtnBHcUhg1b3gU2bIpSd50XmKZkMbGA=";

const UNPINNED_HOST: &str = "amiusing.httptoolkit.tech";

/// Which section of the report a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    /// Platform trust only
    Unpinned,
    /// Narrowed by pins
    Pinned,
}

/// How a catalog request is meant to end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// Should reach `Succeeded`
    Success,
    /// Demonstrates a rejection
    Failure,
}

/// One catalog request
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Report section
    pub group: Group,
    /// Intended outcome
    pub expected: Expectation,
    /// What to execute
    pub definition: RequestDefinition,
}

/// Registry used when no registry file is configured
///
/// Both hosts carry a backup pin that never matches.
pub fn builtin_registry() -> Result<PinRegistry, PinConfigError> {
    let pins = PinConfiguration::new([ISRG_ROOT_X1_PIN, DUD_PIN])?;
    let mut registry = PinRegistry::new();
    registry.insert("sha256.badssl.com", pins.clone());
    registry.insert("ecc256.badssl.com", pins);
    Ok(registry)
}

/// ISRG Root X1 as found in the bundled Mozilla roots
pub fn isrg_root_x1() -> Result<PinnedCertificate, PinlabError> {
    let pin = SpkiHash::parse(ISRG_ROOT_X1_PIN)?;
    webpki_roots::TLS_SERVER_ROOTS
        .iter()
        .find(|anchor| matches!(ChainLink::anchor(anchor).spki_hash(), Ok(hash) if hash == pin))
        .map(PinnedCertificate::from_anchor)
        .ok_or_else(|| PinlabError::config("ISRG Root X1 is missing from the bundled roots"))
}

/// The full catalog; `delegate` serves the registry-backed requests
pub fn catalog(delegate: Arc<dyn TrustDelegate>) -> Result<Vec<CatalogEntry>, PinlabError> {
    let entry = |group, expected, definition| CatalogEntry {
        group,
        expected,
        definition,
    };
    let unpinned = |definition| entry(Group::Unpinned, Expectation::Success, definition);
    let pinned = |definition| entry(Group::Pinned, Expectation::Success, definition);
    let rejected = |definition| entry(Group::Pinned, Expectation::Failure, definition);

    let isrg_certificate = Arc::new(CertificatePins::new([isrg_root_x1()?]));

    Ok(vec![
        unpinned(RequestDefinition::new("Plain HTTP", format!("http://{}", UNPINNED_HOST))),
        unpinned(RequestDefinition::new("HTTPS", format!("https://{}", UNPINNED_HOST))),
        pinned(RequestDefinition::delegated(
            "Config-based pinning",
            "https://sha256.badssl.com",
            Arc::clone(&delegate),
        )),
        rejected(RequestDefinition::pinned(
            "Key pinning",
            "https://ecc384.badssl.com",
            PinConfiguration::new([ECC384_KEY_PIN])?,
        )),
        pinned(RequestDefinition::pinned(
            "Root pinning",
            "https://ecc384.badssl.com",
            PinConfiguration::new([ISRG_ROOT_X1_PIN])?,
        )),
        pinned(RequestDefinition::delegated(
            "Certificate pinning",
            "https://ecc384.badssl.com",
            isrg_certificate,
        )),
        pinned(RequestDefinition::delegated(
            "Registry pinning",
            "https://ecc256.badssl.com",
            delegate,
        )),
        rejected(RequestDefinition::pinned(
            "Broken pin",
            "https://ecc384.badssl.com",
            PinConfiguration::new([DUD_PIN])?,
        )),
    ])
}

/// Keep only entries whose name is listed, ignoring ASCII case
pub fn select(entries: Vec<CatalogEntry>, only: Option<&[String]>) -> Vec<CatalogEntry> {
    match only {
        None => entries,
        Some(names) => entries
            .into_iter()
            .filter(|entry| {
                names
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(entry.definition.name()))
            })
            .collect(),
    }
}
