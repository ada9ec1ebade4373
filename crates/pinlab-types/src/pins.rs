//! Pin material: SPKI digests, per-request pin sets and the hostname registry
//!
//! A pin is the standard-alphabet Base64 encoding of `SHA256(SubjectPublicKeyInfo)`.
//! Pins compare by exact string equality, which for canonical Base64 is the same
//! as comparing the 32 decoded digest bytes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::errors::{PinConfigError, RegistryError};

/// Length in bytes of a SHA-256 digest
pub const SPKI_DIGEST_LEN: usize = 32;

/// Base64-encoded SHA-256 digest of a SubjectPublicKeyInfo
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SpkiHash(String);

impl SpkiHash {
    /// Parse a Base64 pin, refusing anything that is not a 32-byte digest
    pub fn parse(value: impl Into<String>) -> Result<Self, PinConfigError> {
        let value = value.into();
        let decoded = STANDARD
            .decode(value.as_bytes())
            .map_err(|e| PinConfigError::InvalidHash {
                value: value.clone(),
                reason: e.to_string(),
            })?;
        if decoded.len() != SPKI_DIGEST_LEN {
            return Err(PinConfigError::InvalidHash {
                value,
                reason: format!(
                    "decodes to {} bytes, expected {}",
                    decoded.len(),
                    SPKI_DIGEST_LEN
                ),
            });
        }
        Ok(Self(value))
    }

    /// Encode a raw digest
    pub fn from_digest(digest: [u8; SPKI_DIGEST_LEN]) -> Self {
        Self(STANDARD.encode(digest))
    }

    /// The Base64 text of the pin
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpkiHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SpkiHash {
    type Error = PinConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SpkiHash> for String {
    fn from(hash: SpkiHash) -> Self {
        hash.0
    }
}

/// Set of acceptable SPKI pins for one request
///
/// An empty set disables pinning: only the platform's standard validation applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinConfiguration {
    #[serde(rename = "public_key_hashes")]
    hashes: BTreeSet<SpkiHash>,
}

impl PinConfiguration {
    /// Build from Base64 strings, failing on the first malformed pin
    pub fn new<I, S>(hashes: I) -> Result<Self, PinConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let hashes = hashes
            .into_iter()
            .map(SpkiHash::parse)
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { hashes })
    }

    /// Build from already-validated pins
    pub fn from_hashes(hashes: impl IntoIterator<Item = SpkiHash>) -> Self {
        Self {
            hashes: hashes.into_iter().collect(),
        }
    }

    /// A configuration that pins nothing
    pub fn disabled() -> Self {
        Self::default()
    }

    /// True when no pins are configured
    pub fn is_disabled(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Whether `hash` is one of the accepted pins
    pub fn contains(&self, hash: &SpkiHash) -> bool {
        self.hashes.contains(hash)
    }

    /// Number of pins
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Same as [`PinConfiguration::is_disabled`]
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Iterate pins in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &SpkiHash> {
        self.hashes.iter()
    }
}

/// Declarative pins keyed by host name
///
/// Used by callers that pin globally rather than per request. Host lookups are
/// ASCII case-insensitive and exact: `api.example.com` does not inherit the pins
/// of `example.com`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRegistry {
    pinned_domains: BTreeMap<String, PinConfiguration>,
}

impl PinRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON registry document
    ///
    /// ```json
    /// { "pinned_domains": { "example.com": { "public_key_hashes": ["..."] } } }
    /// ```
    pub fn from_json(document: &str) -> Result<Self, RegistryError> {
        let raw: PinRegistry = serde_json::from_str(document)?;
        let mut registry = PinRegistry::new();
        for (host, pins) in raw.pinned_domains {
            if host.trim().is_empty() {
                return Err(RegistryError::Load("empty host name".to_string()));
            }
            registry.insert(host, pins);
        }
        Ok(registry)
    }

    /// Pin `host` to `pins`, replacing any previous entry
    pub fn insert(&mut self, host: impl AsRef<str>, pins: PinConfiguration) {
        self.pinned_domains
            .insert(host.as_ref().trim().to_ascii_lowercase(), pins);
    }

    /// Pins configured for `host`
    pub fn pins_for(&self, host: &str) -> Option<&PinConfiguration> {
        self.pinned_domains.get(&host.to_ascii_lowercase())
    }

    /// Hosts with an entry, sorted
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.pinned_domains.keys().map(String::as_str)
    }

    /// Number of pinned hosts
    pub fn len(&self) -> usize {
        self.pinned_domains.len()
    }

    /// True when no host is pinned
    pub fn is_empty(&self) -> bool {
        self.pinned_domains.is_empty()
    }
}
