//! # pinlab types
//!
//! Plain data shared by the pinning core and its callers: pin material, the
//! request lifecycle, trust decisions and the error taxonomy. Nothing in this
//! crate performs I/O.
//!
//! ## Architecture
//!
//! ```text
//! PinRegistry (host -> PinConfiguration)
//! └── PinConfiguration
//!     └── SpkiHash (Base64 SHA-256 of a SubjectPublicKeyInfo)
//!
//! RequestSnapshot (published on every transition)
//! ├── RequestPhase: Idle -> Loading -> Succeeded | Failed
//! └── RequestError: MalformedUrl | TrustRejected | Transport | UnexpectedStatus | Aborted
//! ```

#![forbid(unsafe_code)]
#![deny(
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces
)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod errors;
pub mod pins;
pub mod request;

pub use errors::{PinConfigError, RegistryError, RequestError, TransportErrorKind};
pub use pins::{PinConfiguration, PinRegistry, SpkiHash, SPKI_DIGEST_LEN};
pub use request::{Decision, PlatformTrust, RequestPhase, RequestSnapshot};

/// Status code that counts as a successful execution
pub const SUCCESS_STATUS: u16 = 200;

/// Default bound on a whole request execution, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
