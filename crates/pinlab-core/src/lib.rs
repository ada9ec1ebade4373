//! # pinlab core
//!
//! SPKI public-key pinning on top of rustls, and an executor that runs HTTP
//! requests under a pinning strategy while publishing their lifecycle.
//!
//! ## Architecture
//!
//! ```text
//! PinnedRequestExecutor
//! ├── RequestDefinition (name, url, TrustStrategy)
//! │   └── TrustStrategy: NoPinning | PinByHash | ExternalLibraryDelegate
//! ├── TLS handshake (tokio-rustls, ring)
//! │   └── PinningServerCertVerifier
//! │       ├── WebPkiServerVerifier (chain + hostname)
//! │       ├── CertificateChain (the validated path, leaf to anchor)
//! │       └── PinValidator / TrustDelegate (SPKI or certificate pins)
//! └── RequestState (snapshot + broadcast of transitions)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pinlab_core::{ExecutorConfig, PinnedRequestExecutor, RequestDefinition, RequestState};
//! use pinlab_types::PinConfiguration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = PinnedRequestExecutor::new(ExecutorConfig::default())?;
//! let pins = PinConfiguration::new(["C5+lpZ7tcVwmwQIMcRtPbsQtWLABXhQzejna0wHFr8M="])?;
//! let def = RequestDefinition::pinned("Root pinning", "https://ecc384.badssl.com", pins);
//! let state = RequestState::new();
//! let status = executor.execute(&def, &state).await?;
//! assert_eq!(status, 200);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces
)]
#![warn(missing_docs, missing_debug_implementations)]

mod cert_pin;
mod chain;
mod client;
mod error;
mod http;
pub mod pin_registry;
mod state;
mod strategy;
mod validator;
mod verifier;

pub use cert_pin::{CertificatePins, PinnedCertificate};
pub use chain::{
    spki_hash_of_certificate, spki_hash_of_spki, CertificateChain, ChainLink, KeyExtractionError,
};
pub use client::{ExecutorConfig, PinnedRequestExecutor, DEFAULT_MAX_RESPONSE_HEAD_BYTES};
pub use error::{PinlabError, Result};
pub use pin_registry::RegistryDelegate;
pub use state::RequestState;
pub use strategy::{RequestDefinition, TrustDelegate, TrustStrategy};
pub use validator::PinValidator;
pub use verifier::{is_pin_rejection, PinningServerCertVerifier};
