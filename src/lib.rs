//! pinlab
//!
//! TLS public-key pinning for outbound HTTPS requests, with an observable
//! request lifecycle.
//!
//! The demo catalog lives in the `pinlab-demo` binary crate.

// This file serves as the library root for the workspace.

pub use pinlab_core::*;
pub use pinlab_types::*;
