//! Process-wide pin registry and the delegate that consults it
//!
//! The shared registry is installed by an explicit [`initialize`] call and removed
//! by [`teardown`]. Nothing is initialized implicitly on first use.

use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use pinlab_types::{Decision, PinRegistry, PlatformTrust, RegistryError};

use crate::chain::CertificateChain;
use crate::error::Result;
use crate::strategy::TrustDelegate;
use crate::validator::PinValidator;

static SHARED: RwLock<Option<Arc<PinRegistry>>> = RwLock::new(None);

/// [`TrustDelegate`] backed by a host-keyed [`PinRegistry`]
///
/// Hosts without an entry are rejected.
#[derive(Debug, Clone)]
pub struct RegistryDelegate {
    registry: Arc<PinRegistry>,
    validator: PinValidator,
}

impl RegistryDelegate {
    /// Delegate over `registry`
    pub fn new(registry: Arc<PinRegistry>) -> Self {
        Self {
            registry,
            validator: PinValidator::new(),
        }
    }

    /// The registry this delegate consults
    pub fn registry(&self) -> &PinRegistry {
        &self.registry
    }
}

impl TrustDelegate for RegistryDelegate {
    fn evaluate(&self, host: &str, chain: &CertificateChain, platform: PlatformTrust) -> Decision {
        match self.registry.pins_for(host) {
            Some(pins) => self.validator.evaluate(chain, pins, platform),
            None => {
                warn!(host, "host has no registry entry, rejecting");
                Decision::Reject
            }
        }
    }
}

/// Read a JSON registry document from disk
pub fn load_from_path(path: impl AsRef<Path>) -> Result<PinRegistry> {
    let path = path.as_ref();
    let document = std::fs::read_to_string(path)?;
    let registry = PinRegistry::from_json(&document)?;
    debug!(path = %path.display(), hosts = registry.len(), "loaded pin registry");
    Ok(registry)
}

/// Install the shared registry
///
/// Fails with [`RegistryError::AlreadyInitialized`] if one is installed; the
/// existing registry is kept.
pub fn initialize(registry: PinRegistry) -> core::result::Result<(), RegistryError> {
    let mut shared = write_shared();
    if shared.is_some() {
        return Err(RegistryError::AlreadyInitialized);
    }
    info!(hosts = registry.len(), "pin registry initialized");
    *shared = Some(Arc::new(registry));
    Ok(())
}

/// Delegate over the shared registry
pub fn shared_delegate() -> core::result::Result<Arc<RegistryDelegate>, RegistryError> {
    read_shared()
        .as_ref()
        .map(|registry| Arc::new(RegistryDelegate::new(Arc::clone(registry))))
        .ok_or(RegistryError::NotInitialized)
}

/// Remove the shared registry so it can be initialized again
///
/// Delegates handed out earlier keep the registry they captured.
pub fn teardown() {
    if write_shared().take().is_some() {
        info!("pin registry torn down");
    }
}

/// Whether a shared registry is installed
pub fn is_initialized() -> bool {
    read_shared().is_some()
}

// A panic while holding the lock cannot leave the Option half-written.
fn read_shared() -> RwLockReadGuard<'static, Option<Arc<PinRegistry>>> {
    SHARED.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_shared() -> RwLockWriteGuard<'static, Option<Arc<PinRegistry>>> {
    SHARED.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
