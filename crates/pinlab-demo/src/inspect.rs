//! Pin discovery for a live host

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{info, warn};

use pinlab_core::{
    CertificateChain, PinnedRequestExecutor, RequestDefinition, RequestState, TrustDelegate,
};
use pinlab_types::{Decision, PlatformTrust, RequestError, SpkiHash};

/// SPKI pin of one element of a served chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainPin {
    /// Position in the chain, leaf first
    pub position: usize,
    /// `certificate` or `trust_anchor`
    pub kind: &'static str,
    /// Base64 SPKI pin
    pub pin: SpkiHash,
}

/// Delegate that accepts platform-trusted chains and records their pins
#[derive(Debug, Default)]
pub struct RecordingDelegate {
    seen: Mutex<Vec<ChainPin>>,
}

impl RecordingDelegate {
    /// Pins recorded by the last evaluation
    pub fn pins(&self) -> Vec<ChainPin> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl TrustDelegate for RecordingDelegate {
    fn evaluate(&self, host: &str, chain: &CertificateChain, platform: PlatformTrust) -> Decision {
        let mut pins = Vec::with_capacity(chain.len());
        for (position, link) in chain.iter().enumerate() {
            match link.spki_hash() {
                Ok(pin) => pins.push(ChainPin {
                    position,
                    kind: link.kind(),
                    pin,
                }),
                Err(e) => warn!(host, position, error = %e, "cannot derive pin"),
            }
        }
        *self.seen.lock().unwrap_or_else(PoisonError::into_inner) = pins;

        match platform {
            PlatformTrust::Trusted => Decision::Accept,
            PlatformTrust::Untrusted => Decision::Reject,
        }
    }
}

/// Connect to `https://host` and return the pins of the chain it serves
///
/// The request itself may fail after the handshake, for example on a non-200
/// status; the pins are still returned as long as a chain was seen.
pub async fn show_pins(
    executor: &PinnedRequestExecutor,
    host: &str,
) -> Result<Vec<ChainPin>, RequestError> {
    let recorder = Arc::new(RecordingDelegate::default());
    let delegate: Arc<dyn TrustDelegate> = recorder.clone();
    let def = RequestDefinition::delegated(
        format!("Pins of {}", host),
        format!("https://{}", host),
        delegate,
    );
    let result = executor.execute(&def, &RequestState::new()).await;

    let pins = recorder.pins();
    match result {
        Err(err) if pins.is_empty() => Err(err),
        _ => {
            info!(host, count = pins.len(), "recorded chain pins");
            Ok(pins)
        }
    }
}
