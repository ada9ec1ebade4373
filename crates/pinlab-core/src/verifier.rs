//! Handshake trust hook
//!
//! [`PinningServerCertVerifier`] runs the stock webpki chain and hostname checks
//! first, then applies the request's [`TrustStrategy`] to the path webpki
//! validated. It is called synchronously from inside the rustls handshake and
//! never blocks.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::{debug, warn};

use pinlab_types::{Decision, PlatformTrust};

use crate::chain::CertificateChain;
use crate::strategy::TrustStrategy;
use crate::validator::PinValidator;

/// rustls error carried out of the handshake when a pin check rejects the chain
pub fn pin_rejection() -> rustls::Error {
    rustls::Error::InvalidCertificate(CertificateError::ApplicationVerificationFailure)
}

/// Whether `err` is the error produced by [`pin_rejection`]
pub fn is_pin_rejection(err: &rustls::Error) -> bool {
    matches!(
        err,
        rustls::Error::InvalidCertificate(CertificateError::ApplicationVerificationFailure)
    )
}

/// Server certificate verifier that narrows webpki trust with a [`TrustStrategy`]
#[derive(Debug)]
pub struct PinningServerCertVerifier {
    inner: Arc<WebPkiServerVerifier>,
    roots: Arc<RootCertStore>,
    algorithms: WebPkiSupportedAlgorithms,
    strategy: TrustStrategy,
    validator: PinValidator,
}

impl PinningServerCertVerifier {
    /// Wrap `inner`, pinning over the paths it validates
    ///
    /// `roots` and `algorithms` should be the ones `inner` was built with.
    pub fn new(
        inner: Arc<WebPkiServerVerifier>,
        roots: Arc<RootCertStore>,
        algorithms: WebPkiSupportedAlgorithms,
        strategy: TrustStrategy,
    ) -> Self {
        Self {
            inner,
            roots,
            algorithms,
            strategy,
            validator: PinValidator::new(),
        }
    }

    fn decide(&self, host: &str, chain: &CertificateChain) -> Decision {
        // Only reached once webpki accepted the chain.
        let platform = PlatformTrust::Trusted;
        match &self.strategy {
            TrustStrategy::NoPinning => Decision::Accept,
            TrustStrategy::PinByHash(config) => self.validator.evaluate(chain, config, platform),
            TrustStrategy::ExternalLibraryDelegate(delegate) => {
                delegate.evaluate(host, chain, platform)
            }
        }
    }
}

impl ServerCertVerifier for PinningServerCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let verified = self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
            .inspect_err(|e| debug!(error = %e, "standard certificate validation failed"))?;

        if matches!(self.strategy, TrustStrategy::NoPinning) {
            return Ok(verified);
        }

        let host = server_name.to_str();
        let chain = match CertificateChain::validated_path(
            end_entity,
            intermediates,
            &self.roots,
            self.algorithms.all,
            now,
        ) {
            Ok(chain) => chain,
            Err(e) => {
                warn!(host = %host, error = %e, "cannot rebuild the validated path");
                return Err(pin_rejection());
            }
        };

        match self.decide(&host, &chain) {
            Decision::Accept => Ok(verified),
            Decision::Reject => {
                warn!(
                    host = %host,
                    strategy = self.strategy.label(),
                    chain_len = chain.len(),
                    presented = intermediates.len() + 1,
                    "certificate chain rejected by pin check"
                );
                Err(pin_rejection())
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
