//! Pinned request execution with rustls + ring
//!
//! [`PinnedRequestExecutor`] drives one uncached GET per call. Each call gets a
//! fresh `ClientConfig` carrying the definition's trust strategy, a fresh TCP
//! connection and no session resumption, so every execution re-runs the full
//! handshake and pin check.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use rustls::client::{Resumption, WebPkiServerVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio_rustls::TlsConnector;
use tracing::{debug, info, instrument, warn};
use url::{Host, Url};

use pinlab_types::{RequestError, TransportErrorKind, DEFAULT_TIMEOUT_SECS, SUCCESS_STATUS};

use crate::error::{PinlabError, Result};
use crate::http::{build_get_request, parse_status, read_response_head};
use crate::state::RequestState;
use crate::strategy::{RequestDefinition, TrustStrategy};
use crate::verifier::{is_pin_rejection, PinningServerCertVerifier};

/// Default cap on the size of a response head
pub const DEFAULT_MAX_RESPONSE_HEAD_BYTES: usize = 64 * 1024;

/// Executor settings
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Bound on a whole execution: DNS, connect, handshake, request and response head
    pub timeout: Duration,
    /// `User-Agent` header value
    pub user_agent: String,
    /// Largest response head accepted before the exchange is abandoned
    pub max_response_head_bytes: usize,
    /// Trust the bundled Mozilla roots
    pub use_webpki_roots: bool,
    /// Additional DER trust anchors
    pub extra_roots: Vec<CertificateDer<'static>>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: format!("pinlab/{}", env!("CARGO_PKG_VERSION")),
            max_response_head_bytes: DEFAULT_MAX_RESPONSE_HEAD_BYTES,
            use_webpki_roots: true,
            extra_roots: Vec::new(),
        }
    }
}

/// Executes request definitions and records their lifecycle
#[derive(Debug)]
pub struct PinnedRequestExecutor {
    config: ExecutorConfig,
    roots: Arc<RootCertStore>,
    provider: Arc<CryptoProvider>,
    webpki: Arc<WebPkiServerVerifier>,
}

impl PinnedRequestExecutor {
    /// Build an executor, loading the trust roots once
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        if config.timeout.is_zero() {
            return Err(PinlabError::config("timeout must be greater than zero"));
        }
        if config.max_response_head_bytes == 0 {
            return Err(PinlabError::config("max_response_head_bytes must be greater than zero"));
        }

        let roots = Arc::new(Self::create_root_store(&config)?);
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let webpki =
            WebPkiServerVerifier::builder_with_provider(Arc::clone(&roots), Arc::clone(&provider))
                .build()
                .map_err(|e| {
                    PinlabError::tls(format!("cannot build certificate verifier: {}", e))
                })?;

        info!(
            roots = roots.len(),
            timeout_ms = config.timeout.as_millis() as u64,
            "pinned request executor ready"
        );
        Ok(Self {
            config,
            roots,
            provider,
            webpki,
        })
    }

    fn create_root_store(config: &ExecutorConfig) -> Result<RootCertStore> {
        let mut store = RootCertStore::empty();
        if config.use_webpki_roots {
            store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
        for der in &config.extra_roots {
            store.add(der.clone())?;
        }
        if store.is_empty() {
            return Err(PinlabError::config("no trust roots configured"));
        }
        Ok(store)
    }

    /// Settings this executor was built with
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute `def` once, recording every transition in `state`
    ///
    /// Returns the status code on HTTP 200. A URL that does not parse fails
    /// without entering `Loading` and without any I/O. Every other outcome
    /// passes through `Loading` and ends in exactly one terminal phase, also
    /// when the returned future is dropped early.
    #[instrument(skip_all, fields(request = %def.name(), url = %def.url()))]
    pub async fn execute(
        &self,
        def: &RequestDefinition,
        state: &RequestState,
    ) -> core::result::Result<u16, RequestError> {
        let url = match parse_target(def.url()) {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "refusing malformed request URL");
                state.fail_before_loading(err.clone());
                return Err(err);
            }
        };

        let guard = state.begin_loading();
        let exchange = self.exchange(&url, def.trust());
        let outcome = match tokio::time::timeout(self.config.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(RequestError::transport(
                TransportErrorKind::Timeout,
                format!("no response within {:?}", self.config.timeout),
            )),
        }
        .and_then(|status| match status {
            SUCCESS_STATUS => Ok(status),
            other => Err(RequestError::UnexpectedStatus(other)),
        });

        match &outcome {
            Ok(status) => {
                info!(status, "request succeeded");
                guard.succeed(*status);
            }
            Err(err) => {
                warn!(code = err.code(), error = %err, "request failed");
                guard.fail(err.clone());
            }
        }
        outcome
    }

    async fn exchange(
        &self,
        url: &Url,
        trust: &TrustStrategy,
    ) -> core::result::Result<u16, RequestError> {
        if url.scheme() == "http" && trust.requires_certificate() {
            return Err(RequestError::TrustRejected(
                "plain HTTP presents no certificate to satisfy the pin".to_string(),
            ));
        }

        let mut tcp = connect(url).await?;
        if url.scheme() == "http" {
            return self.round_trip(&mut tcp, url).await;
        }

        let server_name = server_name(url)?;
        let connector = TlsConnector::from(Arc::new(self.client_config(trust)?));
        let mut tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(classify_handshake_error)?;
        debug!(strategy = trust.label(), "TLS handshake complete");
        self.round_trip(&mut tls, url).await
    }

    fn client_config(
        &self,
        trust: &TrustStrategy,
    ) -> core::result::Result<ClientConfig, RequestError> {
        let verifier = Arc::new(PinningServerCertVerifier::new(
            Arc::clone(&self.webpki),
            Arc::clone(&self.roots),
            self.provider.signature_verification_algorithms,
            trust.clone(),
        ));
        let mut config = ClientConfig::builder_with_provider(Arc::clone(&self.provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| RequestError::transport(TransportErrorKind::Tls, e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_no_client_auth();
        config.resumption = Resumption::disabled();
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Ok(config)
    }

    async fn round_trip<S>(
        &self,
        stream: &mut S,
        url: &Url,
    ) -> core::result::Result<u16, RequestError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request = build_get_request(url, &self.config.user_agent);
        stream
            .write_all(&request)
            .await
            .map_err(|e| io_error(format!("failed to send request: {}", e)))?;
        stream
            .flush()
            .await
            .map_err(|e| io_error(format!("failed to flush request: {}", e)))?;

        let head = read_response_head(stream, self.config.max_response_head_bytes).await?;
        let status = parse_status(&head)?;
        debug!(status, head_bytes = head.len(), "response head received");
        Ok(status)
    }
}

/// Parse and vet a request URL; only `http` and `https` with a host are accepted
fn parse_target(raw: &str) -> core::result::Result<Url, RequestError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| RequestError::MalformedUrl(format!("{:?}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(RequestError::MalformedUrl(format!("unsupported scheme {:?}", other)));
        }
    }
    if url.host().is_none() {
        return Err(RequestError::MalformedUrl(format!("{:?} has no host", raw)));
    }
    Ok(url)
}

async fn connect(url: &Url) -> core::result::Result<TcpStream, RequestError> {
    let port = url.port_or_known_default().unwrap_or(443);
    let addrs: Vec<SocketAddr> = match url.host() {
        Some(Host::Domain(domain)) => lookup_host((domain, port))
            .await
            .map_err(|e| {
                RequestError::transport(TransportErrorKind::Dns, format!("{}: {}", domain, e))
            })?
            .collect(),
        Some(Host::Ipv4(ip)) => vec![SocketAddr::new(IpAddr::V4(ip), port)],
        Some(Host::Ipv6(ip)) => vec![SocketAddr::new(IpAddr::V6(ip), port)],
        None => return Err(RequestError::MalformedUrl("URL has no host".to_string())),
    };
    if addrs.is_empty() {
        return Err(RequestError::transport(
            TransportErrorKind::Dns,
            format!("no addresses for {}", url.host_str().unwrap_or_default()),
        ));
    }

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                debug!(%addr, "connected");
                return Ok(stream);
            }
            Err(e) => {
                debug!(%addr, error = %e, "connect attempt failed");
                last_error = Some(format!("{}: {}", addr, e));
            }
        }
    }
    Err(RequestError::transport(
        TransportErrorKind::Connect,
        last_error.unwrap_or_else(|| "no address reachable".to_string()),
    ))
}

fn server_name(url: &Url) -> core::result::Result<ServerName<'static>, RequestError> {
    match url.host() {
        Some(Host::Domain(domain)) => ServerName::try_from(domain.to_string()).map_err(|e| {
            RequestError::MalformedUrl(format!("invalid server name {:?}: {}", domain, e))
        }),
        Some(Host::Ipv4(ip)) => Ok(ServerName::from(IpAddr::V4(ip))),
        Some(Host::Ipv6(ip)) => Ok(ServerName::from(IpAddr::V6(ip))),
        None => Err(RequestError::MalformedUrl("URL has no host".to_string())),
    }
}

fn io_error(message: String) -> RequestError {
    RequestError::transport(TransportErrorKind::Io, message)
}

/// Map a handshake failure to a request error, separating pin rejections from
/// every other TLS failure
fn classify_handshake_error(err: std::io::Error) -> RequestError {
    match err.get_ref().and_then(|inner| inner.downcast_ref::<rustls::Error>()) {
        Some(tls) if is_pin_rejection(tls) => RequestError::TrustRejected(
            "certificate chain does not match any configured pin".to_string(),
        ),
        Some(tls) => RequestError::transport(TransportErrorKind::Tls, tls.to_string()),
        None => RequestError::transport(
            TransportErrorKind::Tls,
            format!("handshake failed: {}", err),
        ),
    }
}
