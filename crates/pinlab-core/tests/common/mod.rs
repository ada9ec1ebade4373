//! Local PKI and servers shared by the integration tests
#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pinlab_core::{spki_hash_of_spki, ExecutorConfig, PinnedRequestExecutor};
use pinlab_types::SpkiHash;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair, SanType,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

/// Pin that matches no real key
pub const DUD_PIN: &str = "ABCABCABCABCABCABCABCABCABCABCABCABCABCABCA=";

/// root -> intermediate -> leaf for `localhost` and 127.0.0.1
pub struct TestPki {
    pub root: CertificateDer<'static>,
    pub intermediate: CertificateDer<'static>,
    pub leaf: CertificateDer<'static>,
    leaf_key: Vec<u8>,
    pub root_pin: SpkiHash,
    pub intermediate_pin: SpkiHash,
    pub leaf_pin: SpkiHash,
}

impl TestPki {
    pub fn generate(label: &str) -> Self {
        let root_key = KeyPair::generate().expect("root key");
        let mut root_params = CertificateParams::new(Vec::<String>::new()).expect("root params");
        root_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        root_params
            .distinguished_name
            .push(DnType::CommonName, format!("{label} root"));
        let root = root_params.self_signed(&root_key).expect("root cert");

        let int_key = KeyPair::generate().expect("intermediate key");
        let mut int_params =
            CertificateParams::new(Vec::<String>::new()).expect("intermediate params");
        int_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        int_params
            .distinguished_name
            .push(DnType::CommonName, format!("{label} intermediate"));
        let intermediate = int_params
            .signed_by(&int_key, &root, &root_key)
            .expect("intermediate cert");

        let leaf_key = KeyPair::generate().expect("leaf key");
        let mut leaf_params =
            CertificateParams::new(vec!["localhost".to_string()]).expect("leaf params");
        leaf_params
            .subject_alt_names
            .push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        leaf_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let leaf = leaf_params
            .signed_by(&leaf_key, &intermediate, &int_key)
            .expect("leaf cert");

        Self {
            root: root.der().clone(),
            intermediate: intermediate.der().clone(),
            leaf: leaf.der().clone(),
            leaf_key: leaf_key.serialize_der(),
            root_pin: spki_hash_of_spki(&root_key.public_key_der()),
            intermediate_pin: spki_hash_of_spki(&int_key.public_key_der()),
            leaf_pin: spki_hash_of_spki(&leaf_key.public_key_der()),
        }
    }

    /// Server config sending leaf, intermediate, then `extra`
    fn server_config(&self, extra: &[CertificateDer<'static>]) -> Arc<ServerConfig> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.leaf_key.clone()));
        let mut chain = vec![self.leaf.clone(), self.intermediate.clone()];
        chain.extend_from_slice(extra);
        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .expect("protocol versions")
            .with_no_client_auth()
            .with_single_cert(chain, key)
            .expect("server cert");
        Arc::new(config)
    }
}

/// Executor trusting only the root of `pki`
pub fn executor_for(pki: &TestPki) -> PinnedRequestExecutor {
    executor_with_timeout(pki, Duration::from_secs(5))
}

pub fn executor_with_timeout(pki: &TestPki, timeout: Duration) -> PinnedRequestExecutor {
    PinnedRequestExecutor::new(ExecutorConfig {
        timeout,
        use_webpki_roots: false,
        extra_roots: vec![pki.root.clone()],
        ..ExecutorConfig::default()
    })
    .expect("executor")
}

/// Local server answering every request with a fixed status
pub struct TestServer {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// HTTPS server presenting the leaf and intermediate of `pki`
    pub async fn https(pki: &TestPki, status: u16) -> Self {
        Self::https_presenting(pki, status, &[]).await
    }

    /// HTTPS server that also sends `extra` after its own chain
    pub async fn https_presenting(
        pki: &TestPki,
        status: u16,
        extra: &[CertificateDer<'static>],
    ) -> Self {
        let acceptor = TlsAcceptor::from(pki.server_config(extra));
        Self::spawn(move |tcp| {
            let acceptor = acceptor.clone();
            async move {
                // Handshakes the client aborts end here.
                if let Ok(mut tls) = acceptor.accept(tcp).await {
                    respond(&mut tls, status).await;
                }
            }
        })
        .await
    }

    /// Plain HTTP server
    pub async fn plain(status: u16) -> Self {
        Self::spawn(move |mut tcp| async move { respond(&mut tcp, status).await }).await
    }

    /// Accepts connections and never sends a byte
    pub async fn silent() -> Self {
        Self::spawn(|tcp| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(tcp);
        })
        .await
    }

    async fn spawn<F, Fut>(handler: F) -> Self
    where
        F: Fn(tokio::net::TcpStream) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connections);
        let handle = tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(handler(tcp));
            }
        });
        Self {
            addr,
            connections,
            handle,
        }
    }

    /// URL on `localhost` with the given scheme
    pub fn url(&self, scheme: &str) -> String {
        format!("{}://localhost:{}/status", scheme, self.addr.port())
    }

    /// TCP connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn respond<S>(stream: &mut S, status: u16)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        503 => "Service Unavailable",
        _ => "Status",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok"
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Port with nothing listening on it
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.expect("bind");
    listener.local_addr().expect("local addr").port()
}
