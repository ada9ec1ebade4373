mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{closed_port, executor_for, executor_with_timeout, TestPki, TestServer, DUD_PIN};
use pinlab_core::{
    CertificatePins, PinnedCertificate, RegistryDelegate, RequestDefinition, RequestState,
    TrustStrategy,
};
use rustls::pki_types::CertificateDer;
use pinlab_types::{
    PinConfiguration, PinRegistry, RequestError, RequestPhase, RequestSnapshot, SpkiHash,
    TransportErrorKind,
};
use tokio::sync::broadcast::Receiver;

fn pins(hashes: &[&SpkiHash]) -> PinConfiguration {
    PinConfiguration::from_hashes(hashes.iter().map(|h| (*h).clone()))
}

fn drain(rx: &mut Receiver<RequestSnapshot>) -> Vec<RequestPhase> {
    std::iter::from_fn(|| rx.try_recv().ok()).map(|s| s.phase).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unpinned_request_succeeds() {
    let pki = TestPki::generate("scenario a");
    let server = TestServer::https(&pki, 200).await;
    let executor = executor_for(&pki);
    let state = RequestState::new();
    let mut rx = state.subscribe();

    let def = RequestDefinition::new("HTTPS", server.url("https"));
    let status = executor.execute(&def, &state).await.expect("status");

    assert_eq!(status, 200);
    assert_eq!(state.phase(), RequestPhase::Succeeded);
    assert_eq!(state.snapshot().status_code, Some(200));
    assert_eq!(drain(&mut rx), vec![RequestPhase::Loading, RequestPhase::Succeeded]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn matching_pin_succeeds_at_any_chain_position() {
    let pki = TestPki::generate("scenario b");
    let server = TestServer::https(&pki, 200).await;
    let executor = executor_for(&pki);

    // The root is never sent by the server; it comes from the trust store.
    for (label, pin) in [
        ("leaf", &pki.leaf_pin),
        ("intermediate", &pki.intermediate_pin),
        ("root", &pki.root_pin),
    ] {
        let state = RequestState::new();
        let def = RequestDefinition::pinned(label, server.url("https"), pins(&[pin]));
        let result = executor.execute(&def, &state).await;
        assert_eq!(result, Ok(200), "{label} pin");
        assert_eq!(state.phase(), RequestPhase::Succeeded);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fabricated_pin_is_trust_rejected() {
    let pki = TestPki::generate("scenario c");
    let server = TestServer::https(&pki, 200).await;
    let executor = executor_for(&pki);
    let state = RequestState::new();
    let mut rx = state.subscribe();

    let config = PinConfiguration::new([DUD_PIN]).expect("pin");
    let def = RequestDefinition::pinned("Broken pin", server.url("https"), config);
    let err = executor.execute(&def, &state).await.unwrap_err();

    assert!(err.is_trust_failure(), "got {err:?}");
    let snapshot = state.snapshot();
    assert_eq!(snapshot.phase, RequestPhase::Failed);
    assert!(snapshot.last_error.expect("error").is_trust_failure());
    assert_eq!(drain(&mut rx), vec![RequestPhase::Loading, RequestPhase::Failed]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pinned_key_sent_outside_the_validated_path_is_rejected() {
    let pki = TestPki::generate("served");
    let rogue = TestPki::generate("unrelated");
    // The server appends a certificate carrying the pinned key; nothing chains to it.
    let server = TestServer::https_presenting(&pki, 200, &[rogue.root.clone()]).await;
    let executor = executor_for(&pki);

    let state = RequestState::new();
    let def = RequestDefinition::pinned("Stray key", server.url("https"), pins(&[&rogue.root_pin]));
    let err = executor.execute(&def, &state).await.unwrap_err();
    assert!(err.is_trust_failure(), "got {err:?}");
    assert_eq!(state.phase(), RequestPhase::Failed);

    // The same server still satisfies a pin on its real path.
    let state = RequestState::new();
    let def = RequestDefinition::pinned("Real root", server.url("https"), pins(&[&pki.root_pin]));
    assert_eq!(executor.execute(&def, &state).await, Ok(200));
}

fn certificate_pins(certs: &[&CertificateDer<'static>]) -> Arc<CertificatePins> {
    Arc::new(CertificatePins::new(certs.iter().map(|der| {
        PinnedCertificate::from_der((*der).clone()).expect("pinnable certificate")
    })))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn certificate_pin_succeeds_at_any_chain_position() {
    let pki = TestPki::generate("cert pins");
    let server = TestServer::https(&pki, 200).await;
    let executor = executor_for(&pki);

    // The root certificate only appears as the trust store anchor.
    for (label, der) in [
        ("leaf", &pki.leaf),
        ("intermediate", &pki.intermediate),
        ("root", &pki.root),
    ] {
        let state = RequestState::new();
        let delegate = certificate_pins(&[der]);
        let def = RequestDefinition::delegated(label, server.url("https"), delegate);
        assert_eq!(executor.execute(&def, &state).await, Ok(200), "{label} certificate");
        assert_eq!(state.phase(), RequestPhase::Succeeded);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn certificate_pin_outside_the_validated_path_is_rejected() {
    let pki = TestPki::generate("served certs");
    let rogue = TestPki::generate("unrelated certs");
    let server = TestServer::https_presenting(&pki, 200, &[rogue.root.clone()]).await;
    let executor = executor_for(&pki);
    let state = RequestState::new();

    let def = RequestDefinition::delegated(
        "Stray certificate",
        server.url("https"),
        certificate_pins(&[&rogue.root]),
    );
    let err = executor.execute(&def, &state).await.unwrap_err();
    assert!(err.is_trust_failure(), "got {err:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_200_status_is_not_a_trust_problem() {
    let pki = TestPki::generate("scenario d");
    let server = TestServer::https(&pki, 503).await;
    let executor = executor_for(&pki);
    let state = RequestState::new();

    let def = RequestDefinition::pinned("Key pinning", server.url("https"), pins(&[&pki.leaf_pin]));
    let err = executor.execute(&def, &state).await.unwrap_err();

    assert_eq!(err, RequestError::UnexpectedStatus(503));
    assert!(!err.is_trust_failure());
    let snapshot = state.snapshot();
    assert_eq!(snapshot.phase, RequestPhase::Failed);
    assert_eq!(snapshot.status_code, Some(503));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_url_fails_without_loading() {
    let pki = TestPki::generate("scenario e");
    let executor = executor_for(&pki);
    let state = RequestState::new();
    let mut rx = state.subscribe();

    let def = RequestDefinition::new("Broken URL", "not a url");
    let err = executor.execute(&def, &state).await.unwrap_err();

    assert!(matches!(err, RequestError::MalformedUrl(_)));
    assert_eq!(drain(&mut rx), vec![RequestPhase::Failed]);
    assert_eq!(state.snapshot().last_error, Some(err));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn untrusted_chain_is_a_tls_error_even_with_matching_pin() {
    let pki = TestPki::generate("served");
    let other = TestPki::generate("trusted elsewhere");
    let server = TestServer::https(&pki, 200).await;
    let executor = executor_for(&other);
    let state = RequestState::new();

    let def = RequestDefinition::pinned("Key pinning", server.url("https"), pins(&[&pki.leaf_pin]));
    let err = executor.execute(&def, &state).await.unwrap_err();

    assert_eq!(err.transport_kind(), Some(TransportErrorKind::Tls), "got {err:?}");
    assert!(!err.is_trust_failure());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn plain_http_cannot_satisfy_a_pin() {
    let pki = TestPki::generate("plain");
    let server = TestServer::plain(200).await;
    let executor = executor_for(&pki);

    let state = RequestState::new();
    let def = RequestDefinition::new("Plain HTTP", server.url("http"));
    assert_eq!(executor.execute(&def, &state).await, Ok(200));
    assert_eq!(server.connections(), 1);

    let state = RequestState::new();
    let def =
        RequestDefinition::pinned("Plain HTTP pinned", server.url("http"), pins(&[&pki.leaf_pin]));
    let err = executor.execute(&def, &state).await.unwrap_err();
    assert!(err.is_trust_failure());
    assert_eq!(state.phase(), RequestPhase::Failed);
    assert_eq!(server.connections(), 1, "no connection for a pinned plain HTTP request");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repeated_executions_revalidate() {
    let pki = TestPki::generate("no cache");
    let server = TestServer::https(&pki, 200).await;
    let executor = executor_for(&pki);
    let state = RequestState::new();

    let pinned =
        RequestDefinition::pinned("Key pinning", server.url("https"), pins(&[&pki.leaf_pin]));
    assert_eq!(executor.execute(&pinned, &state).await, Ok(200));
    assert_eq!(executor.execute(&pinned, &state).await, Ok(200));
    assert_eq!(server.connections(), 2);

    // Same state, same server: a new pin set is checked on a fresh handshake.
    let broken = RequestDefinition::pinned(
        "Broken pin",
        server.url("https"),
        PinConfiguration::new([DUD_PIN]).expect("pin"),
    );
    let err = executor.execute(&broken, &state).await.unwrap_err();
    assert!(err.is_trust_failure());
    assert_eq!(server.connections(), 3);

    // A terminal state can be re-entered; loading clears the previous error.
    let mut rx = state.subscribe();
    assert_eq!(executor.execute(&pinned, &state).await, Ok(200));
    assert_eq!(drain(&mut rx), vec![RequestPhase::Loading, RequestPhase::Succeeded]);
    assert!(state.snapshot().last_error.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn silent_server_times_out() {
    let pki = TestPki::generate("timeout");
    let server = TestServer::silent().await;
    let executor = executor_with_timeout(&pki, Duration::from_millis(300));
    let state = RequestState::new();

    let def = RequestDefinition::new("Slow", server.url("https"));
    let err = executor.execute(&def, &state).await.unwrap_err();

    assert_eq!(err.transport_kind(), Some(TransportErrorKind::Timeout));
    assert_eq!(state.phase(), RequestPhase::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refused_connection_is_a_connect_error() {
    let pki = TestPki::generate("refused");
    let executor = executor_for(&pki);
    let state = RequestState::new();

    let url = format!("https://127.0.0.1:{}/", closed_port().await);
    let err = executor
        .execute(&RequestDefinition::new("Refused", url), &state)
        .await
        .unwrap_err();

    assert_eq!(err.transport_kind(), Some(TransportErrorKind::Connect), "got {err:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn registry_delegate_decides_per_host() {
    let pki = TestPki::generate("delegate");
    let server = TestServer::https(&pki, 200).await;
    let executor = executor_for(&pki);

    let mut registry = PinRegistry::new();
    registry.insert("localhost", PinConfiguration::from_hashes([pki.root_pin.clone()]));
    let delegate = Arc::new(RegistryDelegate::new(Arc::new(registry)));

    let state = RequestState::new();
    let def = RequestDefinition::delegated("Registry pinning", server.url("https"), delegate);
    assert_eq!(executor.execute(&def, &state).await, Ok(200));

    let empty = Arc::new(RegistryDelegate::new(Arc::new(PinRegistry::new())));
    let state = RequestState::new();
    let def = RequestDefinition::delegated("Unregistered host", server.url("https"), empty);
    assert!(executor.execute(&def, &state).await.unwrap_err().is_trust_failure());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_definitions_do_not_interfere() {
    let pki = TestPki::generate("concurrent");
    let ok = TestServer::https(&pki, 200).await;
    let unavailable = TestServer::https(&pki, 503).await;
    let executor = Arc::new(executor_for(&pki));

    let dud = PinConfiguration::new([DUD_PIN]).expect("pin");
    let defs = vec![
        RequestDefinition::new("HTTPS", ok.url("https")),
        RequestDefinition::pinned("Key pinning", ok.url("https"), pins(&[&pki.leaf_pin])),
        RequestDefinition::pinned("Root pinning", ok.url("https"), pins(&[&pki.root_pin])),
        RequestDefinition::pinned("Broken pin", ok.url("https"), dud),
        RequestDefinition::with_trust(
            "Unavailable",
            unavailable.url("https"),
            TrustStrategy::NoPinning,
        ),
    ];

    let mut tasks = Vec::new();
    for def in defs {
        let executor = Arc::clone(&executor);
        let state = Arc::new(RequestState::new());
        let task_state = Arc::clone(&state);
        tasks.push((
            state,
            tokio::spawn(async move { executor.execute(&def, &task_state).await }),
        ));
    }

    let mut outcomes = Vec::new();
    for (state, task) in tasks {
        let result = task.await.expect("task");
        assert!(state.phase().is_terminal());
        outcomes.push(result);
    }

    assert_eq!(outcomes[0], Ok(200));
    assert_eq!(outcomes[1], Ok(200));
    assert_eq!(outcomes[2], Ok(200));
    assert!(outcomes[3].as_ref().unwrap_err().is_trust_failure());
    assert_eq!(outcomes[4], Err(RequestError::UnexpectedStatus(503)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_execution_never_stays_loading() {
    let pki = TestPki::generate("cancel");
    let server = TestServer::silent().await;
    let executor = Arc::new(executor_with_timeout(&pki, Duration::from_secs(30)));
    let state = Arc::new(RequestState::new());
    let mut rx = state.subscribe();

    let task = {
        let executor = Arc::clone(&executor);
        let state = Arc::clone(&state);
        let def = RequestDefinition::new("Cancelled", server.url("https"));
        tokio::spawn(async move { executor.execute(&def, &state).await })
    };

    let first = rx.recv().await.expect("loading published");
    assert_eq!(first.phase, RequestPhase::Loading);
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    let snapshot = state.snapshot();
    assert_eq!(snapshot.phase, RequestPhase::Failed);
    assert_eq!(snapshot.last_error, Some(RequestError::Aborted));
}
