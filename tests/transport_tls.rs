//! Upstream transport: construction failures, mutual TLS and connect deadlines.

mod common;

use std::fs::File;
use std::io::{BufReader, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::response::Json;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use serde_json::{json, Value};

use common::*;
use openai_proxy::config::{TransportConfig, UpstreamConfig};
use openai_proxy::proxy::{ProxyError, TransportError, UpstreamTransport};
use openai_proxy::{ApiProxy, ProxyConfig};

const CA_CERT: &str = "tests/fixtures/ca-cert.pem";
const CLIENT_CERT: &str = "tests/fixtures/client-cert.pem";
const CLIENT_KEY: &str = "tests/fixtures/client-key.pem";
const SERVER_CERT: &str = "tests/fixtures/server-cert.pem";
const SERVER_KEY: &str = "tests/fixtures/server-key.pem";

fn read_certs(path: &str) -> Vec<CertificateDer<'static>> {
    rustls_pemfile::certs(&mut BufReader::new(File::open(path).unwrap()))
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn read_key(path: &str) -> PrivateKeyDer<'static> {
    rustls_pemfile::private_key(&mut BufReader::new(File::open(path).unwrap()))
        .unwrap()
        .unwrap()
}

/// HTTPS upstream signed by the test CA that requires a client certificate from the same CA.
async fn start_mutual_tls_upstream() -> SocketAddr {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());

    let mut roots = RootCertStore::empty();
    for cert in read_certs(CA_CERT) {
        roots.add(cert).unwrap();
    }
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .unwrap();

    let mut server = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_client_cert_verifier(verifier)
        .with_single_cert(read_certs(SERVER_CERT), read_key(SERVER_KEY))
        .unwrap();
    server.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    let app = Router::new().fallback(|| async { Json(json!({ "upstream": "mutual-tls" })) });
    let handle = Handle::new();
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    tokio::spawn(
        axum_server::bind_rustls(addr, RustlsConfig::from_config(Arc::new(server)))
            .handle(handle.clone())
            .serve(app.into_make_service()),
    );

    handle.listening().await.unwrap()
}

fn https_config(upstream: SocketAddr, key_pair: bool) -> ProxyConfig {
    let mut config = proxy_config(upstream);
    config.upstream.scheme = "https".into();
    if key_pair {
        config.upstream.client_cert_path = Some(CLIENT_CERT.into());
        config.upstream.client_key_path = Some(CLIENT_KEY.into());
    }
    config
}

fn upstream_with(cert: Option<&str>, key: Option<&str>) -> UpstreamConfig {
    UpstreamConfig {
        client_cert_path: cert.map(str::to_string),
        client_key_path: key.map(str::to_string),
        ..UpstreamConfig::default()
    }
}

#[tokio::test]
async fn client_key_pair_enables_mutual_tls() {
    let transport = UpstreamTransport::build(
        &upstream_with(Some(CLIENT_CERT), Some(CLIENT_KEY)),
        &TransportConfig::default(),
    )
    .unwrap();
    assert!(transport.is_mutual_tls());
}

#[tokio::test]
async fn key_without_cert_is_rejected() {
    let err = UpstreamTransport::build(&upstream_with(None, Some(CLIENT_KEY)), &TransportConfig::default())
        .unwrap_err();
    assert!(matches!(err, TransportError::IncompleteKeyPair));
}

#[tokio::test]
async fn file_without_pem_blocks_is_rejected() {
    let mut garbage = tempfile::NamedTempFile::new().unwrap();
    writeln!(garbage, "this is not a pem file").unwrap();
    let garbage = garbage.path().to_str().unwrap().to_string();

    let err = UpstreamTransport::build(
        &upstream_with(Some(&garbage), Some(CLIENT_KEY)),
        &TransportConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, TransportError::NoCertificates(_)));

    let err = UpstreamTransport::build(
        &upstream_with(Some(CLIENT_CERT), Some(&garbage)),
        &TransportConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, TransportError::NoPrivateKey(_)));
}

#[tokio::test]
async fn proxy_construction_surfaces_transport_errors() {
    let mut config = ProxyConfig::default();
    config.upstream.client_cert_path = Some("/nonexistent/cert.pem".into());
    config.upstream.client_key_path = Some("/nonexistent/key.pem".into());

    let err = ApiProxy::from_config(&config).unwrap_err();
    assert!(matches!(err, ProxyError::Transport(TransportError::Io { .. })));
}

#[tokio::test]
async fn unsupported_scheme_is_rejected() {
    let mut config = ProxyConfig::default();
    config.upstream.scheme = "ftp".into();
    assert!(matches!(
        ApiProxy::from_config(&config),
        Err(ProxyError::InvalidUpstream { .. })
    ));
}

#[tokio::test]
async fn client_certificate_reaches_mutual_tls_upstream() {
    let upstream = start_mutual_tls_upstream().await;
    let proxy = start_proxy_with(https_config(upstream, true)).await;

    let response = client().get(proxy.url("/v1/models")).send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["upstream"], "mutual-tls");
    assert!(proxy.errors.kinds.lock().unwrap().is_empty());
}

#[tokio::test]
async fn verifying_transport_rejects_untrusted_upstream() {
    let upstream = start_mutual_tls_upstream().await;
    let proxy = start_proxy_with(https_config(upstream, false)).await;

    let response = client().get(proxy.url("/v1/models")).send().await.unwrap();

    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "connect");
    assert_eq!(proxy.errors.kinds.lock().unwrap().as_slice(), ["connect"]);
}

#[tokio::test]
async fn stalled_handshake_is_gateway_timeout() {
    let upstream = start_silent_backend().await;
    let mut config = https_config(upstream, false);
    config.transport.connect_secs = 1;
    config.transport.handshake_secs = 1;
    let proxy = start_proxy_with(config).await;

    let started = Instant::now();
    let response = client()
        .post(proxy.url("/v1/chat/completions"))
        .body("{}")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 504);
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(started.elapsed() < Duration::from_secs(5));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "timeout");
    assert_eq!(proxy.errors.kinds.lock().unwrap().as_slice(), ["timeout"]);
}
