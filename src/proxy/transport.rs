//! Upstream transport construction.
//!
//! # Responsibilities
//! - Load the optional client key pair for mutual TLS
//! - Build a pooled `hyper_util` client speaking HTTP/1.1 and HTTP/2 (ALPN)
//! - Bound TCP connect and the TLS handshake; leave body streaming unbounded
//!
//! # Design Decisions
//! - With a client key pair the upstream certificate chain is NOT verified.
//!   The proxy is the only consumer of this transport and talks to one
//!   controlled upstream; handshake signatures are still checked so the peer
//!   must hold the key for the certificate it presents.
//! - Without a key pair the transport verifies against the WebPKI roots.
//! - Pool settings are fixed at construction; the client is cloned into
//!   every request and synchronises internally.

use std::fs::File;
use std::future::Future;
use std::io::BufReader;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, Uri};
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder, MaybeHttpsStream};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tower::Service;

use crate::config::{TransportConfig, UpstreamConfig};
use crate::proxy::error::{HandshakeTimeout, TransportError};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Pooled outbound client bound to one upstream.
#[derive(Clone)]
pub struct UpstreamTransport {
    client: Client<BoundedConnector, Body>,
    mutual_tls: bool,
}

impl std::fmt::Debug for UpstreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamTransport")
            .field("mutual_tls", &self.mutual_tls)
            .finish_non_exhaustive()
    }
}

impl UpstreamTransport {
    /// Build the transport. Any failure here is a fatal configuration error.
    pub fn build(
        upstream: &UpstreamConfig,
        transport: &TransportConfig,
    ) -> Result<Self, TransportError> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());

        let (tls, mutual_tls) = match (&upstream.client_cert_path, &upstream.client_key_path) {
            (Some(cert), Some(key)) => {
                let tls = mutual_tls_config(provider, Path::new(cert), Path::new(key))?;
                tracing::warn!(
                    host = %upstream.host,
                    cert = %cert,
                    "Mutual TLS enabled; upstream certificate chain is not verified"
                );
                (tls, true)
            }
            (None, None) => (verifying_tls_config(provider)?, false),
            _ => return Err(TransportError::IncompleteKeyPair),
        };

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_nodelay(true);
        http.set_connect_timeout(Some(Duration::from_secs(transport.connect_secs)));
        if transport.keepalive_secs > 0 {
            http.set_keepalive(Some(Duration::from_secs(transport.keepalive_secs)));
        }

        let https = HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http);

        let connector = BoundedConnector {
            inner: https,
            deadline: Duration::from_secs(transport.connect_secs + transport.handshake_secs),
        };

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(Duration::from_secs(transport.idle_secs))
            .pool_max_idle_per_host(transport.max_idle_connections)
            .build(connector);

        tracing::debug!(
            host = %upstream.host,
            scheme = %upstream.scheme,
            mutual_tls,
            idle_secs = transport.idle_secs,
            max_idle = transport.max_idle_connections,
            "Upstream transport built"
        );

        Ok(Self { client, mutual_tls })
    }

    /// Send one request upstream and wait for the response head.
    pub async fn round_trip(
        &self,
        request: Request<Body>,
    ) -> Result<Response<Incoming>, hyper_util::client::legacy::Error> {
        self.client.request(request).await
    }

    /// Whether a client certificate is presented to the upstream.
    pub fn is_mutual_tls(&self) -> bool {
        self.mutual_tls
    }
}

fn verifying_tls_config(provider: Arc<CryptoProvider>) -> Result<ClientConfig, TransportError> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(config)
}

fn mutual_tls_config(
    provider: Arc<CryptoProvider>,
    cert_path: &Path,
    key_path: &Path,
) -> Result<ClientConfig, TransportError> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let verifier = SkipServerVerification {
        algorithms: provider.signature_verification_algorithms,
    };
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_client_auth_cert(certs, key)?;
    Ok(config)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let file = File::open(path).map_err(|source| TransportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TransportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TransportError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TransportError> {
    let file = File::open(path).map_err(|source| TransportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|source| TransportError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TransportError::NoPrivateKey(path.to_path_buf()))
}

/// Accepts any upstream certificate chain but still checks handshake signatures.
#[derive(Debug)]
struct SkipServerVerification {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// HTTPS connector with a single deadline over TCP connect and TLS handshake.
#[derive(Clone)]
pub struct BoundedConnector {
    inner: HttpsConnector<HttpConnector>,
    deadline: Duration,
}

impl Service<Uri> for BoundedConnector {
    type Response = MaybeHttpsStream<TokioIo<TcpStream>>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let connecting = self.inner.call(uri);
        let deadline = self.deadline;
        Box::pin(async move {
            match tokio::time::timeout(deadline, connecting).await {
                Ok(result) => result,
                Err(_) => Err(Box::new(HandshakeTimeout(deadline)) as BoxError),
            }
        })
    }
}
