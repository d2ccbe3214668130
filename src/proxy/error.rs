//! Error types for proxy construction and forwarding.

use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

/// Failures while building the upstream transport. Always fatal at startup.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Only one half of the client key pair was configured.
    #[error("client certificate and key must be configured together")]
    IncompleteKeyPair,

    /// A credential file could not be read.
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The certificate file contained no PEM certificates.
    #[error("no certificates found in {0:?}")]
    NoCertificates(PathBuf),

    /// The key file contained no supported PEM private key.
    #[error("no private key found in {0:?}")]
    NoPrivateKey(PathBuf),

    /// rustls rejected the TLS material.
    #[error("invalid TLS configuration: {0}")]
    Tls(#[from] rustls::Error),
}

/// Failures while constructing the proxy core.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("remote address must be set")]
    EmptyUpstreamHost,

    #[error("invalid upstream '{host}': {reason}")]
    InvalidUpstream { host: String, reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Per-request failures talking to the upstream.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The outbound URI could not be assembled.
    #[error("invalid upstream uri: {0}")]
    InvalidUri(#[from] axum::http::Error),

    /// Connect or TLS handshake did not finish in time.
    #[error("upstream connect timed out")]
    Timeout,

    /// Could not establish a connection (DNS, refused, TLS failure).
    #[error("upstream connect failed: {0}")]
    Connect(#[source] hyper_util::client::legacy::Error),

    /// The connection broke while sending the request or reading the head.
    #[error("upstream request failed: {0}")]
    Upstream(#[source] hyper_util::client::legacy::Error),
}

impl ForwardError {
    /// Classify a client error into timeout, connect or generic failure.
    pub fn from_client(err: hyper_util::client::legacy::Error) -> Self {
        if is_timeout(&err) {
            ForwardError::Timeout
        } else if err.is_connect() {
            ForwardError::Connect(err)
        } else {
            ForwardError::Upstream(err)
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::InvalidUri(_) => "invalid_uri",
            ForwardError::Timeout => "timeout",
            ForwardError::Connect(_) => "connect",
            ForwardError::Upstream(_) => "upstream",
        }
    }
}

/// Marker error returned by the connector when the handshake deadline passes.
#[derive(Debug, Error)]
#[error("connect and TLS handshake exceeded {0:?}")]
pub struct HandshakeTimeout(pub std::time::Duration);

fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(current) = source {
        if current.is::<HandshakeTimeout>() {
            return true;
        }
        if let Some(io) = current.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = current.source();
    }
    false
}
