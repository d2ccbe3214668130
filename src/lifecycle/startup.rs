//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the proxy core from the validated configuration
//! - Start the metrics exporter when enabled
//! - Bind the listener last, then serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: every error before the listener is bound is fatal
//! - Subsystems initialize in order, not concurrently

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ProxyConfig;
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;
use crate::proxy::ProxyError;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build API proxy: {0}")]
    Proxy(#[from] ProxyError),

    #[error("invalid listen address '{0}'")]
    Address(String),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the proxy and block until it has shut down.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let addr: SocketAddr = config
        .listener
        .bind_address
        .parse()
        .map_err(|_| StartupError::Address(config.listener.bind_address.clone()))?;

    let server = HttpServer::new(config)?;
    let observability = &server.config().observability;
    if observability.metrics_enabled {
        match observability.metrics_address.parse() {
            Ok(metrics_addr) => metrics::init_metrics(metrics_addr),
            Err(_) => tracing::error!(
                metrics_address = %observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    signals::spawn_signal_handler(shutdown);

    let tls = server.config().listener.tls.clone();
    match tls {
        Some(tls) => server.run_tls(addr, &tls, receiver).await?,
        None => {
            let listener = TcpListener::bind(addr).await?;
            server.run(listener, receiver).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
