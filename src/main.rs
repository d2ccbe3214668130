//! OpenAI API proxy
//!
//! ```text
//!     Client Request       ┌───────────────────────────────────────────────┐
//!     ─────────────────────┼─▶ /ping, /health ──▶ local answer             │
//!                          │                                               │
//!                          │   /v1/** ──▶ statistics ──▶ proxy core ───────┼──▶ Upstream API
//!                          │                 │             (rewrite,       │     (TLS, optional
//!     Client Response      │                 │              transport)     │      client cert)
//!     ◀────────────────────┼── tee ◀─────────┴─────────────────────────────┼───
//!                          │    │                                          │
//!                          │    └─▶ usage extraction ──▶ logs + metrics    │
//!                          │                                               │
//!                          │   everything else ──▶ 404                     │
//!                          └───────────────────────────────────────────────┘
//! ```

use clap::Parser;

use openai_proxy::config::cli::Cli;
use openai_proxy::config::loader;
use openai_proxy::config::ProxyConfig;
use openai_proxy::lifecycle::startup;
use openai_proxy::observability::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let base = match &cli.config {
        Some(path) => loader::read_config(path)?,
        None => ProxyConfig::default(),
    };
    let config = loader::finalize(cli.apply(base))?;

    let log_guard = logging::init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.host,
        https = config.listener.tls.is_some(),
        mutual_tls = config.upstream.client_identity().is_some(),
        telemetry = config.telemetry.enabled,
        "API proxy config verified"
    );

    let result = startup::run(config).await;
    if let Err(error) = &result {
        tracing::error!(error = %error, "API proxy stopped with error");
    }
    drop(log_guard);

    result.map_err(Into::into)
}
