//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: local `/ping` and `/health`, proxy fallback
//! - Wire up middleware (panic recovery, request id, tracing, statistics)
//! - Serve plain HTTP or HTTPS until the shutdown signal fires

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    response::{Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::Span;

use crate::config::schema::TlsConfig;
use crate::config::ProxyConfig;
use crate::http::request::{assign_request_id, RequestIdExt};
use crate::http::response;
use crate::net::tls::load_tls_config;
use crate::proxy::{ApiProxy, Proxy, ProxyError};
use crate::stats::{statistics_middleware, StatisticsState};

/// How long in-flight requests may drain after shutdown on the TLS listener.
const TLS_DRAIN: Duration = Duration::from_secs(30);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub proxy: Arc<dyn Proxy>,
}

/// HTTP front end of the API proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Build the proxy core from `config` and wrap it in a server.
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let proxy = ApiProxy::from_config(&config)?;
        Ok(Self::with_proxy(config, Arc::new(proxy)))
    }

    /// Serve an already built proxy.
    pub fn with_proxy(config: ProxyConfig, proxy: Arc<dyn Proxy>) -> Self {
        let router = Self::build_router(&config, proxy);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(config: &ProxyConfig, proxy: Arc<dyn Proxy>) -> Router {
        let statistics = StatisticsState::new(proxy.clone(), &config.telemetry);

        Router::new()
            .route("/ping", get(ping))
            .route("/health", get(health))
            .fallback(proxy_handler)
            .with_state(AppState { proxy })
            .layer(middleware::from_fn_with_state(statistics, statistics_middleware))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(middleware::from_fn(assign_request_id))
            .layer(CatchPanicLayer::custom(response::panic_response))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Stopping listener, draining in-flight requests");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server over TLS on `addr`.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: &TlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let rustls = load_tls_config(tls).await?;
        let handle = axum_server::Handle::new();

        let signal = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Stopping listener, draining in-flight requests");
            signal.graceful_shutdown(Some(TLS_DRAIN));
        });

        tracing::info!(address = %addr, cert = %tls.cert_path, "HTTPS server starting");
        axum_server::bind_rustls(addr, rustls)
            .handle(handle)
            .serve(self.router.into_make_service_with_connect_info::<SocketAddr>())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

fn make_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        request_id = %request.request_id(),
        method = %request.method(),
        path = %request.uri().path(),
    )
}

async fn ping() -> &'static str {
    "pong"
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Forward proxied paths; everything else is a 404.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    if !state.proxy.is_api_supported(request.uri().path()) {
        tracing::debug!(path = %request.uri().path(), "No route matched");
        return response::not_found();
    }
    state.proxy.serve(request).await
}
