//! Reverse proxy core.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → Exchange::begin (id, method, path, client address)
//!     → rewrite::direct (upstream scheme + authority)
//!     → RequestRewriter (strip forwarding headers, pin Host)
//!     → UpstreamTransport (pooled HTTP/1.1 + HTTP/2 client)
//!     → ResponseRewriter (CORS on 200 proxied responses)
//!     → streamed back to the client
//!
//! on failure:
//!     → ErrorObserver → 502 / 504
//! ```
//!
//! # Design Decisions
//! - The core is reached through the `Proxy` trait so the HTTP layer can be
//!   tested against a fake
//! - Everything is built once from `ProxyConfig`; request handling never
//!   touches mutable shared state

pub mod error;
pub mod observer;
pub mod path_filter;
pub mod rewrite;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::header::HeaderValue;
use axum::http::uri::{Authority, Scheme};
use axum::http::{Method, Request, Response};

use crate::config::{ProxyConfig, TelemetryConfig, TransportConfig, UpstreamConfig};
use crate::http::request::{RequestId, RequestIdExt};
use crate::http::response;
use crate::observability::metrics;
use crate::stats::{MetricsTelemetrySink, TelemetrySink, UsageExtractor};

pub use error::{ForwardError, ProxyError, TransportError};
pub use observer::{ErrorObserver, LoggingErrorObserver};
pub use path_filter::PathFilter;
pub use rewrite::{ProxyRequest, RequestRewrite, RequestRewriter, ResponseRewrite, ResponseRewriter};
pub use transport::UpstreamTransport;

/// Identity of one inbound request, captured before it is rewritten.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub id: RequestId,
    pub method: Method,
    pub path: String,
    pub remote_addr: Option<SocketAddr>,
    pub started: Instant,
}

impl Exchange {
    pub fn begin<B>(request: &Request<B>) -> Self {
        Self {
            id: request.request_id(),
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            remote_addr: request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
            started: Instant::now(),
        }
    }
}

/// Capabilities the HTTP layer needs from the proxy core.
#[async_trait]
pub trait Proxy: Send + Sync {
    /// Forward `request` and return the upstream's response or a gateway error.
    async fn serve(&self, request: Request<Body>) -> Response<Body>;

    /// Send an already rewritten request upstream.
    async fn round_trip(&self, request: Request<Body>) -> Result<Response<Body>, ForwardError>;

    /// Whether `path` is under the proxied namespace.
    fn is_api_supported(&self, path: &str) -> bool;

    /// Extract telemetry from a completed response body.
    fn perform_statistics(&self, path: &str, body: Bytes);
}

/// Reverse proxy for one upstream API host.
pub struct ApiProxy {
    scheme: Scheme,
    authority: Authority,
    filter: PathFilter,
    request_rewriter: RequestRewriter,
    response_rewriter: ResponseRewriter,
    transport: UpstreamTransport,
    observer: Arc<dyn ErrorObserver>,
    extractor: UsageExtractor,
    sink: Arc<dyn TelemetrySink>,
}

impl std::fmt::Debug for ApiProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiProxy")
            .field("scheme", &self.scheme)
            .field("authority", &self.authority)
            .field("prefix", &self.filter.prefix())
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl ApiProxy {
    pub fn builder(config: &ProxyConfig) -> ApiProxyBuilder {
        ApiProxyBuilder {
            upstream: config.upstream.clone(),
            transport: config.transport.clone(),
            telemetry: config.telemetry.clone(),
            observer: None,
            sink: None,
        }
    }

    /// Build with the default logging observer and metrics sink.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ProxyError> {
        Self::builder(config).build()
    }

    /// The upstream authority requests are sent to.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    fn fail(&self, exchange: &Exchange, error: ForwardError) -> Response<Body> {
        self.observer.on_forward_error(exchange, &error);
        let status = response::gateway_status(&error);
        metrics::record_request(exchange.method.as_str(), status.as_u16());
        response::gateway_error(&error)
    }
}

#[async_trait]
impl Proxy for ApiProxy {
    async fn serve(&self, request: Request<Body>) -> Response<Body> {
        let exchange = Exchange::begin(&request);
        tracing::debug!(
            request_id = %exchange.id,
            method = %exchange.method,
            path = %exchange.path,
            "Proxying request"
        );

        let outbound = match rewrite::direct(request, &self.scheme, &self.authority) {
            Ok(outbound) => outbound,
            Err(error) => return self.fail(&exchange, error),
        };
        let mut proxy_request = ProxyRequest {
            inbound: exchange,
            outbound,
        };
        let request_outcome = self.request_rewriter.rewrite(&mut proxy_request);
        let ProxyRequest {
            inbound: exchange,
            outbound,
        } = proxy_request;

        match self.round_trip(outbound).await {
            Ok(mut upstream) => {
                let response_outcome = self.response_rewriter.rewrite(&exchange.path, &mut upstream);
                tracing::debug!(
                    request_id = %exchange.id,
                    status = upstream.status().as_u16(),
                    request_rewrite = ?request_outcome,
                    response_rewrite = ?response_outcome,
                    "Upstream responded"
                );
                metrics::record_upstream_header(exchange.method.as_str(), exchange.started);
                metrics::record_request(exchange.method.as_str(), upstream.status().as_u16());
                upstream
            }
            Err(error) => self.fail(&exchange, error),
        }
    }

    async fn round_trip(&self, request: Request<Body>) -> Result<Response<Body>, ForwardError> {
        let upstream = self
            .transport
            .round_trip(request)
            .await
            .map_err(ForwardError::from_client)?;
        let (mut parts, body) = upstream.into_parts();
        rewrite::strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }

    fn is_api_supported(&self, path: &str) -> bool {
        self.filter.is_proxied(path)
    }

    fn perform_statistics(&self, path: &str, body: Bytes) {
        if !self.extractor.applies(path) {
            return;
        }
        match self.extractor.extract(&body) {
            Ok(Some(event)) => self.sink.record(path, &event),
            Ok(None) => {
                tracing::trace!(path, "Response carried no usage or error");
            }
            Err(error) => {
                tracing::debug!(path, bytes = body.len(), error = %error, "Unmarshal response body failed");
            }
        }
    }
}

/// Builder for [`ApiProxy`] with injectable observer and telemetry sink.
pub struct ApiProxyBuilder {
    upstream: UpstreamConfig,
    transport: TransportConfig,
    telemetry: TelemetryConfig,
    observer: Option<Arc<dyn ErrorObserver>>,
    sink: Option<Arc<dyn TelemetrySink>>,
}

impl ApiProxyBuilder {
    pub fn error_observer(mut self, observer: Arc<dyn ErrorObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn telemetry_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<ApiProxy, ProxyError> {
        let host = self.upstream.host.trim();
        if host.is_empty() {
            return Err(ProxyError::EmptyUpstreamHost);
        }
        let invalid = |reason: String| ProxyError::InvalidUpstream {
            host: host.to_string(),
            reason,
        };

        let authority: Authority = host.parse().map_err(|e| invalid(format!("{e}")))?;
        let scheme = match self.upstream.scheme.as_str() {
            "https" => Scheme::HTTPS,
            "http" => Scheme::HTTP,
            other => return Err(invalid(format!("unsupported scheme '{other}'"))),
        };
        let upstream_host =
            HeaderValue::from_str(authority.as_str()).map_err(|e| invalid(format!("{e}")))?;

        let transport = UpstreamTransport::build(&self.upstream, &self.transport)?;
        let filter = PathFilter::new(self.upstream.api_prefix.as_str());

        tracing::info!(
            upstream = %authority,
            scheme = %scheme,
            prefix = %filter.prefix(),
            mutual_tls = transport.is_mutual_tls(),
            "API proxy ready"
        );

        Ok(ApiProxy {
            request_rewriter: RequestRewriter::new(filter.clone(), upstream_host),
            response_rewriter: ResponseRewriter::new(filter.clone()),
            filter,
            scheme,
            authority,
            transport,
            observer: self
                .observer
                .unwrap_or_else(|| Arc::new(LoggingErrorObserver)),
            extractor: UsageExtractor::new(self.telemetry.routes),
            sink: self.sink.unwrap_or_else(|| Arc::new(MetricsTelemetrySink)),
        })
    }
}
