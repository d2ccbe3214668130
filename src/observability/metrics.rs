//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): forwarded requests by method, status
//! - `proxy_upstream_header_seconds` (histogram): time until the upstream
//!   response head arrived
//! - `proxy_forward_errors_total` (counter): failed forwards by kind
//! - `proxy_tokens_total` (counter): tokens by model and kind
//!   (prompt, completion, total)
//! - `proxy_upstream_errors_total` (counter): upstream error bodies by type, code
//!
//! # Design Decisions
//! - Recording is a no-op until `init_metrics` installs the exporter
//! - Body streaming time is not measured; streams may stay open for minutes

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::stats::TokenUsage;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe_metrics();
            tracing::info!(address = %addr, "Metrics exporter listening");
        }
        Err(error) => {
            tracing::error!(address = %addr, error = %error, "Failed to install metrics exporter");
        }
    }
}

fn describe_metrics() {
    describe_counter!("proxy_requests_total", "Requests forwarded to the upstream");
    describe_histogram!(
        "proxy_upstream_header_seconds",
        "Time from request arrival to upstream response head"
    );
    describe_counter!("proxy_forward_errors_total", "Requests that failed to reach the upstream");
    describe_counter!("proxy_tokens_total", "Tokens reported in upstream usage objects");
    describe_counter!("proxy_upstream_errors_total", "Error objects returned by the upstream");
}

/// Count one answered request, including gateway errors.
pub fn record_request(method: &str, status: u16) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Only for requests that received an upstream response head.
pub fn record_upstream_header(method: &str, started: Instant) {
    histogram!("proxy_upstream_header_seconds", "method" => method.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_forward_error(kind: &'static str) {
    counter!("proxy_forward_errors_total", "kind" => kind).increment(1);
}

pub fn record_token_usage(model: &str, usage: &TokenUsage) {
    for (kind, tokens) in [
        ("prompt", usage.prompt_tokens),
        ("completion", usage.completion_tokens),
        ("total", usage.total_tokens),
    ] {
        counter!("proxy_tokens_total", "model" => model.to_string(), "kind" => kind)
            .increment(tokens);
    }
}

pub fn record_upstream_error(kind: &str, code: &str) {
    counter!(
        "proxy_upstream_errors_total",
        "type" => kind.to_string(),
        "code" => code.to_string()
    )
    .increment(1);
}
