//! Statistics middleware.
//!
//! Wraps the response body of every proxied request in a [`StatisticsTee`];
//! the completed body is handed to [`Proxy::perform_statistics`] on a
//! spawned task so extraction never delays the client.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::config::TelemetryConfig;
use crate::proxy::Proxy;
use crate::stats::tee::StatisticsTee;

#[derive(Clone)]
pub struct StatisticsState {
    pub proxy: Arc<dyn Proxy>,
    pub enabled: bool,
    pub max_capture_bytes: usize,
}

impl StatisticsState {
    pub fn new(proxy: Arc<dyn Proxy>, telemetry: &TelemetryConfig) -> Self {
        Self {
            proxy,
            enabled: telemetry.enabled,
            max_capture_bytes: telemetry.max_capture_bytes,
        }
    }
}

pub async fn statistics_middleware(
    State(state): State<StatisticsState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !state.enabled || !state.proxy.is_api_supported(&path) {
        return next.run(request).await;
    }

    let response = next.run(request).await;
    let proxy = state.proxy.clone();
    response.map(|body| {
        Body::new(StatisticsTee::new(body, state.max_capture_bytes, move |captured| {
            tokio::spawn(async move {
                proxy.perform_statistics(&path, captured);
            });
        }))
    })
}
