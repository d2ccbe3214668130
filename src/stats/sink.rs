//! Telemetry event consumers.

use crate::observability::metrics;
use crate::stats::usage::TelemetryEvent;

/// Receives one event per completed telemetry-route response.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, path: &str, event: &TelemetryEvent);
}

/// Logs events and feeds the token and upstream-error counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsTelemetrySink;

impl TelemetrySink for MetricsTelemetrySink {
    fn record(&self, path: &str, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::Usage { model, usage } => {
                let model = model.as_deref().unwrap_or("unknown");
                tracing::debug!(
                    path,
                    model,
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    total_tokens = usage.total_tokens,
                    "request usage"
                );
                metrics::record_token_usage(model, usage);
            }
            TelemetryEvent::Error { model, error } => {
                let kind = error.kind.as_deref().unwrap_or("unknown");
                let code = error.code.as_deref().unwrap_or("unknown");
                tracing::debug!(path, model = ?model, kind, code, "request error");
                metrics::record_upstream_error(kind, code);
            }
        }
    }
}
