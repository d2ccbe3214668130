//! Forwarding failure reporting.

use crate::observability::metrics;
use crate::proxy::error::ForwardError;
use crate::proxy::Exchange;

/// Receives every failed forward before the client gets its gateway error.
pub trait ErrorObserver: Send + Sync {
    fn on_forward_error(&self, exchange: &Exchange, error: &ForwardError);
}

/// Logs the failure and counts it by kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorObserver;

impl ErrorObserver for LoggingErrorObserver {
    fn on_forward_error(&self, exchange: &Exchange, error: &ForwardError) {
        tracing::error!(
            request_id = %exchange.id,
            method = %exchange.method,
            path = %exchange.path,
            remote_addr = ?exchange.remote_addr,
            kind = error.kind(),
            error = %error,
            "remote proxy got error"
        );
        metrics::record_forward_error(error.kind());
    }
}
