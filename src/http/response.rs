//! Locally generated responses.
//!
//! # Responsibilities
//! - 404 for paths outside the proxied namespace
//! - Map upstream failures to gateway status codes
//! - Turn a handler panic into a 500 after logging it
//!
//! # Design Decisions
//! - Bodies are small JSON objects with a `message` field
//! - Connect/handshake timeouts become 504, every other upstream failure 502

use std::any::Any;
use std::backtrace::Backtrace;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::proxy::ForwardError;

pub fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "404 Not Found" })),
    )
        .into_response()
}

/// Status for a failed forward.
pub fn gateway_status(error: &ForwardError) -> StatusCode {
    match error {
        ForwardError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    }
}

pub fn gateway_error(error: &ForwardError) -> Response {
    (
        gateway_status(error),
        Json(json!({
            "message": "Upstream request failed",
            "kind": error.kind(),
        })),
    )
        .into_response()
}

/// Panic handler for `CatchPanicLayer`.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else {
        "unknown panic payload".to_string()
    };
    let backtrace = Backtrace::force_capture();
    tracing::error!(panic = %detail, backtrace = %backtrace, "Recovered from handler panic");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "Internal Server Error" })),
    )
        .into_response()
}
