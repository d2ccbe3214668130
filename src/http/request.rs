//! Request identity.
//!
//! # Responsibilities
//! - Assign every inbound request an id as early as possible
//! - Expose it to spans, the proxy core and error reports
//!
//! # Design Decisions
//! - The id lives in request extensions, never in forwarded headers, so
//!   upstream traffic carries exactly what the client sent
//! - A client-supplied `x-request-id` is reused when it is printable ASCII

use std::fmt;

use axum::body::Body;
use axum::extract::Request;
use axum::http;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Correlation id for one inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_header<B>(request: &http::Request<B>) -> Option<Self> {
        let value = request.headers().get(X_REQUEST_ID)?.to_str().ok()?.trim();
        if value.is_empty() {
            return None;
        }
        Some(Self(value.to_string()))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read the request id off a request.
pub trait RequestIdExt {
    /// Returns the assigned id, the client's `x-request-id`, or a fresh one.
    fn request_id(&self) -> RequestId;
}

impl<B> RequestIdExt for http::Request<B> {
    fn request_id(&self) -> RequestId {
        self.extensions()
            .get::<RequestId>()
            .cloned()
            .or_else(|| RequestId::from_header(self))
            .unwrap_or_default()
    }
}

/// Middleware that pins the request id into extensions.
pub async fn assign_request_id(mut request: Request<Body>, next: Next) -> Response {
    let id = request.request_id();
    request.extensions_mut().insert(id);
    next.run(request).await
}
