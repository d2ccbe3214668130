//! Forwarding proxy for a remote OpenAI-compatible API.
//!
//! Requests under the API namespace (`/v1` by default) are forwarded to one
//! upstream host; successful responses get a permissive CORS header and
//! chat responses are mined for token usage and upstream errors.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod stats;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::{ApiProxy, Proxy};
