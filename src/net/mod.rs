//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → plain: axum::serve on a tokio TcpListener
//!     → TLS:   tls.rs (certificate load) → axum-server rustls acceptor
//!     → Hand off to HTTP layer
//! ```

pub mod tls;
