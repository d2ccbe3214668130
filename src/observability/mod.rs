//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, file and/or stdout)
//!     → metrics.rs (counters and histograms)
//!
//! Consumers:
//!     → <log_dir>/proxy.log
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request id is a span field on every request
//! - Metrics are cheap (atomic increments) and optional

pub mod logging;
pub mod metrics;
