//! Usage statistics subsystem.
//!
//! # Data Flow
//! ```text
//! proxied response body
//!     → tee.rs (forward frames, copy into bounded buffer)
//!     → body complete → middleware.rs spawns extraction
//!     → usage.rs (JSON or event-stream → TelemetryEvent)
//!     → sink.rs (log + counters)
//! ```

pub mod middleware;
pub mod sink;
pub mod tee;
pub mod usage;

pub use middleware::{statistics_middleware, StatisticsState};
pub use sink::{MetricsTelemetrySink, TelemetrySink};
pub use tee::StatisticsTee;
pub use usage::{parse_usage, TelemetryEvent, TokenUsage, UpstreamError, UsageExtractor, UsageRecord};
