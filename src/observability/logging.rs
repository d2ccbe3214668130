//! Structured logging.
//!
//! # Responsibilities
//! - Install the global `tracing` subscriber
//! - Write to `<log_dir>/proxy.log.<date>`, to stdout, or both
//! - Flush the log file on shutdown
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level
//! - With no log directory, stdout is always enabled so logs are never lost
//! - The file is written by a `non_blocking` worker; the returned
//!   `WorkerGuard` must live until shutdown
//! - Daily rotation, seven files kept

use std::path::Path;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

pub const LOG_FILE_NAME: &str = "proxy.log";
const LOG_FILES_KEPT: usize = 7;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log file in {dir}: {source}")]
    Appender {
        dir: String,
        #[source]
        source: InitError,
    },

    #[error("logger already initialized: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(format!("openai_proxy={level},tower_http={level}"))
        .unwrap_or_else(|_| EnvFilter::new("openai_proxy=info,tower_http=info"))
}

fn file_appender(dir: &str) -> Result<RollingFileAppender, LoggingError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_NAME)
        .max_log_files(LOG_FILES_KEPT)
        .build(Path::new(dir))
        .map_err(|source| LoggingError::Appender {
            dir: dir.to_string(),
            source,
        })
}

/// Install the subscriber. Keep the returned guard alive until shutdown;
/// dropping it flushes pending file writes.
pub fn init_logging(config: &ObservabilityConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(&config.log_level));

    let (writer, guard) = match config.log_dir.as_deref() {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(file_appender(dir)?);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let stdout_layer = (config.stdout || writer.is_none()).then(|| fmt::layer().compact());
    let file_layer = writer.map(|writer| fmt::layer().with_ansi(false).with_writer(writer));

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        level = %config.log_level,
        log_dir = ?config.log_dir,
        stdout = config.stdout,
        "logger init"
    );

    Ok(guard)
}
