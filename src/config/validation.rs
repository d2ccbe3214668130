//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the upstream definition is usable (host, scheme, credentials)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("upstream host must be set")]
    EmptyUpstreamHost,

    #[error("unsupported upstream scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),

    #[error("client certificate and key must be configured together")]
    IncompleteClientIdentity,

    #[error("api prefix '{0}' must start with '/'")]
    InvalidApiPrefix(String),

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("invalid socket address for {field}: '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("listener tls requires both cert_path and key_path")]
    IncompleteListenerTls,
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let upstream = &config.upstream;
    if upstream.host.trim().is_empty() {
        errors.push(ValidationError::EmptyUpstreamHost);
    }
    if upstream.scheme != "https" && upstream.scheme != "http" {
        errors.push(ValidationError::UnsupportedScheme(upstream.scheme.clone()));
    }
    if upstream.client_cert_path.is_some() != upstream.client_key_path.is_some() {
        errors.push(ValidationError::IncompleteClientIdentity);
    }
    if !upstream.api_prefix.starts_with('/') {
        errors.push(ValidationError::InvalidApiPrefix(upstream.api_prefix.clone()));
    }

    let transport = &config.transport;
    for (field, value) in [
        ("transport.connect_secs", transport.connect_secs),
        ("transport.handshake_secs", transport.handshake_secs),
        ("transport.idle_secs", transport.idle_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroValue { field });
        }
    }

    if config.telemetry.enabled && config.telemetry.max_capture_bytes == 0 {
        errors.push(ValidationError::ZeroValue {
            field: "telemetry.max_capture_bytes",
        });
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() || tls.key_path.is_empty() {
            errors.push(ValidationError::IncompleteListenerTls);
        }
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
