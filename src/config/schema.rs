//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the API proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// The single upstream API host and its credentials.
    pub upstream: UpstreamConfig,

    /// Outbound connection pool and timeout settings.
    pub transport: TransportConfig,

    /// Usage telemetry extraction settings.
    pub telemetry: TelemetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:6789").
    pub bind_address: String,

    /// Optional TLS configuration for inbound HTTPS.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:6789".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Upstream API configuration.
///
/// If either client credential path is set, both must be set and loadable,
/// otherwise the proxy refuses to start.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream host, optionally with a port (e.g., "api.openai.com").
    pub host: String,

    /// "https" for real deployments; "http" is accepted for local development.
    pub scheme: String,

    /// Client certificate (PEM) presented to the upstream for mutual TLS.
    pub client_cert_path: Option<String>,

    /// Private key (PEM) matching `client_cert_path`.
    pub client_key_path: Option<String>,

    /// Path namespace forwarded upstream; everything else stays local.
    pub api_prefix: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: "api.openai.com".to_string(),
            scheme: "https".to_string(),
            client_cert_path: None,
            client_key_path: None,
            api_prefix: "/v1".to_string(),
        }
    }
}

impl UpstreamConfig {
    /// Returns the client key pair paths when both are configured.
    pub fn client_identity(&self) -> Option<(&str, &str)> {
        match (&self.client_cert_path, &self.client_key_path) {
            (Some(cert), Some(key)) => Some((cert.as_str(), key.as_str())),
            _ => None,
        }
    }
}

/// Outbound transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// TCP connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Deadline in seconds for TCP connect plus TLS handshake.
    pub handshake_secs: u64,

    /// TCP keep-alive interval in seconds.
    pub keepalive_secs: u64,

    /// How long an idle pooled connection is kept, in seconds.
    pub idle_secs: u64,

    /// Maximum idle connections kept in the pool.
    pub max_idle_connections: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_secs: 30,
            handshake_secs: 10,
            keepalive_secs: 30,
            idle_secs: 90,
            max_idle_connections: 100,
        }
    }
}

/// Usage telemetry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Enable response capture and usage extraction.
    pub enabled: bool,

    /// Path markers identifying telemetry-bearing routes.
    pub routes: Vec<String>,

    /// Upper bound on bytes captured per response; larger bodies are not parsed.
    pub max_capture_bytes: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            routes: vec!["chat".to_string()],
            max_capture_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Directory for `proxy.log`; `None` disables file logging.
    pub log_dir: Option<String>,

    /// Also write logs to stdout.
    pub stdout: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: Some("./logs".to_string()),
            stdout: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_openai() {
        let config = ProxyConfig::default();
        assert_eq!(config.upstream.host, "api.openai.com");
        assert_eq!(config.upstream.scheme, "https");
        assert_eq!(config.upstream.api_prefix, "/v1");
        assert_eq!(config.listener.bind_address, "0.0.0.0:6789");
        assert!(config.upstream.client_identity().is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [upstream]
            host = "api.example.com"

            [transport]
            idle_secs = 15
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.host, "api.example.com");
        assert_eq!(config.upstream.scheme, "https");
        assert_eq!(config.transport.idle_secs, 15);
        assert_eq!(config.transport.max_idle_connections, 100);
        assert_eq!(config.telemetry.routes, vec!["chat".to_string()]);
    }

    #[test]
    fn client_identity_requires_both_paths() {
        let mut upstream = UpstreamConfig::default();
        upstream.client_cert_path = Some("cert.pem".into());
        assert!(upstream.client_identity().is_none());

        upstream.client_key_path = Some("key.pem".into());
        assert_eq!(upstream.client_identity(), Some(("cert.pem", "key.pem")));
    }
}
