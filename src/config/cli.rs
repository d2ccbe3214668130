//! Command line flags.
//!
//! Flags are applied on top of the (optional) TOML file, so a deployment can
//! keep a config file and still override single values at launch.

use std::path::PathBuf;

use clap::Parser;

use crate::config::schema::{ProxyConfig, TlsConfig};

#[derive(Debug, Parser)]
#[command(name = "openai-proxy")]
#[command(about = "Forwarding proxy for a remote API with usage telemetry", long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output logs dir
    #[arg(long)]
    pub logs_dir: Option<String>,

    /// Debug log level
    #[arg(long)]
    pub debug: bool,

    /// Also log to stdout
    #[arg(long)]
    pub stdout: bool,

    /// Listen address
    #[arg(long)]
    pub addr: Option<String>,

    /// Listen port
    #[arg(long)]
    pub port: Option<u16>,

    /// Upstream API host
    #[arg(long)]
    pub remote_addr: Option<String>,

    /// Client certificate presented to the upstream
    #[arg(long)]
    pub client_cert_file: Option<String>,

    /// Private key for the client certificate
    #[arg(long)]
    pub client_key_file: Option<String>,

    /// Certificate for serving HTTPS to clients
    #[arg(long)]
    pub server_cert_file: Option<String>,

    /// Private key for the server certificate
    #[arg(long)]
    pub server_key_file: Option<String>,
}

impl Cli {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, mut config: ProxyConfig) -> ProxyConfig {
        if let Some(dir) = &self.logs_dir {
            config.observability.log_dir = Some(dir.clone());
        }
        if self.debug {
            config.observability.log_level = "debug".to_string();
        }
        if self.stdout {
            config.observability.stdout = true;
        }

        if self.addr.is_some() || self.port.is_some() {
            let (current_host, current_port) = split_bind_address(&config.listener.bind_address);
            let host = self.addr.clone().unwrap_or(current_host);
            let port = self.port.unwrap_or(current_port);
            if host.is_empty() {
                tracing::warn!("proxy addr not set, will listen on 0.0.0.0");
            }
            let host = if host.is_empty() { "0.0.0.0".to_string() } else { host };
            config.listener.bind_address = format!("{}:{}", host, port);
        }

        if let Some(remote) = &self.remote_addr {
            config.upstream.host = remote.clone();
        }
        if let Some(cert) = &self.client_cert_file {
            config.upstream.client_cert_path = non_empty(cert);
        }
        if let Some(key) = &self.client_key_file {
            config.upstream.client_key_path = non_empty(key);
        }

        if let (Some(cert), Some(key)) = (&self.server_cert_file, &self.server_key_file) {
            if !cert.is_empty() && !key.is_empty() {
                config.listener.tls = Some(TlsConfig {
                    cert_path: cert.clone(),
                    key_path: key.clone(),
                });
            }
        }

        config
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn split_bind_address(address: &str) -> (String, u16) {
    match address.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(6789)),
        None => (address.to_string(), 6789),
    }
}
