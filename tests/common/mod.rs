//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use openai_proxy::proxy::{ErrorObserver, Exchange, ForwardError};
use openai_proxy::stats::{TelemetryEvent, TelemetrySink};
use openai_proxy::{ApiProxy, HttpServer, ProxyConfig, Shutdown};

/// Start a mock upstream that answers every request with a fixed status and JSON body.
pub async fn start_mock_backend(status_line: &'static str, body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        read_request(&mut socket).await;
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_line,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Drain one request (head plus `Content-Length` body) from the socket.
async fn read_request(socket: &mut TcpStream) {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&data[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + length {
                return;
            }
        }
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => data.extend_from_slice(&buf[..n]),
        }
    }
}

/// Start an Axum app as the upstream.
pub async fn start_upstream(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Start a backend that accepts connections and never writes a byte.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Telemetry sink that forwards every event to a channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(String, TelemetryEvent)>,
}

impl TelemetrySink for ChannelSink {
    fn record(&self, path: &str, event: &TelemetryEvent) {
        let _ = self.tx.send((path.to_string(), event.clone()));
    }
}

/// Error observer that remembers the kinds it saw.
#[derive(Default)]
pub struct RecordingObserver {
    pub kinds: Mutex<Vec<&'static str>>,
}

impl ErrorObserver for RecordingObserver {
    fn on_forward_error(&self, _exchange: &Exchange, error: &ForwardError) {
        self.kinds.lock().unwrap().push(error.kind());
    }
}

pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub events: mpsc::UnboundedReceiver<(String, TelemetryEvent)>,
    pub errors: Arc<RecordingObserver>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Wait for the next telemetry event.
    pub async fn next_event(&mut self) -> Option<(String, TelemetryEvent)> {
        tokio::time::timeout(Duration::from_secs(2), self.events.recv())
            .await
            .ok()
            .flatten()
    }

    /// Assert no telemetry event shows up within a short grace period.
    pub async fn assert_no_event(&mut self) {
        let event = tokio::time::timeout(Duration::from_millis(200), self.events.recv()).await;
        assert!(event.is_err(), "unexpected telemetry event: {event:?}");
    }
}

pub fn proxy_config(upstream: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.host = upstream.to_string();
    config.upstream.scheme = "http".into();
    config.transport.connect_secs = 2;
    config.transport.handshake_secs = 1;
    config.observability.log_dir = None;
    config
}

/// Start the proxy in front of `upstream` on an ephemeral port.
pub async fn start_proxy(upstream: SocketAddr) -> TestProxy {
    start_proxy_with(proxy_config(upstream)).await
}

pub async fn start_proxy_with(config: ProxyConfig) -> TestProxy {
    let (tx, events) = mpsc::unbounded_channel();
    let errors = Arc::new(RecordingObserver::default());

    let proxy = ApiProxy::builder(&config)
        .telemetry_sink(Arc::new(ChannelSink { tx }))
        .error_observer(errors.clone())
        .build()
        .unwrap();
    let server = HttpServer::with_proxy(config, Arc::new(proxy));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, receiver).await.unwrap();
    });

    TestProxy {
        addr,
        shutdown,
        events,
        errors,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
