//! Usage and error extraction from completed response bodies.
//!
//! A body is accepted in two shapes:
//! - a single JSON document (`{"model":..,"usage":{..}}` or `{"error":{..}}`)
//! - a `text/event-stream` transcript, where the last `data:` payload that
//!   carries usage or an error wins

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Token accounting reported by the upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Error object reported by the upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamError {
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: Option<String>,
}

/// The fields of a response body the proxy cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    #[serde(default)]
    pub error: Option<UpstreamError>,
}

impl UsageRecord {
    /// An error takes precedence over usage; a record with neither yields nothing.
    pub fn into_event(self) -> Option<TelemetryEvent> {
        match (self.error, self.usage) {
            (Some(error), _) => Some(TelemetryEvent::Error {
                model: self.model,
                error,
            }),
            (None, Some(usage)) => Some(TelemetryEvent::Usage {
                model: self.model,
                usage,
            }),
            (None, None) => None,
        }
    }
}

/// One observation about a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    Usage {
        model: Option<String>,
        usage: TokenUsage,
    },
    Error {
        model: Option<String>,
        error: UpstreamError,
    },
}

#[derive(Debug, Error)]
pub enum UsageParseError {
    #[error("response body is not a usage document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event stream carried no usage or error payload")]
    EmptyStream,
}

/// Parse a completed body into a [`UsageRecord`].
pub fn parse_usage(body: &[u8]) -> Result<UsageRecord, UsageParseError> {
    match serde_json::from_slice::<UsageRecord>(body) {
        Ok(record) => Ok(record),
        Err(_) if looks_like_event_stream(body) => {
            parse_event_stream(body).ok_or(UsageParseError::EmptyStream)
        }
        Err(error) => Err(error.into()),
    }
}

fn looks_like_event_stream(body: &[u8]) -> bool {
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    let body = &body[start..];
    body.starts_with(b"data:") || body.starts_with(b"event:") || body.starts_with(b":")
}

fn parse_event_stream(body: &[u8]) -> Option<UsageRecord> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty() && *data != "[DONE]")
        .filter_map(|data| serde_json::from_str::<UsageRecord>(data).ok())
        .filter(|record| record.usage.is_some() || record.error.is_some())
        .last()
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Decides which paths produce telemetry and turns bodies into events.
#[derive(Debug, Clone)]
pub struct UsageExtractor {
    markers: Vec<String>,
}

impl UsageExtractor {
    pub fn new(markers: Vec<String>) -> Self {
        let markers = markers.into_iter().filter(|m| !m.is_empty()).collect();
        Self { markers }
    }

    /// True when `path` contains one of the telemetry route markers.
    pub fn applies(&self, path: &str) -> bool {
        self.markers.iter().any(|marker| path.contains(marker.as_str()))
    }

    pub fn extract(&self, body: &[u8]) -> Result<Option<TelemetryEvent>, UsageParseError> {
        Ok(parse_usage(body)?.into_event())
    }
}

impl Default for UsageExtractor {
    fn default() -> Self {
        Self::new(vec!["chat".to_string()])
    }
}
