//! Payload types carried on the inbound push channels.
//!
//! Payloads arrive as opaque [`serde_json::Value`]s. Only a handful of fields
//! are recognized; anything missing or mistyped degrades to a fallback rather
//! than rejecting the payload.

use serde_json::Value;

/// Discriminator field of a structured security event.
pub const EVENT_TYPE_FIELD: &str = "event_type";

/// Fallback shown when a field is missing.
pub const UNKNOWN: &str = "Unknown";

/// Fallback shown when an event carries no timestamp.
pub const NO_TIMESTAMP: &str = "No timestamp";

/// Recognized values of the `event_type` discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Alert,
    Stats,
    /// Any other discriminator the engine emits (flow, dns, http, ...).
    Other(String),
    /// Discriminator missing or not a string.
    Unknown,
}

impl EventKind {
    /// Classify a discriminator value.
    #[must_use]
    pub fn from_discriminator(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("alert") => Self::Alert,
            Some("stats") => Self::Stats,
            Some(other) if !other.is_empty() => Self::Other(other.to_string()),
            _ => Self::Unknown,
        }
    }

    /// Display label; `Unknown` when the discriminator was missing.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Alert => "alert",
            Self::Stats => "stats",
            Self::Other(name) => name,
            Self::Unknown => UNKNOWN,
        }
    }
}

/// A structured event emitted by the detection engine.
///
/// Received once, stored by value, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityEvent {
    kind: EventKind,
    raw: Value,
}

impl SecurityEvent {
    /// Wrap a raw payload, classifying it by its discriminator.
    #[must_use]
    pub fn from_value(raw: Value) -> Self {
        let kind = EventKind::from_discriminator(raw.get(EVENT_TYPE_FIELD));
        Self { kind, raw }
    }

    #[must_use]
    pub const fn kind(&self) -> &EventKind {
        &self.kind
    }

    #[must_use]
    pub fn is_alert(&self) -> bool {
        self.kind == EventKind::Alert
    }

    #[must_use]
    pub fn is_stats(&self) -> bool {
        self.kind == EventKind::Stats
    }

    /// The payload as received.
    #[must_use]
    pub const fn raw(&self) -> &Value {
        &self.raw
    }

    /// Look up a nested field by a dotted path (`"alert.signature"`).
    #[must_use]
    pub fn field(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.raw, |value, segment| value.get(segment))
    }

    /// The event's own timestamp, if it carries a non-empty one.
    #[must_use]
    pub fn timestamp(&self) -> Option<&str> {
        self.field("timestamp")
            .and_then(Value::as_str)
            .filter(|ts| !ts.is_empty())
    }
}

impl From<Value> for SecurityEvent {
    fn from(raw: Value) -> Self {
        Self::from_value(raw)
    }
}

/// Extract the text to store from a subprocess output payload
/// (`{ "type": "stdout", "line": "..." }`).
///
/// Payloads without a `line` string keep their JSON text so nothing is
/// silently lost.
#[must_use]
pub fn output_text(payload: &Value) -> String {
    match payload.get("line").and_then(Value::as_str) {
        Some(line) => line.to_string(),
        None => match payload {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        },
    }
}

/// Notification on the rules-update progress channel.
///
/// Only the `type` field decides the variant. Every other field is read on
/// its own, and one that is missing or mistyped becomes `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateNotification {
    /// Byte-level progress of the current source download.
    Download {
        progress: Option<u8>,
        url: Option<String>,
        downloaded: Option<u64>,
        total: Option<u64>,
    },
    /// Free-text announcement, optionally carrying source counters.
    Info {
        message: Option<String>,
        url: Option<String>,
        current_source: Option<u32>,
        total_sources: Option<u32>,
    },
    /// The update finished.
    Complete { message: Option<String> },
}

impl UpdateNotification {
    /// Parse a payload; `None` only when `type` is missing or unrecognized.
    #[must_use]
    pub fn parse(payload: &Value) -> Option<Self> {
        let text = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_string);
        let count = |key: &str| payload.get(key).and_then(Value::as_u64);
        let counter = |key: &str| count(key).and_then(|n| u32::try_from(n).ok());

        match payload.get("type").and_then(Value::as_str)? {
            "download" => Some(Self::Download {
                progress: payload.get("progress").and_then(parse_percent),
                url: text("url"),
                downloaded: count("downloaded"),
                total: count("total"),
            }),
            "info" => Some(Self::Info {
                message: text("message"),
                url: text("url"),
                current_source: counter("current_source"),
                total_sources: counter("total_sources"),
            }),
            "complete" => Some(Self::Complete {
                message: text("message"),
            }),
            _ => None,
        }
    }
}

/// Parse a download-progress payload (an integer percent) into `0..=100`.
#[must_use]
pub fn parse_percent(payload: &Value) -> Option<u8> {
    let raw = payload
        .as_u64()
        .or_else(|| payload.as_f64().filter(|p| p.is_finite() && *p >= 0.0).map(|p| p as u64))?;
    Some(u8::try_from(raw.min(100)).unwrap_or(100))
}
