//! Derived views over buffered telemetry.
//!
//! Pure projections: they take a snapshot and return rows for presentation.
//! Missing or malformed fields fall back to fixed labels; nothing here fails.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::event::{SecurityEvent, EVENT_TYPE_FIELD, NO_TIMESTAMP, UNKNOWN};

/// One row of the events view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRow {
    pub timestamp: String,
    pub event_type: String,
}

impl EventRow {
    #[must_use]
    pub fn from_event(event: &SecurityEvent) -> Self {
        Self {
            timestamp: event.timestamp().unwrap_or(NO_TIMESTAMP).to_string(),
            event_type: event.kind().as_str().to_string(),
        }
    }
}

/// One row of the alerts view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRow {
    pub timestamp: String,
    pub signature: String,
    /// Raw severity as sent by the engine, usually an integer.
    pub severity: Option<Value>,
}

impl AlertRow {
    #[must_use]
    pub fn from_event(event: &SecurityEvent) -> Self {
        let signature = event
            .field("alert.signature")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string();
        let severity = event
            .field("alert.severity")
            .filter(|v| !v.is_null())
            .cloned();

        Self {
            timestamp: event.timestamp().unwrap_or(NO_TIMESTAMP).to_string(),
            signature,
            severity,
        }
    }

    /// Severity for display, `Unknown` when absent. A severity of `0` is
    /// shown as `0`.
    #[must_use]
    pub fn severity_label(&self) -> String {
        match &self.severity {
            Some(Value::String(text)) if !text.is_empty() => text.clone(),
            Some(Value::String(_)) | None => UNKNOWN.to_string(),
            Some(other) => other.to_string(),
        }
    }
}

/// Every buffered event except stats, in arrival order.
pub fn events_view<'a, I>(events: I) -> Vec<Arc<SecurityEvent>>
where
    I: IntoIterator<Item = &'a Arc<SecurityEvent>>,
{
    events
        .into_iter()
        .filter(|event| !event.is_stats())
        .cloned()
        .collect()
}

/// Display rows for [`events_view`].
pub fn event_rows<'a, I>(events: I) -> Vec<EventRow>
where
    I: IntoIterator<Item = &'a Arc<SecurityEvent>>,
{
    events
        .into_iter()
        .filter(|event| !event.is_stats())
        .map(|event| EventRow::from_event(event))
        .collect()
}

/// Alert events only, in arrival order.
pub fn alerts_view<'a, I>(events: I) -> Vec<AlertRow>
where
    I: IntoIterator<Item = &'a Arc<SecurityEvent>>,
{
    events
        .into_iter()
        .filter(|event| event.is_alert())
        .map(|event| AlertRow::from_event(event))
        .collect()
}

/// Flattened value of one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    /// Strings as sent, and arrays serialized to compact JSON.
    Text(String),
}

impl MetricValue {
    fn from_leaf(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(n.clone()),
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => Self::Text(value.to_string()),
        }
    }

    /// Numeric zero or the string `"0"`.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Number(n) => n.as_f64() == Some(0.0),
            Self::Text(s) => s == "0",
            Self::Null | Self::Bool(_) => false,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One key/value row of the metrics view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub key: String,
    pub value: MetricValue,
}

/// User-controlled filters on the metrics view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsFilter {
    /// Case-insensitive substring the key must contain; empty matches all.
    pub key_filter: String,
    pub hide_zero: bool,
}

impl MetricsFilter {
    #[must_use]
    pub fn new(key_filter: impl Into<String>, hide_zero: bool) -> Self {
        Self {
            key_filter: key_filter.into(),
            hide_zero,
        }
    }

    #[must_use]
    pub fn matches(&self, row: &MetricRow) -> bool {
        let key_ok = self.key_filter.is_empty()
            || row
                .key
                .to_lowercase()
                .contains(&self.key_filter.to_lowercase());
        key_ok && !(self.hide_zero && row.value.is_zero())
    }
}

/// Flatten an object into dotted-path rows.
///
/// Nested objects recurse with `.`-joined keys; arrays become one compact
/// JSON string. Row order follows the object's own key order.
#[must_use]
pub fn flatten(object: &Map<String, Value>) -> Vec<MetricRow> {
    let mut rows = Vec::new();
    flatten_into(object, "", &mut rows);
    rows
}

fn flatten_into(object: &Map<String, Value>, prefix: &str, rows: &mut Vec<MetricRow>) {
    for (key, value) in object {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(nested) => flatten_into(nested, &path, rows),
            leaf => rows.push(MetricRow {
                key: path,
                value: MetricValue::from_leaf(leaf),
            }),
        }
    }
}

/// The latest stats snapshot as filtered metric rows.
///
/// The discriminator key is dropped. Returns an empty list until a stats
/// event has arrived.
#[must_use]
pub fn metrics_view(snapshot: Option<&SecurityEvent>, filter: &MetricsFilter) -> Vec<MetricRow> {
    let Some(object) = snapshot.and_then(|event| event.raw().as_object()) else {
        return Vec::new();
    };
    flatten(object)
        .into_iter()
        .filter(|row| row.key != EVENT_TYPE_FIELD)
        .filter(|row| filter.matches(row))
        .collect()
}

/// Human-readable byte count: `0 Bytes`, `1.5 KB`, `12.34 MB`.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit < UNITS.len().saturating_sub(1) {
        value /= 1024.0;
        unit = unit.saturating_add(1);
    }

    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS.get(unit).copied().unwrap_or("GB"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    fn events(values: Vec<Value>) -> Vec<Arc<SecurityEvent>> {
        values
            .into_iter()
            .map(|v| Arc::new(SecurityEvent::from_value(v)))
            .collect()
    }

    fn stats(value: Value) -> SecurityEvent {
        SecurityEvent::from_value(value)
    }

    #[test]
    fn should_exclude_stats_from_events_view() {
        let buffered = events(vec![
            json!({"event_type": "flow", "timestamp": "t1"}),
            json!({"event_type": "stats", "stats": {"uptime": 5}}),
            json!({"event_type": "alert", "timestamp": "t3"}),
        ]);

        let rows = event_rows(&buffered);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].event_type, "flow");
        assert_eq!(rows[1].event_type, "alert");
        assert_eq!(events_view(&buffered).len(), 2);
    }

    #[test]
    fn should_fall_back_for_missing_event_fields() {
        let buffered = events(vec![json!({"src_ip": "10.0.0.1"})]);
        let rows = event_rows(&buffered);
        assert_eq!(
            rows[0],
            EventRow {
                timestamp: "No timestamp".to_string(),
                event_type: "Unknown".to_string(),
            }
        );
    }

    #[test]
    fn should_project_alert_signature_and_severity() {
        let buffered = events(vec![
            json!({"event_type": "alert", "alert": {"signature": "ET SCAN", "severity": 1}}),
            json!({"event_type": "alert"}),
            json!({"event_type": "dns"}),
        ]);

        let alerts = alerts_view(&buffered);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].signature, "ET SCAN");
        assert_eq!(alerts[0].severity, Some(json!(1)));
        assert_eq!(alerts[0].severity_label(), "1");
        assert_eq!(alerts[1].signature, "Unknown");
        assert_eq!(alerts[1].severity_label(), "Unknown");
    }

    #[test]
    fn should_show_zero_severity_as_a_value() {
        let buffered = events(vec![
            json!({"event_type": "alert", "alert": {"signature": "ET INFO", "severity": 0}}),
            json!({"event_type": "alert", "alert": {"severity": null}}),
        ]);

        let alerts = alerts_view(&buffered);
        assert_eq!(alerts[0].severity_label(), "0");
        assert_eq!(alerts[1].severity, None);
        assert_eq!(alerts[1].severity_label(), "Unknown");
    }

    #[test]
    fn should_flatten_nested_objects_and_serialize_arrays() {
        let event = stats(json!({"a": {"b": 1, "c": [1, 2]}, "d": 0}));
        let rows = metrics_view(Some(&event), &MetricsFilter::default());

        let pairs: Vec<(String, String)> = rows
            .iter()
            .map(|row| (row.key.clone(), row.value.to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("a.b".to_string(), "1".to_string()),
                ("a.c".to_string(), "[1,2]".to_string()),
                ("d".to_string(), "0".to_string()),
            ]
        );
        assert_eq!(rows[1].value, MetricValue::Text("[1,2]".to_string()));
    }

    #[test]
    fn should_hide_zero_values() {
        let event = stats(json!({"a": {"b": 1, "c": [1, 2]}, "d": 0, "e": "0", "f": 0.0}));
        let rows = metrics_view(Some(&event), &MetricsFilter::new("", true));
        let keys: Vec<&str> = rows.iter().map(|row| row.key.as_str()).collect();
        assert_eq!(keys, vec!["a.b", "a.c"]);
    }

    #[test]
    fn should_filter_keys_case_insensitively() {
        let event = stats(json!({"a": {"b": 1, "c": [1, 2]}, "d": 0}));
        let rows = metrics_view(Some(&event), &MetricsFilter::new("b", false));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "a.b");

        let event = stats(json!({"stats": {"Capture": {"kernel_packets": 10}}}));
        let rows = metrics_view(Some(&event), &MetricsFilter::new("CAPTURE", false));
        assert_eq!(rows[0].key, "stats.Capture.kernel_packets");
    }

    #[test]
    fn should_drop_discriminator_and_keep_key_order() {
        let event = stats(json!({
            "timestamp": "2025-01-01T00:00:00Z",
            "event_type": "stats",
            "stats": {"uptime": 30, "decoder": {"pkts": 4, "bytes": 0}}
        }));
        let rows = metrics_view(Some(&event), &MetricsFilter::default());
        let keys: Vec<&str> = rows.iter().map(|row| row.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "timestamp",
                "stats.uptime",
                "stats.decoder.pkts",
                "stats.decoder.bytes"
            ]
        );
    }

    #[test]
    fn should_return_empty_metrics_without_snapshot() {
        assert!(metrics_view(None, &MetricsFilter::default()).is_empty());
        let not_object = stats(json!([1, 2, 3]));
        assert!(metrics_view(Some(&not_object), &MetricsFilter::default()).is_empty());
    }

    #[test]
    fn should_format_bytes() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1024 * 1024), "1 MB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5 GB");
    }
}
