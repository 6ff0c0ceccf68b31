//! Configuration for the monitor core.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::{EVENT_CAPACITY, OUTPUT_CAPACITY};
use crate::error::{Error, Result};
use crate::poller::{PollConfig, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT};
use crate::scroll::DEFAULT_SCROLL_DEFER;
use crate::subscription::DEFAULT_LISTENER_CAPACITY;

/// Names of the backend push channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelNames {
    pub engine_output: String,
    pub engine_event: String,
    pub update_progress: String,
    pub viewer_output: String,
    /// Per-component download progress arrives on `<prefix><component>`.
    pub download_progress_prefix: String,
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self {
            engine_output: "suricata-output".to_string(),
            engine_event: "eve-json-event".to_string(),
            update_progress: "rules-update-progress".to_string(),
            viewer_output: "evebox-output".to_string(),
            download_progress_prefix: "download-progress-".to_string(),
        }
    }
}

impl ChannelNames {
    /// Download-progress channel of `component`.
    #[must_use]
    pub fn download_progress(&self, component: &str) -> String {
        format!("{}{component}", self.download_progress_prefix)
    }
}

/// Monitor core configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between running-state checks.
    #[serde(with = "duration_millis", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Deadline for a single running-state check.
    #[serde(with = "duration_millis", default = "default_poll_timeout")]
    pub poll_timeout: Duration,

    #[serde(default = "default_output_capacity")]
    pub output_capacity: usize,

    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Delay between an append and the scroll that follows it.
    #[serde(with = "duration_millis", default = "default_scroll_defer")]
    pub scroll_defer: Duration,

    /// Queue depth of each backend listener.
    #[serde(default = "default_listener_capacity")]
    pub listener_capacity: usize,

    /// Installable components.
    #[serde(default = "default_components")]
    pub components: Vec<String>,

    #[serde(default)]
    pub channels: ChannelNames,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            poll_timeout: default_poll_timeout(),
            output_capacity: default_output_capacity(),
            event_capacity: default_event_capacity(),
            scroll_defer: default_scroll_defer(),
            listener_capacity: default_listener_capacity(),
            components: default_components(),
            channels: ChannelNames::default(),
        }
    }
}

impl MonitorConfig {
    /// Short intervals for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            poll_timeout: Duration::from_millis(25),
            scroll_defer: Duration::from_millis(1),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn with_scroll_defer(mut self, defer: Duration) -> Self {
        self.scroll_defer = defer;
        self
    }

    #[must_use]
    pub fn with_components<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.components = components.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_channels(mut self, channels: ChannelNames) -> Self {
        self.channels = channels;
        self
    }

    /// Poller timing derived from this config.
    #[must_use]
    pub const fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: self.poll_interval,
            timeout: self.poll_timeout,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let mut config = Self::default();

        if let Some(ms) = number("MEERKAT_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = number("MEERKAT_POLL_TIMEOUT_MS") {
            config.poll_timeout = Duration::from_millis(ms);
        }
        if let Some(capacity) = number("MEERKAT_OUTPUT_CAPACITY").and_then(|n| usize::try_from(n).ok()) {
            config.output_capacity = capacity;
        }
        if let Some(capacity) = number("MEERKAT_EVENT_CAPACITY").and_then(|n| usize::try_from(n).ok()) {
            config.event_capacity = capacity;
        }

        config
    }

    /// Load configuration from a file: `.json` as JSON, anything else as TOML.
    ///
    /// # Errors
    ///
    /// I/O and parse failures, and values rejected by [`validate`](Self::validate).
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let config: Self = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)
                .map_err(|e| Error::config(format!("Failed to parse config: {e}")))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the core cannot run with.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::config("poll_interval must be greater than zero"));
        }
        if self.poll_timeout.is_zero() {
            return Err(Error::config("poll_timeout must be greater than zero"));
        }
        if self.output_capacity == 0 || self.event_capacity == 0 {
            return Err(Error::config("buffer capacities must be greater than zero"));
        }
        Ok(())
    }
}

const fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

const fn default_poll_timeout() -> Duration {
    DEFAULT_POLL_TIMEOUT
}

const fn default_output_capacity() -> usize {
    OUTPUT_CAPACITY
}

const fn default_event_capacity() -> usize {
    EVENT_CAPACITY
}

const fn default_scroll_defer() -> Duration {
    DEFAULT_SCROLL_DEFER
}

const fn default_listener_capacity() -> usize {
    DEFAULT_LISTENER_CAPACITY
}

fn default_components() -> Vec<String> {
    ["suricata", "npcap", "evebox"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Serialization helper for Duration as milliseconds.
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.output_capacity, 1000);
        assert_eq!(config.event_capacity, 300);
        assert_eq!(config.scroll_defer, Duration::from_millis(10));
        assert_eq!(config.components, vec!["suricata", "npcap", "evebox"]);
        assert_eq!(
            config.channels.download_progress("npcap"),
            "download-progress-npcap"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = [
            ("MEERKAT_POLL_INTERVAL_MS", "500"),
            ("MEERKAT_EVENT_CAPACITY", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = MonitorConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.event_capacity, 300);
    }

    #[test]
    fn test_from_toml_file_with_partial_fields() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "poll_interval = 1000\nevent_capacity = 50\n\n[channels]\nengine_event = \"custom-event\""
        )
        .unwrap();

        let config = MonitorConfig::from_file(file.path()).unwrap();

        assert_eq!(config.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.event_capacity, 50);
        assert_eq!(config.output_capacity, 1000);
        assert_eq!(config.channels.engine_event, "custom-event");
        assert_eq!(config.channels.engine_output, "suricata-output");
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"output_capacity": 20, "components": ["suricata"]}}"#).unwrap();

        let config = MonitorConfig::from_file(file.path()).unwrap();

        assert_eq!(config.output_capacity, 20);
        assert_eq!(config.components, vec!["suricata"]);
    }

    #[test]
    fn test_from_file_rejects_zero_capacity() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "output_capacity = 0").unwrap();

        let err = MonitorConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_builder_setters() {
        let config = MonitorConfig::default()
            .with_poll_interval(Duration::from_millis(250))
            .with_event_capacity(10)
            .with_components(["evebox"]);
        assert_eq!(config.poll_config().interval, Duration::from_millis(250));
        assert_eq!(config.event_capacity, 10);
        assert_eq!(config.components, vec!["evebox"]);
    }
}
