//! Error types for the telemetry core.
//!
//! Nothing in this crate is fatal to the process: every variant describes a
//! recoverable failure that is reported to the caller or logged and dropped.

use thiserror::Error;

/// Result type alias for telemetry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Telemetry core error.
#[derive(Debug, Error)]
pub enum Error {
    /// A request across the backend boundary failed.
    #[error("backend operation '{operation}' failed: {reason}")]
    Backend { operation: String, reason: String },

    /// The backend refused to register a listener for a channel.
    #[error("subscription to '{channel}' failed: {reason}")]
    SubscriptionFailed { channel: String, reason: String },

    /// Releasing a listener did not complete cleanly.
    #[error("releasing subscription to '{channel}' failed: {reason}")]
    UnsubscribeFailed { channel: String, reason: String },

    /// A rules update is already running.
    #[error("a rules update is already in progress")]
    UpdateInProgress,

    /// An install of the same component is already running.
    #[error("install of '{component}' is already in progress")]
    InstallInProgress { component: String },

    /// The component is not one the monitor tracks.
    #[error("unknown component '{component}'")]
    UnknownComponent { component: String },

    /// Starting the engine needs a capture interface.
    #[error("no network interface selected")]
    NoInterfaceSelected,

    /// The interface is not enumerated or has no usable GUID.
    #[error("interface '{interface}' is not selectable")]
    UnknownInterface { interface: String },

    /// A backend call did not answer within its deadline.
    #[error("backend operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Invalid or unreadable configuration.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a backend failure.
    pub fn backend(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a subscription failure.
    pub fn subscription_failed(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SubscriptionFailed {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsubscribe failure.
    pub fn unsubscribe_failed(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsubscribeFailed {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    /// Create an install-in-progress error.
    pub fn install_in_progress(component: impl Into<String>) -> Self {
        Self::InstallInProgress {
            component: component.into(),
        }
    }

    /// Create an unknown-component error.
    pub fn unknown_component(component: impl Into<String>) -> Self {
        Self::UnknownComponent {
            component: component.into(),
        }
    }

    /// Create an unknown-interface error.
    pub fn unknown_interface(interface: impl Into<String>) -> Self {
        Self::UnknownInterface {
            interface: interface.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Whether this failure came from the backend boundary and may succeed on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Backend { .. } | Self::Timeout { .. } | Self::SubscriptionFailed { .. }
        )
    }
}
