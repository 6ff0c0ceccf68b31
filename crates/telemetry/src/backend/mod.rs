//! The process-supervision backend boundary.
//!
//! The core never manages subprocesses itself. It listens on named push
//! channels and issues request/response commands through [`Backend`]; every
//! call is a suspension point and each one may fail independently.

mod memory;

pub use memory::InMemoryBackend;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

/// Identifier the backend assigns to a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener_{}", self.0)
    }
}

/// A live registration on one push channel.
#[derive(Debug)]
pub struct Listener {
    pub id: ListenerId,
    pub receiver: mpsc::Receiver<Value>,
}

/// Monitored subprocess whose running state is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    /// The intrusion-detection engine.
    Engine,
    /// The companion event viewer.
    Viewer,
}

impl Subject {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Engine => "engine",
            Self::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request/response and push interface of the supervision backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Register a listener on `channel` with a queue of `capacity` payloads.
    async fn listen(&self, channel: &str, capacity: usize) -> Result<Listener>;

    /// Release a listener. Returns once the backend has stopped delivering to it.
    async fn unlisten(&self, id: ListenerId) -> Result<()>;

    /// Enumerate capture interfaces as `"name - ip - guid"` descriptors.
    async fn list_interfaces(&self) -> Result<Vec<String>>;

    /// Query whether a monitored subprocess is running.
    async fn is_running(&self, subject: Subject) -> Result<bool>;

    /// Start the engine capturing on `interface`.
    async fn start_engine(&self, interface: &str) -> Result<String>;

    async fn stop_engine(&self) -> Result<String>;

    /// Start tailing the engine's structured event log.
    async fn start_event_tail(&self) -> Result<String>;

    async fn stop_event_tail(&self) -> Result<String>;

    async fn start_viewer(&self) -> Result<String>;

    async fn stop_viewer(&self) -> Result<String>;

    /// Open the viewer's web interface.
    async fn open_viewer(&self) -> Result<String>;

    /// Download and install a component. Progress arrives on its push channel.
    async fn install(&self, component: &str) -> Result<String>;

    /// Fetch and merge detection rules. Progress arrives on the update channel.
    async fn update_rules(&self) -> Result<String>;
}
