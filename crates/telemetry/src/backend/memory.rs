//! In-process backend.
//!
//! Delivers push payloads to registered listeners and answers commands from
//! settable state. Operations can be scripted to fail, stall, or emit
//! notifications before they return, which is how tests and the replay CLI
//! drive the core without a real supervision process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{Backend, Listener, ListenerId, Subject};
use crate::error::{Error, Result};

/// Payloads emitted on a channel when a scripted operation runs.
#[derive(Debug, Clone)]
struct Script {
    channel: String,
    payloads: Vec<Value>,
}

/// In-memory backend for tests and offline replay.
#[derive(Default)]
pub struct InMemoryBackend {
    listeners: Mutex<HashMap<String, Vec<(ListenerId, mpsc::Sender<Value>)>>>,
    next_listener: AtomicU64,
    running: Mutex<HashMap<Subject, bool>>,
    interfaces: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, String>>,
    delays: Mutex<HashMap<String, Duration>>,
    scripts: Mutex<HashMap<String, Vec<Script>>>,
    calls: Mutex<Vec<String>>,
}

impl InMemoryBackend {
    /// Create an empty backend: nothing running, no interfaces.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new backend wrapped in an `Arc`.
    #[must_use]
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Deliver `payload` to every listener on `channel`.
    ///
    /// Returns how many listeners accepted it.
    pub async fn emit(&self, channel: &str, payload: Value) -> usize {
        let senders: Vec<_> = self
            .listeners
            .lock()
            .get(channel)
            .map(|entries| entries.iter().map(|(_, tx)| tx.clone()).collect())
            .unwrap_or_default();

        let mut delivered = 0usize;
        for sender in senders {
            if sender.send(payload.clone()).await.is_ok() {
                delivered = delivered.saturating_add(1);
            }
        }
        trace!(channel, delivered, "emitted payload");
        delivered
    }

    /// Set the answer to running-state queries for `subject`.
    pub fn set_running(&self, subject: Subject, running: bool) {
        self.running.lock().insert(subject, running);
    }

    /// Set the descriptors returned by interface enumeration.
    pub fn set_interfaces<I, S>(&self, interfaces: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.interfaces.lock() = interfaces.into_iter().map(Into::into).collect();
    }

    /// Make `operation` fail with `reason` until [`recover`](Self::recover) is called.
    ///
    /// Operation names are the trait method names; `listen` and `is_running`
    /// are qualified by channel or subject (`"listen:suricata-output"`,
    /// `"is_running:viewer"`).
    pub fn fail(&self, operation: impl Into<String>, reason: impl Into<String>) {
        self.failures.lock().insert(operation.into(), reason.into());
    }

    /// Clear an injected failure.
    pub fn recover(&self, operation: &str) {
        self.failures.lock().remove(operation);
    }

    /// Make `operation` take `delay` before answering.
    pub fn delay(&self, operation: impl Into<String>, delay: Duration) {
        self.delays.lock().insert(operation.into(), delay);
    }

    /// Emit `payloads` on `channel` whenever `operation` runs, before it returns.
    pub fn script<I>(&self, operation: impl Into<String>, channel: impl Into<String>, payloads: I)
    where
        I: IntoIterator<Item = Value>,
    {
        self.scripts
            .lock()
            .entry(operation.into())
            .or_default()
            .push(Script {
                channel: channel.into(),
                payloads: payloads.into_iter().collect(),
            });
    }

    /// Number of live listeners on `channel`.
    #[must_use]
    pub fn listener_count(&self, channel: &str) -> usize {
        self.listeners.lock().get(channel).map_or(0, Vec::len)
    }

    /// Number of live listeners across all channels.
    #[must_use]
    pub fn total_listeners(&self) -> usize {
        self.listeners.lock().values().map(Vec::len).sum()
    }

    /// Every operation invoked so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// How many times `operation` was invoked.
    #[must_use]
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == operation).count()
    }

    /// Record the call, apply any delay, fail if scripted to, then run scripts.
    async fn enter(&self, operation: &str) -> Result<()> {
        self.calls.lock().push(operation.to_string());

        let delay = self.delays.lock().get(operation).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().get(operation).cloned();
        if let Some(reason) = failure {
            debug!(operation, %reason, "injected backend failure");
            return Err(Error::backend(operation, reason));
        }

        let scripts = self.scripts.lock().get(operation).cloned().unwrap_or_default();
        for script in scripts {
            for payload in script.payloads {
                self.emit(&script.channel, payload).await;
            }
        }
        Ok(())
    }

    async fn acknowledge(&self, operation: &str) -> Result<String> {
        self.enter(operation).await?;
        Ok(format!("{operation}: ok"))
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn listen(&self, channel: &str, capacity: usize) -> Result<Listener> {
        let operation = format!("listen:{channel}");
        self.enter(&operation)
            .await
            .map_err(|err| Error::subscription_failed(channel, err.to_string()))?;

        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        self.listeners
            .lock()
            .entry(channel.to_string())
            .or_default()
            .push((id, sender));

        debug!(channel, listener = %id, "listener registered");
        Ok(Listener { id, receiver })
    }

    async fn unlisten(&self, id: ListenerId) -> Result<()> {
        self.enter("unlisten").await?;
        let mut listeners = self.listeners.lock();
        for entries in listeners.values_mut() {
            entries.retain(|(listener, _)| *listener != id);
        }
        listeners.retain(|_, entries| !entries.is_empty());
        debug!(listener = %id, "listener released");
        Ok(())
    }

    async fn list_interfaces(&self) -> Result<Vec<String>> {
        self.enter("list_interfaces").await?;
        Ok(self.interfaces.lock().clone())
    }

    async fn is_running(&self, subject: Subject) -> Result<bool> {
        self.enter(&format!("is_running:{subject}")).await?;
        Ok(self.running.lock().get(&subject).copied().unwrap_or(false))
    }

    async fn start_engine(&self, interface: &str) -> Result<String> {
        self.enter("start_engine").await?;
        self.set_running(Subject::Engine, true);
        Ok(format!("engine started on {interface}"))
    }

    async fn stop_engine(&self) -> Result<String> {
        self.enter("stop_engine").await?;
        self.set_running(Subject::Engine, false);
        Ok("engine stopped".to_string())
    }

    async fn start_event_tail(&self) -> Result<String> {
        self.acknowledge("start_event_tail").await
    }

    async fn stop_event_tail(&self) -> Result<String> {
        self.acknowledge("stop_event_tail").await
    }

    async fn start_viewer(&self) -> Result<String> {
        self.enter("start_viewer").await?;
        self.set_running(Subject::Viewer, true);
        Ok("viewer started".to_string())
    }

    async fn stop_viewer(&self) -> Result<String> {
        self.enter("stop_viewer").await?;
        self.set_running(Subject::Viewer, false);
        Ok("viewer stopped".to_string())
    }

    async fn open_viewer(&self) -> Result<String> {
        self.acknowledge("open_viewer").await
    }

    async fn install(&self, component: &str) -> Result<String> {
        self.enter(&format!("install:{component}")).await?;
        Ok(format!("{component} installed"))
    }

    async fn update_rules(&self) -> Result<String> {
        self.acknowledge("update_rules").await
    }
}
