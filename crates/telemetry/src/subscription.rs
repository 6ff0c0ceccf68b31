//! Push-channel subscriptions.
//!
//! Each subscription owns one pump task. The task registers a listener with
//! the backend, then feeds every payload to the channel's handler in delivery
//! order. Channels are independent: a slow handler only delays its own
//! channel.
//!
//! Listener registration is asynchronous, so a release may be requested
//! before the listener exists. The pump always finishes registration first
//! and then releases it, so no listener outlives [`SubscriptionManager::unsubscribe_all`].

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{Backend, Listener, ListenerId};
use crate::error::{Error, Result};

/// Default per-listener queue depth.
pub const DEFAULT_LISTENER_CAPACITY: usize = 256;

/// Receives payloads for one channel.
///
/// Handlers run on the channel's pump task and must not block; long work
/// belongs in a spawned task.
pub trait ChannelHandler: Send + 'static {
    fn handle(&mut self, payload: Value);
}

impl<F> ChannelHandler for F
where
    F: FnMut(Value) + Send + 'static,
{
    fn handle(&mut self, payload: Value) {
        self(payload);
    }
}

/// Resolves once the backend has accepted (or refused) a subscription.
#[must_use = "a refused subscription is only reported through `Established`"]
pub struct Established {
    channel: String,
    rx: oneshot::Receiver<Result<ListenerId>>,
}

impl Established {
    /// Wait for registration to finish.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SubscriptionFailed`] if the backend refused the
    /// listener or the pump was torn down before registering.
    pub async fn wait(self) -> Result<ListenerId> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::subscription_failed(
                self.channel,
                "subscription dropped before registration completed",
            )),
        }
    }

    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

/// Bookkeeping for one live subscription.
struct Subscription {
    channel: String,
    release_tx: watch::Sender<bool>,
    pump: JoinHandle<Result<()>>,
}

/// Registers handlers on push channels and releases them exactly once.
pub struct SubscriptionManager {
    backend: Arc<dyn Backend>,
    capacity: usize,
    subscriptions: Vec<Subscription>,
}

impl SubscriptionManager {
    /// Create a manager with the default listener capacity.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_capacity(backend, DEFAULT_LISTENER_CAPACITY)
    }

    /// Create a manager whose listeners queue up to `capacity` payloads.
    #[must_use]
    pub fn with_capacity(backend: Arc<dyn Backend>, capacity: usize) -> Self {
        Self {
            backend,
            capacity: capacity.max(1),
            subscriptions: Vec::new(),
        }
    }

    /// Subscribe `handler` to `channel`.
    ///
    /// Returns immediately; registration completes on the pump task and its
    /// outcome is reported through the returned [`Established`].
    pub fn subscribe<H>(&mut self, channel: impl Into<String>, handler: H) -> Established
    where
        H: ChannelHandler,
    {
        let channel = channel.into();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (release_tx, release_rx) = watch::channel(false);

        let pump = tokio::spawn(pump(
            Arc::clone(&self.backend),
            channel.clone(),
            self.capacity,
            handler,
            ready_tx,
            release_rx,
        ));

        debug!(channel = %channel, "subscription requested");
        self.subscriptions.push(Subscription {
            channel: channel.clone(),
            release_tx,
            pump,
        });

        Established {
            channel,
            rx: ready_rx,
        }
    }

    /// Number of subscriptions not yet released.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Channels with a subscription not yet released.
    #[must_use]
    pub fn channels(&self) -> Vec<&str> {
        self.subscriptions.iter().map(|s| s.channel.as_str()).collect()
    }

    /// Release every subscription and wait until each release is confirmed.
    ///
    /// Handlers are never invoked after this resolves. Calling it again is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Every subscription is released even when some releases fail; the
    /// first failure is returned.
    pub async fn unsubscribe_all(&mut self) -> Result<()> {
        let subscriptions = std::mem::take(&mut self.subscriptions);
        if subscriptions.is_empty() {
            return Ok(());
        }

        for subscription in &subscriptions {
            let _ = subscription.release_tx.send(true);
        }

        let mut first_error = None;
        let total = subscriptions.len();
        for subscription in subscriptions {
            let outcome = match subscription.pump.await {
                Ok(result) => result,
                Err(join_err) => Err(Error::unsubscribe_failed(
                    subscription.channel.as_str(),
                    join_err.to_string(),
                )),
            };
            if let Err(err) = outcome {
                warn!(channel = %subscription.channel, error = %err, "release failed");
                first_error.get_or_insert(err);
            }
        }

        info!(released = total, "all subscriptions released");
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        if !self.subscriptions.is_empty() {
            warn!(
                remaining = self.subscriptions.len(),
                "subscription manager dropped without unsubscribe_all; aborting pumps"
            );
            for subscription in &self.subscriptions {
                subscription.pump.abort();
            }
        }
    }
}

/// Register, deliver until released, then release and confirm.
async fn pump<H: ChannelHandler>(
    backend: Arc<dyn Backend>,
    channel: String,
    capacity: usize,
    mut handler: H,
    ready_tx: oneshot::Sender<Result<ListenerId>>,
    mut release_rx: watch::Receiver<bool>,
) -> Result<()> {
    // Registration is not interruptible: a listener that resolves after a
    // release request must still be released below.
    let Listener { id, mut receiver } = match backend.listen(&channel, capacity).await {
        Ok(listener) => listener,
        Err(err) => {
            warn!(channel = %channel, error = %err, "subscription failed");
            let _ = ready_tx.send(Err(err));
            return Ok(());
        }
    };
    let _ = ready_tx.send(Ok(id));
    debug!(channel = %channel, listener = %id, "subscription established");

    if !*release_rx.borrow_and_update() {
        loop {
            tokio::select! {
                biased;
                changed = release_rx.changed() => {
                    if changed.is_err() || *release_rx.borrow() {
                        break;
                    }
                }
                payload = receiver.recv() => match payload {
                    Some(payload) => handler.handle(payload),
                    None => {
                        debug!(channel = %channel, "backend closed channel");
                        break;
                    }
                },
            }
        }
    }

    // Stop intake, then apply what the listener had already accepted.
    receiver.close();
    while let Some(payload) = receiver.recv().await {
        handler.handle(payload);
    }

    backend
        .unlisten(id)
        .await
        .map_err(|err| Error::unsubscribe_failed(channel.as_str(), err.to_string()))?;
    debug!(channel = %channel, listener = %id, "subscription released");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::backend::InMemoryBackend;

    fn counting_handler(count: &Arc<AtomicUsize>) -> impl ChannelHandler {
        let count = Arc::clone(count);
        move |_payload: Value| {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn should_deliver_payloads_in_arrival_order() {
        let backend = InMemoryBackend::new_arc();
        let mut manager = SubscriptionManager::new(backend.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        manager
            .subscribe("suricata-output", move |payload: Value| {
                sink.lock().push(payload["line"].as_str().unwrap().to_string());
            })
            .wait()
            .await
            .unwrap();

        for line in ["one", "two", "three"] {
            backend.emit("suricata-output", json!({"line": line})).await;
        }
        manager.unsubscribe_all().await.unwrap();

        assert_eq!(*seen.lock(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn should_not_deliver_after_unsubscribe_all_resolves() {
        let backend = InMemoryBackend::new_arc();
        let mut manager = SubscriptionManager::new(backend.clone());
        let count = Arc::new(AtomicUsize::new(0));

        let established = manager.subscribe("eve-json-event", counting_handler(&count));
        manager.unsubscribe_all().await.unwrap();
        assert!(established.wait().await.is_ok());

        let delivered = backend.emit("eve-json-event", json!({"event_type": "alert"})).await;

        assert_eq!(delivered, 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(backend.total_listeners(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_release_listener_that_registers_after_release_request() {
        let backend = InMemoryBackend::new_arc();
        backend.delay("listen:evebox-output", Duration::from_millis(500));
        let mut manager = SubscriptionManager::new(backend.clone());
        let count = Arc::new(AtomicUsize::new(0));

        let _established = manager.subscribe("evebox-output", counting_handler(&count));
        manager.unsubscribe_all().await.unwrap();

        assert_eq!(backend.call_count("listen:evebox-output"), 1);
        assert_eq!(backend.call_count("unlisten"), 1);
        assert_eq!(backend.total_listeners(), 0);
    }

    #[tokio::test]
    async fn should_surface_subscribe_failure_without_affecting_other_channels() {
        let backend = InMemoryBackend::new_arc();
        backend.fail("listen:eve-json-event", "backend unreachable");
        let mut manager = SubscriptionManager::new(backend.clone());
        let count = Arc::new(AtomicUsize::new(0));

        let failed = manager.subscribe("eve-json-event", counting_handler(&count));
        let healthy = manager.subscribe("suricata-output", counting_handler(&count));

        assert!(matches!(
            failed.wait().await,
            Err(Error::SubscriptionFailed { .. })
        ));
        assert!(healthy.wait().await.is_ok());

        backend.emit("suricata-output", json!({"line": "still flowing"})).await;
        manager.unsubscribe_all().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_report_failed_release_after_releasing_the_rest() {
        let backend = InMemoryBackend::new_arc();
        let mut manager = SubscriptionManager::new(backend.clone());
        let count = Arc::new(AtomicUsize::new(0));
        manager
            .subscribe("suricata-output", counting_handler(&count))
            .wait()
            .await
            .unwrap();
        backend.fail("unlisten", "backend gone");

        let result = manager.unsubscribe_all().await;

        assert!(matches!(result, Err(Error::UnsubscribeFailed { .. })));
        assert_eq!(manager.active_count(), 0);
        assert!(manager.unsubscribe_all().await.is_ok());
    }
}
