//! Running-state reconciliation poller.
//!
//! Push notifications can go missing, so the running state of each monitored
//! subprocess is re-queried on a fixed interval. Every target gets its own
//! timer task: a stalled query for the engine never delays the viewer's next
//! tick. The first check fires immediately on start.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::{Backend, Subject};
use crate::cell::StateCell;
use crate::error::Error;

/// Default interval between checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default deadline for a single query.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(1500);

/// A failed poll, kept for observability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollFailure {
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// Last known running state of one subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Last successfully observed value; `false` until the first success.
    pub running: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<PollFailure>,
    pub consecutive_failures: u32,
}

impl StatusSnapshot {
    /// Record a successful query.
    pub fn record_success(&mut self, running: bool, at: DateTime<Utc>) {
        self.running = running;
        self.last_success = Some(at);
        self.consecutive_failures = 0;
    }

    /// Record a failed query. The running value is left as it was.
    pub fn record_failure(&mut self, reason: impl Into<String>, at: DateTime<Utc>) {
        self.last_failure = Some(PollFailure {
            at,
            reason: reason.into(),
        });
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Whether the value has not been confirmed within `max_age` of `now`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let Some(last) = self.last_success else {
            return true;
        };
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => now.signed_duration_since(last) > max_age,
            Err(_) => false,
        }
    }
}

/// Poll timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// One subprocess to poll and the slot its state lands in.
#[derive(Clone)]
pub struct PollTarget {
    pub subject: Subject,
    pub status: Arc<StateCell<StatusSnapshot>>,
}

impl PollTarget {
    #[must_use]
    pub fn new(subject: Subject, status: Arc<StateCell<StatusSnapshot>>) -> Self {
        Self { subject, status }
    }
}

/// Handle owning the poll tasks. Stopping it is the only way to end them.
pub struct PollerHandle {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl PollerHandle {
    /// Stop polling and wait for every task to exit.
    ///
    /// A query in flight is abandoned; no state is written once this returns.
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);
        for task in std::mem::take(&mut self.tasks) {
            if let Err(err) = task.await {
                warn!(error = %err, "poll task ended abnormally");
            }
        }
        info!("status polling stopped");
    }

    /// Whether every poll task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Status reconciliation poller.
pub struct StatusPoller;

impl StatusPoller {
    /// Start one independent poll loop per target.
    #[must_use]
    pub fn spawn(
        backend: Arc<dyn Backend>,
        targets: Vec<PollTarget>,
        config: PollConfig,
    ) -> PollerHandle {
        let (stop_tx, _) = watch::channel(false);
        let tasks = targets
            .into_iter()
            .map(|target| {
                tokio::spawn(poll_loop(
                    Arc::clone(&backend),
                    target,
                    config,
                    stop_tx.subscribe(),
                ))
            })
            .collect();

        info!(
            interval_ms = u64::try_from(config.interval.as_millis()).unwrap_or(u64::MAX),
            "status polling started"
        );
        PollerHandle { stop_tx, tasks }
    }
}

async fn poll_loop(
    backend: Arc<dyn Backend>,
    target: PollTarget,
    config: PollConfig,
    mut stop_rx: watch::Receiver<bool>,
) {
    // interval() rejects a zero period
    let mut ticker = tokio::time::interval(config.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let subject = target.subject;

    loop {
        if *stop_rx.borrow_and_update() {
            break;
        }

        tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let query = tokio::time::timeout(config.timeout, backend.is_running(subject));
        let outcome = tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    debug!(%subject, "abandoning in-flight status query");
                    break;
                }
                continue;
            }
            outcome = query => outcome,
        };

        let now = Utc::now();
        match outcome {
            Ok(Ok(running)) => {
                target.status.update(|status| status.record_success(running, now));
            }
            Ok(Err(err)) => record_failure(&target, &err, now),
            Err(_) => {
                let timeout_ms = u64::try_from(config.timeout.as_millis()).unwrap_or(u64::MAX);
                let err = Error::timeout(format!("is_running:{subject}"), timeout_ms);
                record_failure(&target, &err, now);
            }
        }
    }

    debug!(%subject, "poll loop exited");
}

fn record_failure(target: &PollTarget, err: &Error, now: DateTime<Utc>) {
    let mut failures = 0;
    target.status.update(|status| {
        status.record_failure(err.to_string(), now);
        failures = status.consecutive_failures;
    });
    warn!(
        subject = %target.subject,
        error = %err,
        consecutive_failures = failures,
        "status poll failed; keeping last known state"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;

    fn targets() -> (Vec<PollTarget>, Arc<StateCell<StatusSnapshot>>, Arc<StateCell<StatusSnapshot>>) {
        let engine = Arc::new(StateCell::default());
        let viewer = Arc::new(StateCell::default());
        (
            vec![
                PollTarget::new(Subject::Engine, Arc::clone(&engine)),
                PollTarget::new(Subject::Viewer, Arc::clone(&viewer)),
            ],
            engine,
            viewer,
        )
    }

    #[test]
    fn test_snapshot_failure_keeps_running_value() {
        let now = Utc::now();
        let mut snapshot = StatusSnapshot::default();
        snapshot.record_success(true, now);
        snapshot.record_failure("pipe closed", now);
        snapshot.record_failure("pipe closed", now);

        assert!(snapshot.running);
        assert_eq!(snapshot.consecutive_failures, 2);

        snapshot.record_success(false, now);
        assert!(!snapshot.running);
        assert_eq!(snapshot.consecutive_failures, 0);
    }

    #[test]
    fn test_snapshot_staleness() {
        let now = Utc::now();
        let mut snapshot = StatusSnapshot::default();
        assert!(snapshot.is_stale(now, Duration::from_secs(5)));

        snapshot.record_success(true, now - chrono::Duration::seconds(3));
        assert!(!snapshot.is_stale(now, Duration::from_secs(5)));
        assert!(snapshot.is_stale(now, Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_check_fires_immediately() {
        let backend = InMemoryBackend::new_arc();
        backend.set_running(Subject::Engine, true);
        let (targets, engine, _viewer) = targets();

        let handle = StatusPoller::spawn(backend.clone(), targets, PollConfig::default());
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(engine.get().running);
        assert_eq!(backend.call_count("is_running:engine"), 1);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_fixed_interval() {
        let backend = InMemoryBackend::new_arc();
        let (targets, engine, _viewer) = targets();

        let handle = StatusPoller::spawn(backend.clone(), targets, PollConfig::default());
        tokio::time::sleep(Duration::from_millis(4100)).await;

        assert_eq!(backend.call_count("is_running:engine"), 3);

        backend.set_running(Subject::Engine, true);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(engine.get().running);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_on_one_target_does_not_touch_the_other() {
        let backend = InMemoryBackend::new_arc();
        backend.set_running(Subject::Engine, true);
        backend.set_running(Subject::Viewer, true);
        let (targets, engine, viewer) = targets();

        let handle = StatusPoller::spawn(backend.clone(), targets, PollConfig::default());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(engine.get().running);

        backend.fail("is_running:engine", "pipe closed");
        backend.set_running(Subject::Viewer, false);
        tokio::time::sleep(Duration::from_secs(2)).await;

        let engine = engine.get();
        assert!(engine.running, "failed poll must keep the last known value");
        assert_eq!(engine.consecutive_failures, 1);
        assert!(!viewer.get().running);
        assert_eq!(viewer.get().consecutive_failures, 0);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_query_does_not_delay_other_target() {
        let backend = InMemoryBackend::new_arc();
        backend.delay("is_running:engine", Duration::from_secs(60));
        backend.set_running(Subject::Viewer, true);
        let (targets, engine, viewer) = targets();
        let config = PollConfig {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
        };

        let handle = StatusPoller::spawn(backend.clone(), targets, config);
        tokio::time::sleep(Duration::from_millis(4100)).await;

        assert_eq!(backend.call_count("is_running:engine"), 1);
        assert_eq!(backend.call_count("is_running:viewer"), 3);
        assert!(viewer.get().running);
        assert!(engine.get().last_success.is_none());
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_recorded_as_failure() {
        let backend = InMemoryBackend::new_arc();
        backend.delay("is_running:engine", Duration::from_secs(10));
        let (targets, engine, _viewer) = targets();

        let handle = StatusPoller::spawn(backend.clone(), targets, PollConfig::default());
        tokio::time::sleep(Duration::from_millis(1600)).await;

        let engine = engine.get();
        assert_eq!(engine.consecutive_failures, 1);
        assert!(engine
            .last_failure
            .is_some_and(|failure| failure.reason.contains("timed out")));
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_writes_after_stop() {
        let backend = InMemoryBackend::new_arc();
        backend.delay("is_running:engine", Duration::from_millis(500));
        backend.set_running(Subject::Engine, true);
        let (targets, engine, _viewer) = targets();

        let handle = StatusPoller::spawn(backend.clone(), targets, PollConfig::default());
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop().await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(engine.get().last_success.is_none());
        assert_eq!(backend.call_count("is_running:engine"), 1);
    }
}
