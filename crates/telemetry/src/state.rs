//! Shared monitor state.
//!
//! Every slot is a [`StateCell`] and every mutation is an append or a whole
//! value replacement under the slot's lock. Readers always see a complete
//! value, never a partially applied update.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use im::Vector;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::backend::Subject;
use crate::buffer::BoundedBuffer;
use crate::cell::StateCell;
use crate::config::MonitorConfig;
use crate::event::SecurityEvent;
use crate::interfaces::InterfaceList;
use crate::poller::StatusSnapshot;
use crate::progress::{InstallState, InstallTracker, UpdateProgress, UpdateStage, UpdateTracker};
use crate::views::{self, AlertRow, EventRow, MetricRow, MetricsFilter};

const NOTICE_CAPACITY: usize = 64;

/// Severity of an operator notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A one-shot message for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// All state owned by the monitor core.
pub struct MonitorState {
    engine_output: StateCell<BoundedBuffer<String>>,
    viewer_output: StateCell<BoundedBuffer<String>>,
    events: StateCell<BoundedBuffer<Arc<SecurityEvent>>>,
    latest_stats: StateCell<Option<Arc<SecurityEvent>>>,
    engine_status: Arc<StateCell<StatusSnapshot>>,
    viewer_status: Arc<StateCell<StatusSnapshot>>,
    update: StateCell<UpdateTracker>,
    installs: StateCell<InstallTracker>,
    interfaces: StateCell<InterfaceList>,
    notices: broadcast::Sender<Notice>,
}

impl MonitorState {
    #[must_use]
    pub fn new(config: &MonitorConfig) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            engine_output: StateCell::new(BoundedBuffer::with_capacity(config.output_capacity)),
            viewer_output: StateCell::new(BoundedBuffer::with_capacity(config.output_capacity)),
            events: StateCell::new(BoundedBuffer::with_capacity(config.event_capacity)),
            latest_stats: StateCell::new(None),
            engine_status: Arc::new(StateCell::default()),
            viewer_status: Arc::new(StateCell::default()),
            update: StateCell::default(),
            installs: StateCell::new(InstallTracker::new(config.components.iter().cloned())),
            interfaces: StateCell::default(),
            notices,
        }
    }

    // ---- engine and viewer output -------------------------------------

    pub fn append_engine_output(&self, line: impl Into<String>) {
        let line = line.into();
        self.engine_output.update(|buffer| buffer.push(line));
    }

    pub fn append_viewer_output(&self, line: impl Into<String>) {
        let line = line.into();
        self.viewer_output.update(|buffer| buffer.push(line));
    }

    #[must_use]
    pub fn engine_output(&self) -> Vector<String> {
        self.engine_output.read(BoundedBuffer::snapshot)
    }

    #[must_use]
    pub fn viewer_output(&self) -> Vector<String> {
        self.viewer_output.read(BoundedBuffer::snapshot)
    }

    /// Clear engine output and the event buffer ahead of an engine start.
    pub fn clear_engine_streams(&self) {
        self.engine_output.update(BoundedBuffer::clear);
        self.events.update(BoundedBuffer::clear);
    }

    pub fn clear_viewer_output(&self) {
        self.viewer_output.update(BoundedBuffer::clear);
    }

    // ---- security events ---------------------------------------------

    /// Buffer an event. Stats events also replace the latest snapshot.
    pub fn record_event(&self, event: SecurityEvent) -> Arc<SecurityEvent> {
        let event = Arc::new(event);
        if event.is_stats() {
            self.latest_stats.replace(Some(Arc::clone(&event)));
        }
        let buffered = Arc::clone(&event);
        self.events.update(|buffer| buffer.push(buffered));
        event
    }

    #[must_use]
    pub fn events(&self) -> Vector<Arc<SecurityEvent>> {
        self.events.read(BoundedBuffer::snapshot)
    }

    #[must_use]
    pub fn latest_stats(&self) -> Option<Arc<SecurityEvent>> {
        self.latest_stats.get()
    }

    #[must_use]
    pub fn event_rows(&self) -> Vec<EventRow> {
        self.events.read(|buffer| views::event_rows(buffer))
    }

    #[must_use]
    pub fn alert_rows(&self) -> Vec<AlertRow> {
        self.events.read(|buffer| views::alerts_view(buffer))
    }

    #[must_use]
    pub fn metric_rows(&self, filter: &MetricsFilter) -> Vec<MetricRow> {
        self.latest_stats
            .read(|snapshot| views::metrics_view(snapshot.as_deref(), filter))
    }

    // ---- running state -----------------------------------------------

    #[must_use]
    pub fn status_cell(&self, subject: Subject) -> Arc<StateCell<StatusSnapshot>> {
        match subject {
            Subject::Engine => Arc::clone(&self.engine_status),
            Subject::Viewer => Arc::clone(&self.viewer_status),
        }
    }

    #[must_use]
    pub fn status(&self, subject: Subject) -> StatusSnapshot {
        self.status_cell(subject).get()
    }

    #[must_use]
    pub fn is_running(&self, subject: Subject) -> bool {
        self.status_cell(subject).read(|status| status.running)
    }

    // ---- progress ----------------------------------------------------

    pub(crate) const fn update_tracker(&self) -> &StateCell<UpdateTracker> {
        &self.update
    }

    pub(crate) const fn install_tracker(&self) -> &StateCell<InstallTracker> {
        &self.installs
    }

    #[must_use]
    pub fn update_progress(&self) -> UpdateProgress {
        self.update.read(|tracker| tracker.progress().clone())
    }

    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.update.read(UpdateTracker::is_in_progress)
    }

    /// `Complete` or `Error` for the most recent finished update.
    #[must_use]
    pub fn last_update_outcome(&self) -> Option<UpdateStage> {
        self.update.read(UpdateTracker::last_outcome)
    }

    #[must_use]
    pub fn install_state(&self, component: &str) -> Option<InstallState> {
        self.installs.read(|installs| installs.state(component))
    }

    // ---- interfaces --------------------------------------------------

    pub(crate) const fn interface_cell(&self) -> &StateCell<InterfaceList> {
        &self.interfaces
    }

    #[must_use]
    pub fn interfaces(&self) -> InterfaceList {
        self.interfaces.get()
    }

    #[must_use]
    pub fn selected_interface(&self) -> Option<String> {
        self.interfaces
            .read(|list| list.selected().map(str::to_string))
    }

    // ---- notices -----------------------------------------------------

    /// Subscribe to operator notices sent from now on.
    #[must_use]
    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Publish a notice. Notices with no subscriber are only logged.
    pub fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NoticeLevel::Info => info!(%message, "notice"),
            NoticeLevel::Warning => warn!(%message, "notice"),
            NoticeLevel::Error => error!(%message, "notice"),
        }
        let notice = Notice {
            level,
            message,
            at: Utc::now(),
        };
        if self.notices.send(notice).is_err() {
            debug!("notice dropped: no subscribers");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;

    use super::*;

    fn small_state() -> MonitorState {
        MonitorState::new(
            &MonitorConfig::default()
                .with_output_capacity(2)
                .with_event_capacity(3),
        )
    }

    #[test]
    fn should_bound_output_buffers() {
        let state = small_state();
        for line in ["a", "b", "c"] {
            state.append_engine_output(line);
        }
        assert_eq!(state.engine_output(), Vector::from(vec!["b".to_string(), "c".to_string()]));
        assert!(state.viewer_output().is_empty());
    }

    #[test]
    fn should_replace_stats_snapshot_and_buffer_every_event() {
        let state = small_state();
        state.record_event(json!({"event_type": "stats", "stats": {"uptime": 1}}).into());
        state.record_event(json!({"event_type": "flow"}).into());
        state.record_event(json!({"event_type": "stats", "stats": {"uptime": 2}}).into());

        let latest = state.latest_stats().unwrap();
        assert_eq!(latest.field("stats.uptime"), Some(&json!(2)));
        assert_eq!(state.events().len(), 3);
        assert_eq!(state.event_rows().len(), 1);
    }

    #[test]
    fn should_keep_stats_snapshot_after_eviction() {
        let state = small_state();
        state.record_event(json!({"event_type": "stats", "stats": {"uptime": 9}}).into());
        for _ in 0..5 {
            state.record_event(json!({"event_type": "dns"}).into());
        }
        assert!(state.events().iter().all(|e| !e.is_stats()));
        assert!(state.latest_stats().is_some());
        assert_eq!(state.metric_rows(&MetricsFilter::default()).len(), 1);
    }

    #[test]
    fn should_clear_engine_streams_but_keep_viewer_output() {
        let state = small_state();
        state.append_engine_output("engine");
        state.append_viewer_output("viewer");
        state.record_event(json!({"event_type": "alert"}).into());

        state.clear_engine_streams();

        assert!(state.engine_output().is_empty());
        assert!(state.events().is_empty());
        assert_eq!(state.viewer_output().len(), 1);
    }

    #[test]
    fn should_broadcast_notices() {
        let state = small_state();
        let mut notices = state.subscribe_notices();
        state.notice(NoticeLevel::Error, "Failed to start Suricata");

        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, "Failed to start Suricata");
    }

    #[test]
    fn should_track_configured_components() {
        let state = small_state();
        assert_eq!(state.install_state("npcap"), Some(InstallState::default()));
        assert_eq!(state.install_state("wireshark"), None);
    }
}
