//! Lifecycle owner of the monitor.
//!
//! [`MonitorCore::start`] subscribes every push channel, enumerates capture
//! interfaces and starts status polling. [`MonitorCore::shutdown`] detaches
//! all live inputs and leaves the buffered data in place.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::{Backend, Subject};
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::event::{output_text, parse_percent, SecurityEvent, UpdateNotification};
use crate::poller::{PollTarget, PollerHandle, StatusPoller};
use crate::progress::Transition;
use crate::scroll::{ActiveView, ScrollCoordinator, ViewSurface};
use crate::state::MonitorState;
use crate::subscription::{Established, SubscriptionManager};

/// The live-telemetry core.
pub struct MonitorCore {
    pub(crate) config: MonitorConfig,
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) state: Arc<MonitorState>,
    pub(crate) scroll: Arc<ScrollCoordinator>,
    subscriptions: SubscriptionManager,
    poller: Option<PollerHandle>,
    shut_down: bool,
}

impl MonitorCore {
    /// Start the core against `backend`.
    ///
    /// # Errors
    ///
    /// A refused subscription aborts start-up. Subscriptions that were
    /// already established are released before the error is returned.
    pub async fn start(config: MonitorConfig, backend: Arc<dyn Backend>) -> Result<Self> {
        config.validate()?;

        let state = Arc::new(MonitorState::new(&config));
        let scroll = Arc::new(ScrollCoordinator::new(config.scroll_defer));
        let mut subscriptions =
            SubscriptionManager::with_capacity(Arc::clone(&backend), config.listener_capacity);

        let pending = subscribe_channels(&mut subscriptions, &config, &state, &scroll);
        if let Err(err) = await_established(pending).await {
            warn!(error = %err, "start-up aborted; releasing established subscriptions");
            if let Err(release_err) = subscriptions.unsubscribe_all().await {
                warn!(error = %release_err, "release after failed start-up was incomplete");
            }
            return Err(err);
        }

        let mut core = Self {
            config,
            backend,
            state,
            scroll,
            subscriptions,
            poller: None,
            shut_down: false,
        };

        if let Err(err) = core.refresh_interfaces().await {
            debug!(error = %err, "continuing without interfaces");
        }

        let targets = [Subject::Engine, Subject::Viewer]
            .into_iter()
            .map(|subject| PollTarget::new(subject, core.state.status_cell(subject)))
            .collect();
        core.poller = Some(StatusPoller::spawn(
            Arc::clone(&core.backend),
            targets,
            core.config.poll_config(),
        ));

        info!(
            channels = core.subscriptions.active_count(),
            "monitor core started"
        );
        Ok(core)
    }

    /// Detach every live input.
    ///
    /// Polling stops, all subscriptions are released and confirmed, and
    /// pending scroll effects are dropped. Buffered data is left intact.
    /// Calling this again is a no-op.
    ///
    /// # Errors
    ///
    /// The first subscription release that failed. Every other input is
    /// still detached.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        if let Some(poller) = self.poller.take() {
            poller.stop().await;
        }
        let released = self.subscriptions.unsubscribe_all().await;
        self.scroll.detach();

        info!("monitor core shut down");
        released
    }

    #[must_use]
    pub const fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    #[must_use]
    pub fn state(&self) -> &Arc<MonitorState> {
        &self.state
    }

    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    #[must_use]
    pub fn scroll(&self) -> &Arc<ScrollCoordinator> {
        &self.scroll
    }

    /// Channels currently subscribed.
    #[must_use]
    pub fn channels(&self) -> Vec<&str> {
        self.subscriptions.channels()
    }

    #[must_use]
    pub fn active_view(&self) -> ActiveView {
        self.scroll.active_view()
    }

    pub fn set_active_view(&self, view: ActiveView) {
        self.scroll.set_active_view(view);
    }

    /// Mount the presentation surface of `view`.
    pub fn attach_surface(&self, view: ActiveView, surface: &Arc<dyn ViewSurface>) {
        self.scroll.attach(view, surface);
    }
}

impl Drop for MonitorCore {
    fn drop(&mut self) {
        if !self.shut_down {
            warn!("monitor core dropped without shutdown");
            self.scroll.detach();
        }
    }
}

/// Wire one handler per push channel.
fn subscribe_channels(
    subscriptions: &mut SubscriptionManager,
    config: &MonitorConfig,
    state: &Arc<MonitorState>,
    scroll: &Arc<ScrollCoordinator>,
) -> Vec<Established> {
    let channels = &config.channels;
    let mut pending = Vec::with_capacity(config.components.len().saturating_add(4));

    pending.push(subscriptions.subscribe(
        channels.engine_output.as_str(),
        output_handler(
            Arc::clone(state),
            Arc::clone(scroll),
            ActiveView::Output,
            |s: &MonitorState, line: String| s.append_engine_output(line),
        ),
    ));
    pending.push(subscriptions.subscribe(
        channels.engine_event.as_str(),
        event_handler(Arc::clone(state), Arc::clone(scroll)),
    ));
    pending.push(subscriptions.subscribe(
        channels.update_progress.as_str(),
        update_handler(Arc::clone(state), Arc::clone(scroll)),
    ));
    pending.push(subscriptions.subscribe(
        channels.viewer_output.as_str(),
        output_handler(
            Arc::clone(state),
            Arc::clone(scroll),
            ActiveView::Viewer,
            |s: &MonitorState, line: String| s.append_viewer_output(line),
        ),
    ));
    for component in &config.components {
        pending.push(subscriptions.subscribe(
            channels.download_progress(component),
            download_handler(Arc::clone(state), component.clone()),
        ));
    }
    pending
}

/// Wait for every registration, returning the first refusal.
async fn await_established(pending: Vec<Established>) -> Result<()> {
    let outcomes = join_all(pending.into_iter().map(|established| async move {
        let channel = established.channel().to_string();
        (channel, established.wait().await)
    }))
    .await;

    let mut first_error = None;
    for (channel, outcome) in outcomes {
        match outcome {
            Ok(id) => debug!(%channel, listener = %id, "channel ready"),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

fn output_handler(
    state: Arc<MonitorState>,
    scroll: Arc<ScrollCoordinator>,
    view: ActiveView,
    append: fn(&MonitorState, String),
) -> impl FnMut(Value) + Send + 'static {
    move |payload: Value| {
        append(&state, output_text(&payload));
        scroll.note_append(view);
    }
}

fn event_handler(
    state: Arc<MonitorState>,
    scroll: Arc<ScrollCoordinator>,
) -> impl FnMut(Value) + Send + 'static {
    move |payload: Value| {
        let event = state.record_event(SecurityEvent::from_value(payload));
        if event.is_stats() {
            return;
        }
        scroll.note_append(ActiveView::Events);
        if event.is_alert() {
            scroll.note_append(ActiveView::Alerts);
        }
    }
}

fn update_handler(
    state: Arc<MonitorState>,
    scroll: Arc<ScrollCoordinator>,
) -> impl FnMut(Value) + Send + 'static {
    move |payload: Value| {
        let Some(notification) = UpdateNotification::parse(&payload) else {
            debug!(%payload, "ignoring malformed update notification");
            return;
        };
        let mut transition = Transition::Ignored;
        state
            .update_tracker()
            .update(|tracker| transition = tracker.apply(notification));
        if let Transition::Finished { outcome, .. } = &transition {
            info!(?outcome, "rules update finished");
        }
        if let Some(line) = transition.log_line() {
            state.append_engine_output(line);
            scroll.note_append(ActiveView::Output);
        }
    }
}

fn download_handler(
    state: Arc<MonitorState>,
    component: String,
) -> impl FnMut(Value) + Send + 'static {
    move |payload: Value| {
        let Some(percent) = parse_percent(&payload) else {
            debug!(%component, %payload, "ignoring malformed download progress");
            return;
        };
        let mut applied = false;
        state
            .install_tracker()
            .update(|installs| applied = installs.progress(&component, percent));
        if !applied {
            debug!(%component, percent, "download progress with no install running");
        }
    }
}
