//! Rules-update and component-install progress tracking.
//!
//! # Update state machine
//!
//! ```text
//! Idle ──begin──► Starting ──► Downloading ⇄ InfoAnnounced ──► Complete ──► Idle
//!                    │                                                      ▲
//!                    └──────────────── request failed ──► Error ────────────┘
//! ```
//!
//! `Complete` and `Error` are terminal: the tracker reports them once through
//! [`Transition::Finished`], keeps them as the last outcome, and returns the
//! progress record to `Idle`.
//!
//! Notifications are gated on an update being in progress, so anything that
//! arrives after completion or failure is dropped instead of resurrecting a
//! finished operation.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;
use ulid::Ulid;

use crate::error::{Error, Result};
use crate::event::UpdateNotification;

/// Prefix for every line the updater writes to the engine output.
pub const UPDATE_LOG_PREFIX: &str = "[Rules Update]";

/// Identifies one update operation.
pub type UpdateId = Ulid;

/// Stage of the rules-update state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStage {
    #[default]
    Idle,
    Starting,
    Downloading,
    #[serde(rename = "info")]
    InfoAnnounced,
    Complete,
    Error,
}

impl UpdateStage {
    /// `Complete` or `Error`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// Progress of the running update. Replaced as a whole on each transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateProgress {
    pub stage: UpdateStage,
    pub current_source: Option<u32>,
    pub total_sources: Option<u32>,
    pub current_url: Option<String>,
    pub bytes_downloaded: Option<u64>,
    pub bytes_total: Option<u64>,
    pub percent: u8,
}

impl UpdateProgress {
    /// Short status label: `"[2/3] 45%"`, or `"45%"` when counters are unknown.
    #[must_use]
    pub fn label(&self) -> String {
        match (self.current_source, self.total_sources) {
            (Some(current), Some(total)) if current > 0 && total > 0 => {
                format!("[{current}/{total}] {}%", self.percent)
            }
            _ => format!("{}%", self.percent),
        }
    }
}

/// Outcome of feeding the tracker an action or notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The notification belonged to no running update and was dropped.
    Ignored,
    /// Byte progress merged; nothing to log.
    Progressed,
    /// A line to append to the engine output; the update continues.
    Log(String),
    /// The update ended with `outcome`; append the line and return to idle.
    Finished { outcome: UpdateStage, line: String },
}

impl Transition {
    /// The output line this transition produces, if any.
    #[must_use]
    pub fn log_line(&self) -> Option<&str> {
        match self {
            Self::Log(line) | Self::Finished { line, .. } => Some(line),
            Self::Ignored | Self::Progressed => None,
        }
    }
}

/// Rules-update state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateTracker {
    progress: UpdateProgress,
    active: Option<UpdateId>,
    last_outcome: Option<UpdateStage>,
}

impl UpdateTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin an update.
    ///
    /// Returns the operation id and the line announcing the start.
    ///
    /// # Errors
    ///
    /// [`Error::UpdateInProgress`] if an update is already running; updates
    /// are not re-entrant.
    pub fn begin(&mut self) -> Result<(UpdateId, String)> {
        if self.active.is_some() {
            return Err(Error::UpdateInProgress);
        }
        let id = Ulid::new();
        self.active = Some(id);
        self.last_outcome = None;
        self.progress = UpdateProgress {
            stage: UpdateStage::Starting,
            ..UpdateProgress::default()
        };
        debug!(update = %id, "rules update started");
        Ok((id, format!("{UPDATE_LOG_PREFIX} Starting rules update...")))
    }

    /// Apply a backend notification.
    pub fn apply(&mut self, notification: UpdateNotification) -> Transition {
        let Some(id) = self.active else {
            debug!(?notification, "dropping update notification with no update in progress");
            return Transition::Ignored;
        };

        match notification {
            UpdateNotification::Download {
                progress,
                url,
                downloaded,
                total,
            } => {
                let Some(percent) = progress else {
                    return Transition::Ignored;
                };
                self.progress = UpdateProgress {
                    stage: UpdateStage::Downloading,
                    current_url: url,
                    bytes_downloaded: downloaded,
                    bytes_total: total,
                    percent: percent.min(100),
                    ..self.progress.clone()
                };
                Transition::Progressed
            }
            UpdateNotification::Info {
                message,
                current_source,
                total_sources,
                ..
            } => {
                let mut next = UpdateProgress {
                    stage: UpdateStage::InfoAnnounced,
                    ..self.progress.clone()
                };
                if current_source.is_some() {
                    next.current_source = current_source;
                    next.total_sources = total_sources.or(next.total_sources);
                }
                self.progress = next;
                Transition::Log(format!(
                    "{UPDATE_LOG_PREFIX} {}",
                    message.unwrap_or_default()
                ))
            }
            UpdateNotification::Complete { message } => {
                debug!(update = %id, "rules update complete");
                self.finish(UpdateStage::Complete);
                Transition::Finished {
                    outcome: UpdateStage::Complete,
                    line: format!("{UPDATE_LOG_PREFIX} {}", message.unwrap_or_default()),
                }
            }
        }
    }

    /// Record that the request for update `id` failed.
    ///
    /// A failure for an operation that already ended is ignored.
    pub fn fail(&mut self, id: UpdateId, reason: &str) -> Transition {
        if self.active != Some(id) {
            return Transition::Ignored;
        }
        debug!(update = %id, %reason, "rules update failed");
        self.finish(UpdateStage::Error);
        Transition::Finished {
            outcome: UpdateStage::Error,
            line: format!("{UPDATE_LOG_PREFIX} Error: {reason}"),
        }
    }

    #[must_use]
    pub const fn is_in_progress(&self) -> bool {
        self.active.is_some()
    }

    #[must_use]
    pub const fn active(&self) -> Option<UpdateId> {
        self.active
    }

    #[must_use]
    pub const fn progress(&self) -> &UpdateProgress {
        &self.progress
    }

    /// How the most recent update ended; cleared when a new one begins.
    #[must_use]
    pub const fn last_outcome(&self) -> Option<UpdateStage> {
        self.last_outcome
    }

    fn finish(&mut self, outcome: UpdateStage) {
        self.active = None;
        self.last_outcome = Some(outcome);
        self.progress = UpdateProgress::default();
    }
}

/// Install progress of one component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InstallState {
    pub installing: bool,
    pub percent: u8,
}

/// Install progress for every tracked component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallTracker {
    components: BTreeMap<String, InstallState>,
}

impl InstallTracker {
    /// Track the given components, all idle.
    pub fn new<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            components: components
                .into_iter()
                .map(|c| (c.into(), InstallState::default()))
                .collect(),
        }
    }

    /// Mark `component` as installing from 0%.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownComponent`] for an untracked component,
    /// [`Error::InstallInProgress`] if it is already installing.
    pub fn begin(&mut self, component: &str) -> Result<()> {
        let state = self
            .components
            .get_mut(component)
            .ok_or_else(|| Error::unknown_component(component))?;
        if state.installing {
            return Err(Error::install_in_progress(component));
        }
        *state = InstallState {
            installing: true,
            percent: 0,
        };
        Ok(())
    }

    /// Apply a download percentage. Returns `false` if no install is running.
    pub fn progress(&mut self, component: &str, percent: u8) -> bool {
        match self.components.get_mut(component) {
            Some(state) if state.installing => {
                state.percent = percent.min(100);
                true
            }
            _ => false,
        }
    }

    /// Return `component` to idle, whatever the outcome.
    pub fn finish(&mut self, component: &str) {
        if let Some(state) = self.components.get_mut(component) {
            *state = InstallState::default();
        }
    }

    #[must_use]
    pub fn state(&self, component: &str) -> Option<InstallState> {
        self.components.get(component).copied()
    }

    /// Tracked components in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, InstallState)> {
        self.components.iter().map(|(name, state)| (name.as_str(), *state))
    }
}
