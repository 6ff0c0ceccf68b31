//! Scroll/attention coordination.
//!
//! When a buffer that is visible in the active view grows, the view's surface
//! should follow the newest entry. The scroll is deferred past the next render
//! pass and is best-effort: a surface that is not mounted is skipped.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::cell::StateCell;
use crate::error::{Error, Result};

/// Default delay before a scheduled scroll runs.
pub const DEFAULT_SCROLL_DEFER: Duration = Duration::from_millis(10);

/// Views the monitor can show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveView {
    #[default]
    Output,
    Events,
    Alerts,
    Metrics,
    Viewer,
}

impl ActiveView {
    pub const ALL: [Self; 5] = [
        Self::Output,
        Self::Events,
        Self::Alerts,
        Self::Metrics,
        Self::Viewer,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Output => "output",
            Self::Events => "events",
            Self::Alerts => "alerts",
            Self::Metrics => "metrics",
            Self::Viewer => "viewer",
        }
    }

    /// Whether the view follows its newest entry. Metrics is a table that is
    /// replaced, not appended to.
    #[must_use]
    pub const fn follows_tail(self) -> bool {
        !matches!(self, Self::Metrics)
    }
}

impl fmt::Display for ActiveView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActiveView {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|view| view.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::config(format!("unknown view '{s}'")))
    }
}

/// A presentation surface that can jump to its newest entry.
pub trait ViewSurface: Send + Sync {
    fn scroll_to_end(&self);
}

/// Schedules deferred scroll-to-end effects for the active view.
pub struct ScrollCoordinator {
    active: StateCell<ActiveView>,
    surfaces: Arc<Mutex<HashMap<ActiveView, Weak<dyn ViewSurface>>>>,
    defer: Duration,
    pending: Mutex<JoinSet<()>>,
    detached: Arc<AtomicBool>,
}

impl ScrollCoordinator {
    #[must_use]
    pub fn new(defer: Duration) -> Self {
        Self {
            active: StateCell::new(ActiveView::default()),
            surfaces: Arc::new(Mutex::new(HashMap::new())),
            defer,
            pending: Mutex::new(JoinSet::new()),
            detached: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mount `surface` for `view`. Only a weak reference is kept, so dropping
    /// the surface unmounts it.
    pub fn attach(&self, view: ActiveView, surface: &Arc<dyn ViewSurface>) {
        self.surfaces.lock().insert(view, Arc::downgrade(surface));
    }

    /// Unmount the surface for `view`.
    pub fn unmount(&self, view: ActiveView) {
        self.surfaces.lock().remove(&view);
    }

    #[must_use]
    pub fn active_view(&self) -> ActiveView {
        self.active.get()
    }

    /// Watch active-view changes.
    #[must_use]
    pub fn watch_active_view(&self) -> tokio::sync::watch::Receiver<ActiveView> {
        self.active.watch()
    }

    /// Switch views. Any view that follows its tail is scrolled to the end.
    pub fn set_active_view(&self, view: ActiveView) {
        let previous = self.active.replace(view);
        if previous != view {
            debug!(from = %previous, to = %view, "active view changed");
        }
        if view.follows_tail() {
            self.schedule(view);
        }
    }

    /// Note that a buffer shown by `view` grew.
    ///
    /// Returns whether a scroll was scheduled.
    pub fn note_append(&self, view: ActiveView) -> bool {
        if self.active.read(|active| *active != view) {
            return false;
        }
        self.schedule(view)
    }

    /// Stop all pending and future scroll effects. Idempotent.
    pub fn detach(&self) {
        if !self.detached.swap(true, Ordering::SeqCst) {
            let mut pending = self.pending.lock();
            let aborted = pending.len();
            pending.abort_all();
            debug!(aborted, "scroll coordinator detached");
        }
    }

    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    /// Scrolls scheduled but not yet run.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        let mut pending = self.pending.lock();
        while pending.try_join_next().is_some() {}
        pending.len()
    }

    fn schedule(&self, view: ActiveView) -> bool {
        if self.is_detached() {
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            trace!(%view, "no runtime; scroll skipped");
            return false;
        };

        let surfaces = Arc::clone(&self.surfaces);
        let detached = Arc::clone(&self.detached);
        let defer = self.defer;

        let mut pending = self.pending.lock();
        while pending.try_join_next().is_some() {}
        pending.spawn_on(
            async move {
                tokio::time::sleep(defer).await;
                if detached.load(Ordering::SeqCst) {
                    return;
                }
                let surface = surfaces.lock().get(&view).and_then(Weak::upgrade);
                match surface {
                    Some(surface) => surface.scroll_to_end(),
                    None => trace!(%view, "surface not mounted; scroll skipped"),
                }
            },
            &runtime,
        );
        true
    }
}

impl Default for ScrollCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_SCROLL_DEFER)
    }
}

impl Drop for ScrollCoordinator {
    fn drop(&mut self) {
        self.pending.get_mut().abort_all();
    }
}
