//! Operator commands.
//!
//! Each command is a request across the backend boundary. A failure is
//! published as a notice, the state it touched returns to its pre-attempt
//! value, and the error is handed back to the caller. Running state itself is
//! only ever written by the poller; a successful start or stop shows up on the
//! next poll.

use tracing::{debug, info};

use crate::backend::Subject;
use crate::error::{Error, Result};
use crate::interfaces::InterfaceList;
use crate::monitor::MonitorCore;
use crate::progress::Transition;
use crate::scroll::ActiveView;
use crate::state::NoticeLevel;

impl MonitorCore {
    /// Start the engine if it is stopped, stop it if it is running.
    ///
    /// Starting clears engine output and buffered events, starts the engine on
    /// the selected interface, then starts tailing its event log. Stopping
    /// reverses the two steps.
    ///
    /// # Errors
    ///
    /// [`Error::NoInterfaceSelected`] when starting without a selection, or
    /// the backend failure of whichever step failed.
    pub async fn toggle_engine(&self) -> Result<String> {
        if self.state.is_running(Subject::Engine) {
            info!("stopping engine");
            let ack = self
                .backend
                .stop_engine()
                .await
                .map_err(|err| self.report("stop engine", err))?;
            self.backend
                .stop_event_tail()
                .await
                .map_err(|err| self.report("stop engine", err))?;
            return Ok(ack);
        }

        let Some(interface) = self.state.selected_interface() else {
            return Err(self.report("start engine", Error::NoInterfaceSelected));
        };
        info!(%interface, "starting engine");
        self.state.clear_engine_streams();
        let ack = self
            .backend
            .start_engine(&interface)
            .await
            .map_err(|err| self.report("start engine", err))?;
        self.backend
            .start_event_tail()
            .await
            .map_err(|err| self.report("start engine", err))?;
        Ok(ack)
    }

    /// Open the viewer if it is running, otherwise start it.
    ///
    /// # Errors
    ///
    /// The backend failure of the open or start request.
    pub async fn toggle_viewer(&self) -> Result<String> {
        if self.state.is_running(Subject::Viewer) {
            return self
                .backend
                .open_viewer()
                .await
                .map_err(|err| self.report("open viewer", err));
        }

        info!("starting viewer");
        self.state.clear_viewer_output();
        self.backend
            .start_viewer()
            .await
            .map_err(|err| self.report("start viewer", err))
    }

    /// Stop the viewer.
    ///
    /// # Errors
    ///
    /// The backend failure of the stop request.
    pub async fn stop_viewer(&self) -> Result<String> {
        info!("stopping viewer");
        self.backend
            .stop_viewer()
            .await
            .map_err(|err| self.report("stop viewer", err))
    }

    /// Install `component`. Download progress arrives on the component's
    /// progress channel while the request is outstanding.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownComponent`], [`Error::InstallInProgress`], or the
    /// backend failure. The install state is idle again in every case.
    pub async fn install(&self, component: &str) -> Result<String> {
        let mut begun = Ok(());
        self.state
            .install_tracker()
            .update(|installs| begun = installs.begin(component));
        if let Err(err) = begun {
            let action = format!("install {component}");
            return Err(self.report_as(NoticeLevel::Warning, &action, err));
        }

        info!(%component, "install started");
        let outcome = self.backend.install(component).await;
        self.state
            .install_tracker()
            .update(|installs| installs.finish(component));

        outcome.map_err(|err| self.report(&format!("install {component}"), err))
    }

    /// Trigger a rules update and switch to the output view.
    ///
    /// Progress is reported on the update channel. Only one update runs at a
    /// time.
    ///
    /// # Errors
    ///
    /// [`Error::UpdateInProgress`] while another update runs (no request is
    /// made), or the failure of the update request itself.
    pub async fn update_rules(&self) -> Result<String> {
        self.scroll.set_active_view(ActiveView::Output);

        let mut begun = Err(Error::UpdateInProgress);
        self.state
            .update_tracker()
            .update(|tracker| begun = tracker.begin());
        let (id, line) = match begun {
            Ok(started) => started,
            Err(err) => return Err(self.report_as(NoticeLevel::Warning, "update rules", err)),
        };
        self.append_output(line);

        match self.backend.update_rules().await {
            Ok(ack) => {
                debug!(update = %id, %ack, "update request accepted");
                Ok(ack)
            }
            Err(err) => {
                let reason = err.to_string();
                let mut transition = Transition::Ignored;
                self.state
                    .update_tracker()
                    .update(|tracker| transition = tracker.fail(id, &reason));
                if let Some(line) = transition.log_line() {
                    self.append_output(line);
                }
                Err(self.report("update rules", err))
            }
        }
    }

    /// Re-enumerate capture interfaces.
    ///
    /// The current selection is kept if it is still usable; otherwise the
    /// first usable interface is selected. Returns the number of interfaces.
    ///
    /// # Errors
    ///
    /// The backend failure; the previous list is kept.
    pub async fn refresh_interfaces(&self) -> Result<usize> {
        let raw = self
            .backend
            .list_interfaces()
            .await
            .map_err(|err| self.report("list network interfaces", err))?;

        let previous = self.state.selected_interface();
        let mut list = InterfaceList::from_raw(&raw);
        if let Some(previous) = previous {
            list.select(&previous);
        }
        info!(
            count = raw.len(),
            selected = list.selected().unwrap_or("none"),
            "interfaces enumerated"
        );
        self.state.interface_cell().replace(list);
        Ok(raw.len())
    }

    /// Select a capture interface by raw descriptor or name.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownInterface`] if no usable interface matches.
    pub fn select_interface(&self, key: &str) -> Result<()> {
        let mut selected = false;
        self.state
            .interface_cell()
            .update(|list| selected = list.select(key));
        if selected {
            Ok(())
        } else {
            Err(Error::unknown_interface(key))
        }
    }

    fn append_output(&self, line: impl Into<String>) {
        self.state.append_engine_output(line);
        self.scroll.note_append(ActiveView::Output);
    }

    fn report(&self, action: &str, err: Error) -> Error {
        self.report_as(NoticeLevel::Error, action, err)
    }

    fn report_as(&self, level: NoticeLevel, action: &str, err: Error) -> Error {
        self.state.notice(level, format!("Failed to {action}: {err}"));
        err
    }
}
