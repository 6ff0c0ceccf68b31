//! Offline replay of recorded channel traffic.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use meerkat_telemetry::{
    ActiveView, Backend, InMemoryBackend, MetricsFilter, MonitorConfig, MonitorCore, MonitorState,
};

/// One recorded payload.
#[derive(Debug, Deserialize)]
pub struct Record {
    pub channel: String,
    pub payload: Value,
}

/// Options for rendering the replayed state.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub view: ActiveView,
    pub filter: MetricsFilter,
    pub json: bool,
}

/// Parse a JSONL recording. Blank lines are skipped.
pub fn parse_records(content: &str) -> Result<Vec<Record>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("invalid record on line {}", index.saturating_add(1)))
        })
        .collect()
}

/// Load the configuration from a file, or from the environment.
pub fn load_config(path: Option<&Path>) -> Result<MonitorConfig> {
    match path {
        Some(path) => MonitorConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(MonitorConfig::from_env()),
    }
}

/// Run `records` through a fresh core and return its final state.
pub async fn replay(config: MonitorConfig, records: Vec<Record>) -> Result<Arc<MonitorState>> {
    let backend = InMemoryBackend::new_arc();
    let dyn_backend: Arc<dyn Backend> = backend.clone();
    let mut core = MonitorCore::start(config, dyn_backend)
        .await
        .context("failed to start monitor core")?;

    let total = records.len();
    let mut undelivered = 0usize;
    for record in records {
        if backend.emit(&record.channel, record.payload).await == 0 {
            undelivered = undelivered.saturating_add(1);
            debug!(channel = %record.channel, "no subscriber for channel");
        }
    }
    if undelivered > 0 {
        warn!(undelivered, "records on channels the core does not subscribe to");
    }

    core.shutdown()
        .await
        .context("failed to release subscriptions")?;
    info!(records = total, "replay complete");
    Ok(Arc::clone(core.state()))
}

/// Write the selected view of `state` to `out`.
pub fn render(state: &MonitorState, options: &RenderOptions, out: &mut impl Write) -> Result<()> {
    if options.json {
        let rows = match options.view {
            ActiveView::Output => {
                serde_json::to_value(state.engine_output().into_iter().collect::<Vec<_>>())?
            }
            ActiveView::Viewer => {
                serde_json::to_value(state.viewer_output().into_iter().collect::<Vec<_>>())?
            }
            ActiveView::Events => serde_json::to_value(state.event_rows())?,
            ActiveView::Alerts => serde_json::to_value(state.alert_rows())?,
            ActiveView::Metrics => serde_json::to_value(state.metric_rows(&options.filter))?,
        };
        writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?;
        return Ok(());
    }

    match options.view {
        ActiveView::Output => {
            for line in &state.engine_output() {
                writeln!(out, "{line}")?;
            }
        }
        ActiveView::Viewer => {
            for line in &state.viewer_output() {
                writeln!(out, "{line}")?;
            }
        }
        ActiveView::Events => {
            for row in state.event_rows() {
                writeln!(out, "{}  {}", row.timestamp, row.event_type)?;
            }
        }
        ActiveView::Alerts => {
            for row in state.alert_rows() {
                writeln!(
                    out,
                    "{}  [{}] {}",
                    row.timestamp,
                    row.severity_label(),
                    row.signature
                )?;
            }
        }
        ActiveView::Metrics => {
            for row in state.metric_rows(&options.filter) {
                writeln!(out, "{} = {}", row.key, row.value)?;
            }
        }
    }
    Ok(())
}
