//! Live-telemetry synchronization core of the Meerkat IDS monitor.
//!
//! The core sits between a supervision backend (which runs the detection
//! engine and the event viewer) and a presentation layer. Key pieces:
//!
//! - **Buffers**: bounded, ordered stream buffers for output lines and events
//! - **Subscriptions**: one pump task per push channel, released exactly once
//! - **Poller**: independent running-state checks per subprocess
//! - **Progress**: rules-update state machine and per-component install state
//! - **Views**: pure projections (events, alerts, flattened metrics)
//! - **Scroll**: deferred scroll-to-end for the active view
//!
//! Data flows one way: backend, subscriptions, state, views. The poller feeds
//! its own status slots.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use meerkat_telemetry::{InMemoryBackend, MonitorConfig, MonitorCore};
//!
//! #[tokio::main]
//! async fn main() -> meerkat_telemetry::Result<()> {
//!     let backend = InMemoryBackend::new_arc();
//!     let mut core = MonitorCore::start(MonitorConfig::default(), backend.clone()).await?;
//!
//!     backend
//!         .emit("eve-json-event", serde_json::json!({"event_type": "alert"}))
//!         .await;
//!
//!     core.shutdown().await?;
//!     println!("{} alerts", core.state().alert_rows().len());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod backend;
pub mod buffer;
pub mod cell;
mod commands;
pub mod config;
pub mod error;
pub mod event;
pub mod interfaces;
pub mod monitor;
pub mod poller;
pub mod progress;
pub mod scroll;
pub mod state;
pub mod subscription;
pub mod views;

// Re-export main types
pub use backend::{Backend, InMemoryBackend, Listener, ListenerId, Subject};
pub use buffer::{BoundedBuffer, EVENT_CAPACITY, OUTPUT_CAPACITY};
pub use cell::StateCell;
pub use config::{ChannelNames, MonitorConfig};
pub use error::{Error, Result};
pub use event::{output_text, parse_percent, EventKind, SecurityEvent, UpdateNotification};
pub use interfaces::{InterfaceDescriptor, InterfaceList};
pub use monitor::MonitorCore;
pub use poller::{PollConfig, PollTarget, PollerHandle, StatusPoller, StatusSnapshot};
pub use progress::{
    InstallState, InstallTracker, Transition, UpdateId, UpdateProgress, UpdateStage,
    UpdateTracker,
};
pub use scroll::{ActiveView, ScrollCoordinator, ViewSurface};
pub use state::{MonitorState, Notice, NoticeLevel};
pub use subscription::{ChannelHandler, Established, SubscriptionManager};
pub use views::{
    alerts_view, event_rows, events_view, flatten, format_bytes, metrics_view, AlertRow,
    EventRow, MetricRow, MetricValue, MetricsFilter,
};
