//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use meerkat_telemetry::ActiveView;

/// Meerkat - IDS monitor telemetry core
#[derive(Parser, Debug)]
#[command(name = "meerkat")]
#[command(version)]
#[command(about = "Replay and inspect IDS telemetry through the monitor core")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Feed recorded channel payloads through the core and print a view
    Replay {
        /// JSONL file of `{"channel": ..., "payload": ...}` records
        file: PathBuf,

        /// Configuration file (.json or .toml); defaults come from the environment
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// View to print
        #[arg(short, long, value_enum, default_value_t = ViewArg::Events)]
        view: ViewArg,

        /// Case-insensitive key filter for the metrics view
        #[arg(long, default_value = "")]
        key_filter: String,

        /// Hide zero-valued metrics
        #[arg(long, default_value_t = false)]
        hide_zero: bool,

        /// Print rows as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewArg {
    Output,
    Events,
    Alerts,
    Metrics,
    Viewer,
}

impl From<ViewArg> for ActiveView {
    fn from(view: ViewArg) -> Self {
        match view {
            ViewArg::Output => Self::Output,
            ViewArg::Events => Self::Events,
            ViewArg::Alerts => Self::Alerts,
            ViewArg::Metrics => Self::Metrics,
            ViewArg::Viewer => Self::Viewer,
        }
    }
}
