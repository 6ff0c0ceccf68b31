//! # Meerkat - telemetry replay CLI
//!
//! Drives the monitor core headlessly: recorded channel traffic is fed
//! through an in-memory backend, the core is shut down, and one derived view
//! is printed.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;
mod replay;

use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use meerkat_telemetry::MetricsFilter;

use crate::cli::{Cli, Commands};
use crate::replay::RenderOptions;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Replay {
            file,
            config,
            view,
            key_filter,
            hide_zero,
            json,
        } => {
            let config = replay::load_config(config.as_deref())?;
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let records = replay::parse_records(&content)?;
            info!(file = %file.display(), records = records.len(), "replaying recording");

            let state = replay::replay(config, records).await?;

            let options = RenderOptions {
                view: view.into(),
                filter: MetricsFilter::new(key_filter, hide_zero),
                json,
            };
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            replay::render(&state, &options, &mut out)?;
            out.flush().context("failed to write output")?;
        }
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
