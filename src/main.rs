//! # Setup Watch
//!
//! A daily watcher that detects when a new official game client installer is
//! published on a vendor CDN, announces it to a Discord webhook and records
//! it in a markdown changelog.
//!
//! ## Features
//!
//! - Expands a table of date-stamped URL templates against today's date
//! - Probes every candidate concurrently with `HEAD` requests, retrying
//!   transport failures with a fixed delay
//! - Tolerates any subset of probes failing without aborting the run
//! - Announces each discovery (name, size, link) to a webhook
//! - Merges discoveries into a changelog grouped by date, newest first
//!
//! ## Usage
//!
//! ```sh
//! DISCORD_WEBHOOK_URL=https://discord.com/api/webhooks/... setup_watch --changelog README.md
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Generation**: Render each template for the reference date
//! 2. **Probing**: Check every candidate URL concurrently
//! 3. **Aggregation**: Keep only confirmed files, in template order
//! 4. **Output**: Update the changelog and send notifications, independently

use clap::Parser;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod aggregate;
mod candidates;
mod changelog;
mod cli;
mod config;
mod models;
mod notifier;
mod prober;
mod run;

use cli::Cli;
use config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("setup_watch starting up");

    let args = Cli::parse();
    debug!(changelog = ?args.changelog, templates = ?args.templates, date = ?args.date, dry_run = args.dry_run, "Parsed CLI arguments");

    let config = match Config::from_cli(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let outcome = AssertUnwindSafe(run::run(&config)).catch_unwind().await;
    let elapsed = start_time.elapsed();

    match outcome {
        Ok(Ok(summary)) => {
            info!(
                ?elapsed,
                targets = summary.targets,
                discoveries = summary.discoveries.len(),
                changelog_updated = summary.changelog_updated,
                notified = summary.notified,
                "Execution complete"
            );
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!(?elapsed, error = %e, "Run failed");
            ExitCode::FAILURE
        }
        Err(_) => {
            error!(?elapsed, "Run aborted by an unexpected panic");
            ExitCode::FAILURE
        }
    }
}
