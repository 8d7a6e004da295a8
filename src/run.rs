//! One complete watch run.
//!
//! ```text
//! templates ──► generate_targets ──► probe_all (fan-out) ──► collect_discoveries
//!                                                                 │
//!                                             ┌───────────────────┴──────────────┐
//!                                             ▼                                  ▼
//!                                      update_changelog                     notify_all
//! ```
//!
//! The changelog and the notifications are independent: a failure to persist
//! the changelog is logged and the notifications still go out.

use crate::aggregate::collect_discoveries;
use crate::candidates::generate_targets;
use crate::changelog::{merge_document, read_changelog, update_changelog};
use crate::config::Config;
use crate::models::Discovery;
use crate::notifier::{DiscordWebhook, Notifier, notify_all};
use crate::prober::{HeadProbe, HttpProbe, RetryingProbe, probe_all};
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};

/// What a run did, for the final log line.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub targets: usize,
    pub discoveries: Vec<Discovery>,
    pub changelog_updated: bool,
    pub notified: usize,
}

/// Run against the real network using the configured HTTP clients.
pub async fn run(config: &Config) -> Result<RunSummary, Box<dyn Error + Send + Sync>> {
    let probe = HttpProbe::new(config.request_timeout)?;
    let webhook = match (&config.webhook_url, config.dry_run) {
        (Some(url), false) => Some(DiscordWebhook::new(url, config.notify_timeout)?),
        _ => None,
    };
    Ok(run_with(config, probe, webhook.as_ref()).await)
}

/// Run with explicit collaborators. Never fails; every stage guards itself.
#[instrument(level = "info", skip_all, fields(date = %config.reference_date))]
pub async fn run_with<P, N>(config: &Config, probe: P, notifier: Option<&N>) -> RunSummary
where
    P: HeadProbe,
    N: Notifier,
{
    info!("Starting setup check");

    let targets = generate_targets(&config.templates, config.reference_date);
    let prober = RetryingProbe::new(probe, config.retry);
    let reports = probe_all(&prober, &targets, config.max_concurrency).await;
    let discoveries = collect_discoveries(&reports);

    let changelog_updated = persist_changelog(config, &discoveries).await;

    let notified = if discoveries.is_empty() {
        0
    } else if config.dry_run {
        info!(count = discoveries.len(), "Dry run; not sending notifications");
        0
    } else if let Some(notifier) = notifier {
        notify_all(notifier, &discoveries).await
    } else {
        warn!(count = discoveries.len(), "No webhook configured; skipping notifications");
        0
    };

    RunSummary {
        targets: targets.len(),
        discoveries,
        changelog_updated,
        notified,
    }
}

async fn persist_changelog(config: &Config, discoveries: &[Discovery]) -> bool {
    let path = &config.changelog_path;
    if config.dry_run {
        match read_changelog(path).await {
            Ok(existing) => {
                let rendered = merge_document(existing.as_deref(), config.reference_date, discoveries);
                debug!(%rendered, "Dry run; changelog not written");
            }
            Err(e) => error!(path = %path.display(), error = %e, "Failed to read changelog"),
        }
        return false;
    }

    match update_changelog(path, config.reference_date, discoveries).await {
        Ok(()) => true,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to update changelog");
            false
        }
    }
}
