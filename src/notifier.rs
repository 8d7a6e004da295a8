//! Discovery announcements.
//!
//! Formatting the message is done here; delivery goes through the
//! [`Notifier`] trait so the webhook can be swapped out. Delivery is
//! fire-and-forget: each send is bounded by its own timeout, failures are
//! logged and the next discovery is attempted regardless.

use crate::aggregate::format_size_gb;
use crate::models::Discovery;
use reqwest::Client;
use serde::Serialize;
use std::error::Error;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

/// Trait for delivering a rendered message somewhere.
pub trait Notifier {
    async fn send(&self, message: &str) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Discord-compatible webhook payload.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Posts messages to a Discord webhook.
#[derive(Debug, Clone)]
pub struct DiscordWebhook {
    client: Client,
    url: String,
}

impl DiscordWebhook {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

impl Notifier for DiscordWebhook {
    #[instrument(level = "debug", skip_all)]
    async fn send(&self, message: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        let t0 = Instant::now();
        self.client
            .post(&self.url)
            .json(&WebhookPayload { content: message })
            .send()
            .await?
            .error_for_status()?;
        info!(elapsed_ms = t0.elapsed().as_millis() as u64, "Webhook delivered");
        Ok(())
    }
}

/// The three-field announcement for one discovery.
pub fn format_message(discovery: &Discovery) -> String {
    format!(
        "## Nuevo Official RO Setup:\n**🔸Nombre:** {}\n**🔸Tamaño:** {} GB\n**🔸Link:** {}\n",
        discovery.filename,
        format_size_gb(discovery.size_gb),
        discovery.url
    )
}

/// Announce every discovery in order. Returns how many deliveries succeeded.
#[instrument(level = "info", skip_all, fields(discoveries = discoveries.len()))]
pub async fn notify_all<N>(notifier: &N, discoveries: &[Discovery]) -> usize
where
    N: Notifier,
{
    let mut delivered = 0usize;
    for discovery in discoveries {
        let message = format_message(discovery);
        info!(filename = %discovery.filename, "Sending notification");
        match notifier.send(&message).await {
            Ok(()) => delivered += 1,
            Err(e) => error!(filename = %discovery.filename, error = %e, "Notification failed"),
        }
    }
    if delivered < discoveries.len() {
        warn!(
            delivered,
            failed = discoveries.len() - delivered,
            "Some notifications were not delivered"
        );
    }
    delivered
}
