//! Run configuration.
//!
//! A [`Config`] is assembled exactly once from the parsed [`Cli`] and then
//! passed by reference into every stage. Nothing in the crate reads the
//! environment or the clock after this point.

use crate::candidates::placeholder_count;
use crate::cli::Cli;
use crate::models::{DateFormat, ProbeTemplate};
use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Errors that make a run impossible before any probe is sent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read template file {path}: {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse template file {path}: {source}")]
    TemplateParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("template list is empty")]
    NoTemplates,
    #[error("template url {url} ({date_format}) must contain exactly one date placeholder, found {found}")]
    Placeholder {
        url: String,
        date_format: DateFormat,
        found: usize,
    },
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

/// How transport failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per target, including the first.
    pub max_attempts: usize,
    /// Fixed pause between two attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(10),
        }
    }
}

/// Immutable settings for one run.
#[derive(Debug, Clone)]
pub struct Config {
    /// The "today" every template is rendered against.
    pub reference_date: NaiveDate,
    pub templates: Vec<ProbeTemplate>,
    /// `None` means notifications are skipped.
    pub webhook_url: Option<String>,
    pub changelog_path: PathBuf,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub max_concurrency: usize,
    pub notify_timeout: Duration,
    pub dry_run: bool,
}

impl Config {
    /// A config with default policies, no webhook and the default changelog path.
    pub fn new(reference_date: NaiveDate, templates: Vec<ProbeTemplate>) -> Self {
        Self {
            reference_date,
            templates,
            webhook_url: None,
            changelog_path: PathBuf::from("README.md"),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
            max_concurrency: 8,
            notify_timeout: Duration::from_secs(10),
            dry_run: false,
        }
    }

    /// Build and validate the run configuration from command-line arguments.
    #[instrument(level = "info", skip_all)]
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let templates = match &cli.templates {
            Some(path) => load_templates(path)?,
            None => default_templates(),
        };
        validate_templates(&templates)?;

        for (name, value) in [
            ("max-attempts", cli.max_attempts as u64),
            ("timeout-secs", cli.timeout_secs),
            ("max-concurrency", cli.max_concurrency as u64),
            ("notify-timeout-secs", cli.notify_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { name });
            }
        }

        let webhook_url = cli
            .webhook_url
            .as_ref()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        if webhook_url.is_none() {
            warn!("DISCORD_WEBHOOK_URL is not set; discoveries will not be announced");
        }

        let reference_date = cli.date.unwrap_or_else(|| Local::now().date_naive());

        let config = Self {
            webhook_url,
            changelog_path: cli.changelog.clone(),
            retry: RetryPolicy {
                max_attempts: cli.max_attempts,
                delay: Duration::from_secs(cli.retry_delay_secs),
            },
            request_timeout: Duration::from_secs(cli.timeout_secs),
            max_concurrency: cli.max_concurrency,
            notify_timeout: Duration::from_secs(cli.notify_timeout_secs),
            dry_run: cli.dry_run,
            ..Self::new(reference_date, templates)
        };
        info!(
            date = %config.reference_date,
            templates = config.templates.len(),
            changelog = %config.changelog_path.display(),
            notifications = config.webhook_url.is_some(),
            dry_run = config.dry_run,
            "Configuration loaded"
        );
        Ok(config)
    }
}

/// The built-in table of tracked installers.
pub fn default_templates() -> Vec<ProbeTemplate> {
    vec![
        ProbeTemplate::new("http://rofull.gnjoy.com/ZERO_SETUP_{date}.exe", DateFormat::YyMmDd, "kROZ_"),
        ProbeTemplate::new("http://rofull.gnjoy.com/RagnarokZero_{date}.zip", DateFormat::YyMmDd, "kROZ_"),
        ProbeTemplate::new("http://rofull.gnjoy.com/RAG_SETUP_{date}.exe", DateFormat::YyMmDd, "kRO_"),
        ProbeTemplate::new("http://rofull.gnjoy.com/Ragnarok_{date}.zip", DateFormat::YyMmDd, "kRO_"),
        ProbeTemplate::new(
            "http://twcdn.gnjoy.com.tw/ragnarok/Client/RAGNAROK_{date}.exe",
            DateFormat::YyyyMmDd,
            "twRO_",
        ),
        ProbeTemplate::new(
            "http://twcdn.gnjoy.com.tw/ragnarok/Client/RO_Install_{date}.exe",
            DateFormat::YyMmDd,
            "twRO_",
        ),
        ProbeTemplate::new(
            "https://d364v3f2sbnp2e.cloudfront.net/RO_GGH_{date}.exe",
            DateFormat::IsoDate,
            "RO_GGH_",
        ),
    ]
}

/// Load a YAML template list from disk.
pub fn load_templates(path: &Path) -> Result<Vec<ProbeTemplate>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::TemplateRead {
        path: path.to_path_buf(),
        source,
    })?;
    let templates: Vec<ProbeTemplate> =
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::TemplateParse {
            path: path.to_path_buf(),
            source,
        })?;
    info!(path = %path.display(), count = templates.len(), "Loaded templates");
    Ok(templates)
}

/// Reject template sets that cannot be rendered.
pub fn validate_templates(templates: &[ProbeTemplate]) -> Result<(), ConfigError> {
    if templates.is_empty() {
        return Err(ConfigError::NoTemplates);
    }
    for template in templates {
        let found = placeholder_count(&template.url);
        if found != 1 {
            return Err(ConfigError::Placeholder {
                url: template.url.clone(),
                date_format: template.date_format,
                found,
            });
        }
    }
    Ok(())
}
