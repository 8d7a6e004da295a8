//! Command-line interface definitions for Setup Watch.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! All arguments can be provided via command-line flags or environment variables.

use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the Setup Watch application.
///
/// One invocation performs one run for one reference date. Scheduling is left
/// to an external trigger (cron, CI schedule, systemd timer).
///
/// # Examples
///
/// ```sh
/// # Probe today's candidates, announce to Discord, update README.md
/// DISCORD_WEBHOOK_URL=https://discord.com/api/webhooks/... setup_watch
///
/// # Re-check a past date without writing anything
/// setup_watch --date 2024-03-05 --dry-run
///
/// # Track a custom set of installers
/// setup_watch --templates ./templates.yaml --changelog ./CHANGELOG.md
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Discord webhook that receives one message per discovery
    #[arg(long, env = "DISCORD_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Markdown changelog that records every discovery by date
    #[arg(short, long, env = "SETUP_WATCH_CHANGELOG", default_value = "README.md")]
    pub changelog: PathBuf,

    /// Optional YAML file replacing the built-in template table
    #[arg(short, long, env = "SETUP_WATCH_TEMPLATES")]
    pub templates: Option<PathBuf>,

    /// Reference date (YYYY-MM-DD); defaults to today's local date
    #[arg(short, long)]
    pub date: Option<NaiveDate>,

    /// Attempts per URL before a transport failure is given up on
    #[arg(long, default_value_t = 5)]
    pub max_attempts: usize,

    /// Seconds to wait between two attempts on the same URL
    #[arg(long, default_value_t = 10)]
    pub retry_delay_secs: u64,

    /// Per-request timeout in seconds (connect and total)
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Maximum number of probes in flight at once
    #[arg(long, default_value_t = 8)]
    pub max_concurrency: usize,

    /// Timeout in seconds for each webhook delivery
    #[arg(long, default_value_t = 10)]
    pub notify_timeout_secs: u64,

    /// Probe and log only: do not write the changelog or send notifications
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(&[
            "setup_watch",
            "--changelog",
            "./CHANGELOG.md",
            "--date",
            "2024-03-05",
            "--dry-run",
        ]);

        assert_eq!(cli.changelog, PathBuf::from("./CHANGELOG.md"));
        assert_eq!(cli.date, NaiveDate::from_ymd_opt(2024, 3, 5));
        assert!(cli.dry_run);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(&[
            "setup_watch",
            "-c",
            "/tmp/log.md",
            "-t",
            "/tmp/templates.yaml",
            "-d",
            "2024-12-31",
        ]);

        assert_eq!(cli.changelog, PathBuf::from("/tmp/log.md"));
        assert_eq!(cli.templates, Some(PathBuf::from("/tmp/templates.yaml")));
        assert_eq!(cli.date, NaiveDate::from_ymd_opt(2024, 12, 31));
    }

    #[test]
    fn test_cli_retry_defaults() {
        let cli = Cli::parse_from(&["setup_watch", "--timeout-secs", "45"]);
        assert_eq!(cli.max_attempts, 5);
        assert_eq!(cli.retry_delay_secs, 10);
        assert_eq!(cli.timeout_secs, 45);
        assert_eq!(cli.max_concurrency, 8);
        assert_eq!(cli.notify_timeout_secs, 10);
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_cli_rejects_bad_date() {
        assert!(Cli::try_parse_from(&["setup_watch", "--date", "05/03/2024"]).is_err());
    }
}
