//! Availability probing with fixed-delay retries.
//!
//! This module checks whether candidate installers exist without downloading
//! them. It mirrors the layering used for every remote call in the crate:
//!
//! - [`HeadProbe`]: Core trait, one metadata-only request per call
//! - [`HttpProbe`]: `reqwest` implementation issuing `HEAD` requests
//! - [`RetryingProbe`]: Decorator that turns raw responses into
//!   [`ProbeOutcome`]s and retries transport failures
//! - [`probe_all`]: Concurrent fan-out over every target of a run
//!
//! # Retry Strategy
//!
//! - Only transport failures (timeouts, refused/reset connections, other
//!   client errors) are retried
//! - A definitive non-200 status is a negative result and is never retried
//! - Attempts are separated by a fixed delay (10 seconds by default)
//! - After the budget is spent the target is reported as failed

use crate::config::RetryPolicy;
use crate::models::{ProbeOutcome, ProbeTarget};
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, StatusCode, redirect};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

const USER_AGENT: &str = concat!("setup_watch/", env!("CARGO_PKG_VERSION"));
const MAX_REDIRECTS: usize = 10;

/// Why a single request produced no HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Transport(String),
    /// The request could not even be built, e.g. an unparseable URL.
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl ProbeError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ProbeError::Invalid(_))
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            ProbeError::Invalid(e.to_string())
        } else if e.is_timeout() {
            ProbeError::Timeout(e.to_string())
        } else if e.is_connect() {
            ProbeError::Connect(e.to_string())
        } else {
            ProbeError::Transport(e.to_string())
        }
    }
}

/// The parts of a `HEAD` response the prober cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadResponse {
    pub status: u16,
    /// Raw `Content-Length` header value, untouched.
    pub content_length: Option<String>,
}

/// Trait for metadata-only existence checks.
///
/// Implementors issue exactly one request per call and never retry; retrying
/// is the job of [`RetryingProbe`].
pub trait HeadProbe {
    /// Request the headers of `url`, following redirects.
    async fn head(&self, url: &str) -> Result<HeadResponse, ProbeError>;
}

/// `HEAD` requests over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    /// Build a client whose connect and total timeouts are both `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client })
    }
}

impl HeadProbe for HttpProbe {
    #[instrument(level = "debug", skip(self))]
    async fn head(&self, url: &str) -> Result<HeadResponse, ProbeError> {
        let t0 = Instant::now();
        let response = self.client.head(url).send().await?;
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string());
        debug!(
            status = response.status().as_u16(),
            final_url = %response.url(),
            ?content_length,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "HEAD completed"
        );
        Ok(HeadResponse {
            status: response.status().as_u16(),
            content_length,
        })
    }
}

/// What probing one target produced, and how many requests it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub outcome: ProbeOutcome,
    pub attempts: usize,
}

/// Decorator that classifies responses and retries transport failures.
pub struct RetryingProbe<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> RetryingProbe<T>
where
    T: HeadProbe,
{
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Probe one target until a definitive answer or the retry budget runs out.
    #[instrument(level = "info", skip_all, fields(url = %target.url))]
    pub async fn probe(&self, target: &ProbeTarget) -> ProbeReport {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_cause = String::new();

        for attempt in 1..=max_attempts {
            match self.inner.head(&target.url).await {
                Ok(response) if response.status == StatusCode::OK.as_u16() => {
                    info!(attempt, content_length = ?response.content_length, "File found");
                    return ProbeReport {
                        outcome: ProbeOutcome::Found {
                            url: target.url.clone(),
                            date_token: target.date_token.clone(),
                            label: target.label.clone(),
                            content_length: response.content_length,
                        },
                        attempts: attempt,
                    };
                }
                Ok(response) => {
                    info!(attempt, status = response.status, "Not available");
                    return ProbeReport {
                        outcome: ProbeOutcome::NotFound,
                        attempts: attempt,
                    };
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        attempt,
                        max = max_attempts,
                        delay = ?self.policy.delay,
                        error = %e,
                        "Probe attempt failed"
                    );
                    last_cause = e.to_string();
                    if attempt < max_attempts {
                        sleep(self.policy.delay).await;
                    }
                }
                Err(e) => {
                    error!(attempt, error = %e, "Probe cannot be retried");
                    return ProbeReport {
                        outcome: ProbeOutcome::Failed { cause: e.to_string() },
                        attempts: attempt,
                    };
                }
            }
        }

        error!(attempts = max_attempts, cause = %last_cause, "Probe exhausted retries");
        ProbeReport {
            outcome: ProbeOutcome::Failed { cause: last_cause },
            attempts: max_attempts,
        }
    }
}

impl<T> fmt::Debug for RetryingProbe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingProbe")
            .field("max_attempts", &self.policy.max_attempts)
            .field("delay", &self.policy.delay)
            .finish()
    }
}

/// Probe every target concurrently and wait for all of them to settle.
///
/// Reports come back in target order. At most `max_concurrency` probes are in
/// flight at once. A probe that panics is reported as
/// [`ProbeOutcome::Failed`] for its own target; siblings are unaffected.
#[instrument(level = "info", skip_all, fields(targets = targets.len(), max_concurrency = max_concurrency))]
pub async fn probe_all<T>(
    prober: &RetryingProbe<T>,
    targets: &[ProbeTarget],
    max_concurrency: usize,
) -> Vec<ProbeReport>
where
    T: HeadProbe,
{
    let t0 = Instant::now();
    let mut indexed: Vec<(usize, ProbeReport)> = stream::iter(targets.iter().enumerate())
        .map(|(index, target)| async move {
            let report = match AssertUnwindSafe(prober.probe(target)).catch_unwind().await {
                Ok(report) => report,
                Err(panic) => {
                    let cause = panic_message(panic.as_ref());
                    error!(url = %target.url, %cause, "Probe task panicked");
                    ProbeReport {
                        outcome: ProbeOutcome::Failed {
                            cause: format!("probe panicked: {cause}"),
                        },
                        attempts: 0,
                    }
                }
            };
            (index, report)
        })
        .buffer_unordered(max_concurrency.max(1))
        .collect()
        .await;

    // completion order is arbitrary; restore target order
    indexed.sort_by_key(|(index, _)| *index);
    let reports: Vec<ProbeReport> = indexed.into_iter().map(|(_, report)| report).collect();

    info!(
        elapsed_ms = t0.elapsed().as_millis() as u64,
        total = reports.len(),
        "All probes settled"
    );
    reports
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn target(url: &str) -> ProbeTarget {
        ProbeTarget {
            url: url.to_string(),
            date_token: "240305".to_string(),
            label: "P_".to_string(),
        }
    }

    fn policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_secs(10),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let url = "http://x/F_240305.exe";
        let stub = ScriptedProbe::new().script(url, vec![timeout(), timeout(), ok(Some("42"))]);
        let prober = RetryingProbe::new(stub, policy(5));

        let started = tokio::time::Instant::now();
        let report = prober.probe(&target(url)).await;
        let waited = started.elapsed();

        assert_eq!(report.attempts, 3);
        assert_eq!(prober.inner.calls(), 3);
        assert!(matches!(
            report.outcome,
            ProbeOutcome::Found { ref content_length, .. } if content_length.as_deref() == Some("42")
        ));
        // two inter-attempt delays
        assert!(waited >= Duration::from_secs(20) && waited < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_exhausts_budget() {
        let url = "http://x/down.exe";
        let stub = ScriptedProbe::new().script(url, (0..5).map(|_| timeout()).collect());
        let prober = RetryingProbe::new(stub, policy(5));

        let started = tokio::time::Instant::now();
        let report = prober.probe(&target(url)).await;
        let waited = started.elapsed();

        assert_eq!(report.attempts, 5);
        assert_eq!(prober.inner.calls(), 5);
        match report.outcome {
            ProbeOutcome::Failed { cause } => assert!(cause.contains("timed out")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        // no sleep after the final attempt
        assert!(waited >= Duration::from_secs(40) && waited < Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_result_is_not_retried() {
        let url = "http://x/missing.exe";
        let stub = ScriptedProbe::new().script(url, vec![status(404), ok(None)]);
        let prober = RetryingProbe::new(stub, policy(5));

        let started = tokio::time::Instant::now();
        let report = prober.probe(&target(url)).await;

        assert_eq!(report.outcome, ProbeOutcome::NotFound);
        assert_eq!(report.attempts, 1);
        assert_eq!(prober.inner.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_invalid_request_is_not_retried() {
        let url = "not a url";
        let stub = ScriptedProbe::new().script(
            url,
            vec![Err(ProbeError::Invalid("relative URL without a base".to_string()))],
        );
        let prober = RetryingProbe::new(stub, policy(5));

        let report = prober.probe(&target(url)).await;

        assert_eq!(report.attempts, 1);
        assert!(matches!(report.outcome, ProbeOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_found_without_length() {
        let url = "http://x/F.exe";
        let stub = ScriptedProbe::new().script(url, vec![ok(None)]);
        let prober = RetryingProbe::new(stub, policy(5));

        let report = prober.probe(&target(url)).await;
        assert!(matches!(
            report.outcome,
            ProbeOutcome::Found { content_length: None, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_all_isolates_panics_and_keeps_order() {
        let stub = ScriptedProbe::new()
            .script("http://a/1.exe", vec![ok(Some("1073741824"))])
            .script("http://b/2.exe", vec![status(404)])
            .script("http://d/4.exe", vec![timeout(), ok(Some("5"))]);
        let prober = RetryingProbe::new(stub, policy(3));
        let targets = vec![
            target("http://a/1.exe"),
            target("http://b/2.exe"),
            target("http://c/3.exe"),
            target("http://d/4.exe"),
        ];

        let reports = probe_all(&prober, &targets, 8).await;

        assert_eq!(reports.len(), 4);
        assert!(matches!(&reports[0].outcome, ProbeOutcome::Found { url, .. } if url == "http://a/1.exe"));
        assert_eq!(reports[1].outcome, ProbeOutcome::NotFound);
        match &reports[2].outcome {
            ProbeOutcome::Failed { cause } => assert!(cause.contains("panicked")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(matches!(&reports[3].outcome, ProbeOutcome::Found { url, .. } if url == "http://d/4.exe"));
        assert_eq!(reports[3].attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_sleep_does_not_block_siblings() {
        let stub = ScriptedProbe::new()
            .script("http://slow/1.exe", vec![timeout(), timeout(), ok(None)])
            .script("http://fast/2.exe", vec![ok(None)]);
        let prober = RetryingProbe::new(stub, policy(3));
        let targets = vec![target("http://slow/1.exe"), target("http://fast/2.exe")];

        let started = tokio::time::Instant::now();
        let reports = probe_all(&prober, &targets, 8).await;

        assert!(reports.iter().all(|r| matches!(r.outcome, ProbeOutcome::Found { .. })));
        // only the slow target's two delays, not serialized behind anything
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_target_starts_while_first_is_backing_off() {
        let stub = ScriptedProbe::new()
            .script("http://slow/1.exe", vec![timeout(), timeout(), timeout(), timeout(), ok(None)])
            .script("http://fast/2.exe", vec![ok(None)])
            .script("http://queued/3.exe", vec![ok(Some("7"))]);
        let prober = RetryingProbe::new(stub, policy(5));
        let targets = vec![
            target("http://slow/1.exe"),
            target("http://fast/2.exe"),
            target("http://queued/3.exe"),
        ];

        let started = tokio::time::Instant::now();
        let reports = probe_all(&prober, &targets, 2).await;

        let queued_start = prober.inner.first_call("http://queued/3.exe").unwrap();
        assert!(queued_start - started < Duration::from_secs(1));
        assert_eq!(reports.len(), 3);
        assert!(matches!(&reports[0].outcome, ProbeOutcome::Found { url, .. } if url == "http://slow/1.exe"));
        assert_eq!(reports[0].attempts, 5);
        assert!(matches!(&reports[1].outcome, ProbeOutcome::Found { url, .. } if url == "http://fast/2.exe"));
        assert!(matches!(&reports[2].outcome, ProbeOutcome::Found { url, .. } if url == "http://queued/3.exe"));
    }

    #[test]
    fn test_error_classification() {
        assert!(ProbeError::Timeout("t".into()).is_transient());
        assert!(ProbeError::Connect("c".into()).is_transient());
        assert!(ProbeError::Transport("x".into()).is_transient());
        assert!(!ProbeError::Invalid("i".into()).is_transient());
    }

    #[test]
    fn test_http_probe_builds() {
        assert!(HttpProbe::new(Duration::from_secs(30)).is_ok());
    }
}
