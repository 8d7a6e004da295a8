//! Turning probe reports into discoveries.
//!
//! Only [`ProbeOutcome::Found`] survives aggregation. Negative results are
//! dropped silently, failures are logged and dropped; neither stops the run.

use crate::models::{Discovery, ProbeOutcome};
use crate::prober::ProbeReport;
use tracing::{debug, error, info, instrument};
use url::Url;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Convert a raw `Content-Length` value to GiB, rounded to two decimals.
///
/// Missing, negative or non-numeric lengths yield `0.0`.
pub fn size_gb_from_length(content_length: Option<&str>) -> f64 {
    let bytes = content_length
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(0);
    ((bytes as f64 / BYTES_PER_GB) * 100.0).round() / 100.0
}

/// Render a size the way it is shown to humans: `1.0`, `3.22`, `0.5`.
pub fn format_size_gb(size_gb: f64) -> String {
    if size_gb.fract() == 0.0 {
        format!("{size_gb:.1}")
    } else {
        format!("{size_gb}")
    }
}

/// Last path segment of `url`, or the whole string if it has none.
pub fn basename(url: &str) -> String {
    let from_url = Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .filter(|segment| !segment.is_empty())
    });
    from_url.unwrap_or_else(|| {
        url.trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(url)
            .to_string()
    })
}

/// Build a [`Discovery`] from a found outcome; `None` for anything else.
pub fn to_discovery(outcome: &ProbeOutcome) -> Option<Discovery> {
    match outcome {
        ProbeOutcome::Found {
            url,
            label,
            content_length,
            ..
        } => Some(Discovery {
            filename: format!("{}{}", label, basename(url)),
            url: url.clone(),
            size_gb: size_gb_from_length(content_length.as_deref()),
        }),
        ProbeOutcome::NotFound | ProbeOutcome::Failed { .. } => None,
    }
}

/// Keep the discoveries, in report order.
#[instrument(level = "info", skip_all, fields(reports = reports.len()))]
pub fn collect_discoveries(reports: &[ProbeReport]) -> Vec<Discovery> {
    let mut not_found = 0usize;
    let mut failed = 0usize;
    let mut discoveries = Vec::new();

    for report in reports {
        match &report.outcome {
            ProbeOutcome::Found { date_token, .. } => {
                if let Some(discovery) = to_discovery(&report.outcome) {
                    debug!(filename = %discovery.filename, %date_token, size_gb = discovery.size_gb, "Discovery");
                    discoveries.push(discovery);
                }
            }
            ProbeOutcome::NotFound => not_found += 1,
            ProbeOutcome::Failed { cause } => {
                failed += 1;
                error!(attempts = report.attempts, %cause, "Excluding failed probe");
            }
        }
    }

    info!(
        found = discoveries.len(),
        not_found,
        failed,
        "Aggregated probe results"
    );
    discoveries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(url: &str, label: &str, length: Option<&str>) -> ProbeReport {
        ProbeReport {
            outcome: ProbeOutcome::Found {
                url: url.to_string(),
                date_token: "240305".to_string(),
                label: label.to_string(),
                content_length: length.map(str::to_string),
            },
            attempts: 1,
        }
    }

    #[test]
    fn test_size_computation() {
        assert_eq!(size_gb_from_length(Some("3221225472")), 3.0);
        assert_eq!(size_gb_from_length(Some("1073741824")), 1.0);
        assert_eq!(size_gb_from_length(Some("3457448673")), 3.22);
        assert_eq!(size_gb_from_length(None), 0.0);
        assert_eq!(size_gb_from_length(Some("abc")), 0.0);
        assert_eq!(size_gb_from_length(Some("-12")), 0.0);
        assert_eq!(size_gb_from_length(Some("")), 0.0);
    }

    #[test]
    fn test_format_size_gb() {
        assert_eq!(format_size_gb(1.0), "1.0");
        assert_eq!(format_size_gb(0.0), "0.0");
        assert_eq!(format_size_gb(3.22), "3.22");
        assert_eq!(format_size_gb(0.5), "0.5");
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("http://x/F_240305.exe"), "F_240305.exe");
        assert_eq!(
            basename("http://twcdn.gnjoy.com.tw/ragnarok/Client/RAGNAROK_20240305.exe"),
            "RAGNAROK_20240305.exe"
        );
        assert_eq!(basename("no-scheme/path/file.zip"), "file.zip");
    }

    #[test]
    fn test_to_discovery() {
        let report = found("http://x/F_240305.exe", "P_", Some("1073741824"));
        let discovery = to_discovery(&report.outcome).unwrap();
        assert_eq!(discovery.filename, "P_F_240305.exe");
        assert_eq!(discovery.url, "http://x/F_240305.exe");
        assert_eq!(discovery.size_gb, 1.0);
        assert!(to_discovery(&ProbeOutcome::NotFound).is_none());
    }

    #[test]
    fn test_collect_discoveries_filters_and_keeps_order() {
        let reports = vec![
            found("http://x/B.exe", "b_", Some("10")),
            ProbeReport {
                outcome: ProbeOutcome::NotFound,
                attempts: 1,
            },
            ProbeReport {
                outcome: ProbeOutcome::Failed {
                    cause: "connection refused".to_string(),
                },
                attempts: 5,
            },
            found("http://x/A.exe", "a_", None),
        ];

        let discoveries = collect_discoveries(&reports);
        assert_eq!(discoveries.len(), 2);
        assert_eq!(discoveries[0].filename, "b_B.exe");
        assert_eq!(discoveries[1].filename, "a_A.exe");
        assert_eq!(discoveries[1].size_gb, 0.0);
    }

    #[test]
    fn test_collect_discoveries_all_failed_is_empty() {
        let reports = vec![ProbeReport {
            outcome: ProbeOutcome::Failed {
                cause: "timeout".to_string(),
            },
            attempts: 5,
        }];
        assert!(collect_discoveries(&reports).is_empty());
    }
}
