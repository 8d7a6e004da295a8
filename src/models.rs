//! Data models shared by every stage of a watch run.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ProbeTemplate`]: A URL pattern plus the date format used to materialize it
//! - [`ProbeTarget`]: A template resolved against the run's reference date
//! - [`ProbeOutcome`]: What a probe learned about one target
//! - [`Discovery`]: A confirmed installer, ready to be announced and logged
//! - [`ChangelogEntryGroup`]: All discoveries recorded for one calendar date

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Date rendering schemes used by vendor URL conventions.
///
/// Different CDNs stamp their installers with differently shaped dates, so
/// each template carries its own format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum DateFormat {
    /// Two-digit year, e.g. `240305`.
    #[serde(rename = "YYMMDD")]
    YyMmDd,
    /// Four-digit year, e.g. `20240305`.
    #[serde(rename = "YYYYMMDD")]
    YyyyMmDd,
    /// ISO 8601 calendar date, e.g. `2024-03-05`.
    #[serde(rename = "YYYY-MM-DD")]
    IsoDate,
}

impl DateFormat {
    /// The `chrono` strftime pattern for this scheme.
    pub fn pattern(self) -> &'static str {
        match self {
            DateFormat::YyMmDd => "%y%m%d",
            DateFormat::YyyyMmDd => "%Y%m%d",
            DateFormat::IsoDate => "%Y-%m-%d",
        }
    }

    /// Render `date` using this scheme.
    pub fn render(self, date: NaiveDate) -> String {
        date.format(self.pattern()).to_string()
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateFormat::YyMmDd => write!(f, "YYMMDD"),
            DateFormat::YyyyMmDd => write!(f, "YYYYMMDD"),
            DateFormat::IsoDate => write!(f, "YYYY-MM-DD"),
        }
    }
}

/// A parametrized download URL.
///
/// `url` contains exactly one `{...}` placeholder which is replaced by the
/// reference date rendered with `date_format`. `label` is prepended to the
/// file name when announcing a discovery.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProbeTemplate {
    pub url: String,
    pub date_format: DateFormat,
    #[serde(default)]
    pub label: String,
}

impl ProbeTemplate {
    pub fn new(url: &str, date_format: DateFormat, label: &str) -> Self {
        Self {
            url: url.to_string(),
            date_format,
            label: label.to_string(),
        }
    }
}

/// A template resolved for a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    /// Fully resolved URL, no placeholder left.
    pub url: String,
    /// The date as it appears in `url`.
    pub date_token: String,
    pub label: String,
}

/// Result of probing one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The remote answered 200. `content_length` is the raw header value, if any.
    Found {
        url: String,
        date_token: String,
        label: String,
        content_length: Option<String>,
    },
    /// The remote gave a definitive negative answer.
    NotFound,
    /// Transport errors exhausted the retry budget, or the probe itself blew up.
    Failed { cause: String },
}

/// A confirmed, newly available installer.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    /// Label prefix followed by the URL's last path segment.
    pub filename: String,
    pub url: String,
    /// Size in GiB rounded to two decimals; zero when unknown.
    pub size_gb: f64,
}

/// One line of a dated changelog section.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangelogFile {
    pub filename: String,
    pub url: String,
    pub size_gb: f64,
}

impl From<&Discovery> for ChangelogFile {
    fn from(discovery: &Discovery) -> Self {
        Self {
            filename: discovery.filename.clone(),
            url: discovery.url.clone(),
            size_gb: discovery.size_gb,
        }
    }
}

/// Everything discovered on one calendar date, in discovery order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangelogEntryGroup {
    pub date: NaiveDate,
    pub files: Vec<ChangelogFile>,
}
