//! Candidate generation: expanding templates into concrete probe targets.
//!
//! Each [`ProbeTemplate`] carries a URL with a single `{...}` placeholder.
//! The placeholder name is free-form (`{date}`, `{d}`, `{date_str}` all work);
//! it is replaced with the reference date rendered in the template's own
//! [`DateFormat`](crate::models::DateFormat).
//!
//! Generation is pure: no I/O and no error path. Templates are validated once
//! when the [`Config`](crate::config::Config) is built.

use crate::models::{ProbeTarget, ProbeTemplate};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[A-Za-z_][A-Za-z0-9_]*\}").expect("placeholder regex is valid"));

/// Number of date placeholders in a URL pattern.
pub fn placeholder_count(pattern: &str) -> usize {
    PLACEHOLDER.find_iter(pattern).count()
}

/// Resolve one template against `date`.
pub fn render_template(template: &ProbeTemplate, date: NaiveDate) -> ProbeTarget {
    let date_token = template.date_format.render(date);
    let url = PLACEHOLDER
        .replace(&template.url, regex::NoExpand(&date_token))
        .into_owned();

    ProbeTarget {
        url,
        date_token,
        label: template.label.clone(),
    }
}

/// Produce one [`ProbeTarget`] per template, in template order.
#[instrument(level = "debug", skip(templates), fields(templates = templates.len()))]
pub fn generate_targets(templates: &[ProbeTemplate], date: NaiveDate) -> Vec<ProbeTarget> {
    let targets: Vec<ProbeTarget> = templates
        .iter()
        .map(|template| render_template(template, date))
        .collect();
    debug!(urls = ?targets.iter().map(|t| &t.url).collect::<Vec<_>>(), "Generated probe targets");
    targets
}
