//! Markdown changelog of every discovery, grouped by date.
//!
//! The changelog is a plain UTF-8 markdown file: a fixed header followed by
//! one `### YYYY-MM-DD` section per date, newest first, each listing its files
//! as bullets.
//!
//! ```text
//! ## Setups Encontrados 📦
//!
//! ### 2024-03-06
//! - [kRO_RAG_SETUP_240306.exe](http://rofull.gnjoy.com/RAG_SETUP_240306.exe) (3.22 GB)
//!
//! ### 2024-03-01
//! - [twRO_RO_Install_240301.exe](http://twcdn.gnjoy.com.tw/ragnarok/Client/RO_Install_240301.exe) (2.9 GB)
//! ```
//!
//! # Merge semantics
//!
//! Every run re-parses the whole file, merges today's discoveries in and
//! re-renders it from scratch. Sections for the same date are folded into a
//! single section (existing files first, new ones after), and a file name is
//! recorded at most once per date. Lines that do not look like a dated
//! heading or a file bullet are dropped on re-render.
//!
//! File names are written with `\`, `[` and `]` backslash-escaped; the URL
//! is everything between `](` and the trailing `) (<size> GB)`.

use crate::aggregate::format_size_gb;
use crate::models::{ChangelogEntryGroup, ChangelogFile, Discovery};
use chrono::NaiveDate;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::Write;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, info, instrument};

/// Static boilerplate at the top of the changelog.
pub const HEADER: &str = "# RO Setup Checker

Revisión diaria de los servidores oficiales de Ragnarok Online en busca de nuevos instaladores.

## Setups Encontrados 📦
";

static BULLET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*[-*]\s+\[(?P<name>(?:\\.|[^\\\]])+)\]\((?P<url>.+)\)\s*\((?P<size>\d+(?:\.\d+)?)\s*GB\)\s*$",
    )
    .expect("bullet regex is valid")
});

/// Parsed changelog body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changelog {
    pub groups: Vec<ChangelogEntryGroup>,
}

impl Changelog {
    /// Recover dated groups from a rendered document.
    ///
    /// Tolerant by construction: headings with an unparseable date start a
    /// section whose bullets are ignored, any other heading ends the current
    /// section, and non-bullet lines are skipped. Groups with no files are
    /// not kept.
    pub fn parse(text: &str) -> Self {
        let mut groups = Vec::new();
        let mut current: Option<ChangelogEntryGroup> = None;

        for line in text.lines() {
            let line = line.trim_end();

            if let Some(heading) = line.strip_prefix("### ") {
                flush(&mut groups, current.take());
                match NaiveDate::parse_from_str(heading.trim(), "%Y-%m-%d") {
                    Ok(date) => {
                        current = Some(ChangelogEntryGroup {
                            date,
                            files: Vec::new(),
                        })
                    }
                    Err(e) => debug!(%heading, error = %e, "Skipping section with unparseable date"),
                }
            } else if line.starts_with('#') {
                flush(&mut groups, current.take());
            } else if let Some(caps) = BULLET.captures(line) {
                let Some(group) = current.as_mut() else {
                    debug!(%line, "Skipping bullet outside a dated section");
                    continue;
                };
                let size_gb = caps["size"].parse::<f64>().unwrap_or(0.0);
                group.files.push(ChangelogFile {
                    filename: unescape_link_text(&caps["name"]),
                    url: caps["url"].to_string(),
                    size_gb,
                });
            } else if !line.trim().is_empty() {
                debug!(%line, "Skipping unrecognized changelog line");
            }
        }
        flush(&mut groups, current);

        Self { groups }
    }

    /// Fold `discoveries` into the group for `date`, then normalize.
    ///
    /// Returns how many files were actually added.
    pub fn merge(&mut self, date: NaiveDate, discoveries: &[Discovery]) -> usize {
        let before = self.file_count();
        if !discoveries.is_empty() {
            self.groups.push(ChangelogEntryGroup {
                date,
                files: discoveries.iter().map(ChangelogFile::from).collect(),
            });
        }
        self.normalize();
        self.file_count().saturating_sub(before)
    }

    /// Coalesce same-date groups, drop repeated file names within a date and
    /// sort newest first. Groups keep their relative order on equal dates.
    fn normalize(&mut self) {
        let mut merged: Vec<ChangelogEntryGroup> = Vec::with_capacity(self.groups.len());
        for group in self.groups.drain(..) {
            match merged.iter_mut().find(|g| g.date == group.date) {
                Some(existing) => existing.files.extend(group.files),
                None => merged.push(group),
            }
        }
        for group in &mut merged {
            group.files = std::mem::take(&mut group.files)
                .into_iter()
                .unique_by(|f| f.filename.clone())
                .collect();
        }
        merged.sort_by(|a, b| b.date.cmp(&a.date));
        self.groups = merged;
    }

    pub fn file_count(&self) -> usize {
        self.groups.iter().map(|g| g.files.len()).sum()
    }

    /// Render header plus every group, deterministically.
    pub fn render(&self) -> String {
        let mut out = String::from(HEADER);
        for group in &self.groups {
            writeln!(out).unwrap();
            writeln!(out, "### {}", group.date.format("%Y-%m-%d")).unwrap();
            for file in &group.files {
                writeln!(
                    out,
                    "- [{}]({}) ({} GB)",
                    escape_link_text(&file.filename),
                    file.url,
                    format_size_gb(file.size_gb)
                )
                .unwrap();
            }
        }
        out
    }
}

/// Backslash-escape `\`, `[` and `]` so a file name cannot close the link text.
fn escape_link_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unescape_link_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

fn flush(groups: &mut Vec<ChangelogEntryGroup>, group: Option<ChangelogEntryGroup>) {
    if let Some(group) = group.filter(|g| !g.files.is_empty()) {
        groups.push(group);
    }
}

/// Merge today's discoveries into an existing document (or a fresh one).
pub fn merge_document(existing: Option<&str>, date: NaiveDate, discoveries: &[Discovery]) -> String {
    let mut changelog = existing.map(Changelog::parse).unwrap_or_default();
    let added = changelog.merge(date, discoveries);
    debug!(added, groups = changelog.groups.len(), "Merged changelog");
    changelog.render()
}

/// Read the changelog; a missing file is `Ok(None)`.
pub async fn read_changelog(path: &Path) -> Result<Option<String>, Box<dyn Error + Send + Sync>> {
    match fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Box::new(e)),
    }
}

/// Replace `path` with `contents` via a synced temporary file in the same
/// directory, persisted over the target.
pub async fn write_changelog_atomic(
    path: &Path,
    contents: &str,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).await?;

    let target = path.to_path_buf();
    let bytes = contents.as_bytes().to_vec();
    tokio::task::spawn_blocking(move || -> Result<(), std::io::Error> {
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await??;
    Ok(())
}

/// Read, merge and write back the changelog at `path`.
#[instrument(level = "info", skip(path, discoveries), fields(path = %path.display(), discoveries = discoveries.len()))]
pub async fn update_changelog(
    path: &Path,
    date: NaiveDate,
    discoveries: &[Discovery],
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let existing = read_changelog(path).await?;
    if existing.is_none() {
        info!("No changelog yet; starting from the header");
    }
    let rendered = merge_document(existing.as_deref(), date, discoveries);
    if existing.as_deref() == Some(rendered.as_str()) {
        info!("Changelog unchanged");
        return Ok(());
    }
    write_changelog_atomic(path, &rendered).await?;
    info!(bytes = rendered.len(), "Changelog written");
    Ok(())
}
