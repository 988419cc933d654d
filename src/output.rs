use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use askama::Template;
use atomicwrites::{AtomicFile, OverwriteBehavior};
use chrono::{DateTime, Utc};
use humansize::{format_size, DECIMAL};
use log::{info, warn};

use crate::classify::{classify_line, ClassifiedLine};
use crate::normalize::{abp_exception, abp_rule, ListStream};

#[derive(Template)]
#[template(escape = "none", path = "list.txt")]
struct ListTemplate<'a> {
    title: &'a str,
    version: &'a str,
    repository: &'a str,
    timestamp: String,
    total: usize,
    domains: usize,
    abp_rules: usize,
    sources: usize,
    entries: String,
}

#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("Error rendering list `{path}`: {source}")]
    Render { path: PathBuf, source: askama::Error },

    #[error("Error writing list `{path}`: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Folds the previously written blocklist back into the stream, so a source
/// that fails transiently never shrinks the published list. A missing prior
/// file is an empty prior.
pub fn merge_prior(path: &Path, stream: &mut ListStream) {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return,
        Err(error) => {
            warn!("Unable to read prior output `{}`: {error}", path.display());
            return;
        }
    };
    for line in content.lines() {
        match classify_line(line) {
            ClassifiedLine::Domain(host) => {
                stream.domains.insert(host);
            }
            ClassifiedLine::AbpBlock(host) => {
                stream.rules.insert(abp_rule(&host));
            }
            ClassifiedLine::AbpAllow(host) => {
                stream.exceptions.insert(abp_exception(&host));
            }
            ClassifiedLine::Skip | ClassifiedLine::Discard => {}
        }
    }
}

/// Flattens a stream into the final line sequence: deduplicated under
/// case-insensitive trimmed equality (first-seen form kept) and sorted
/// ascending by ASCII-case-folded byte comparison.
pub fn collect_entries(stream: &ListStream) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut entries: Vec<String> = stream
        .domains
        .iter()
        .chain(stream.rules.iter())
        .chain(stream.exceptions.iter())
        .filter_map(|entry| {
            let entry = entry.trim();
            seen.insert(entry.to_ascii_lowercase())
                .then(|| entry.to_owned())
        })
        .collect();
    entries.sort_by(|a, b| a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()));
    entries
}

/// Renders the stream under a regenerated header and writes it atomically:
/// a concurrent reader sees either the old file or the complete new one.
/// UTF-8, LF only, terminated by LF.
pub fn write_list(
    path: &Path,
    title: &str,
    stream: &ListStream,
    source_count: usize,
    now: DateTime<Utc>,
) -> Result<(), WriteError> {
    let entries = collect_entries(stream);
    let abp_rules = entries
        .iter()
        .filter(|entry| entry.starts_with("||") || entry.starts_with("@@"))
        .count();
    let template = ListTemplate {
        title,
        version: env!("CARGO_PKG_VERSION"),
        repository: env!("CARGO_PKG_REPOSITORY"),
        timestamp: now.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        total: entries.len(),
        domains: entries.len() - abp_rules,
        abp_rules,
        sources: source_count,
        entries: entries.join("\n"),
    };
    let content = template.render().map_err(|source| WriteError::Render {
        path: path.into(),
        source,
    })?;

    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
        .write(|file| file.write_all(content.as_bytes()))
        .map_err(|error| WriteError::Io {
            path: path.into(),
            source: match error {
                atomicwrites::Error::Internal(source) | atomicwrites::Error::User(source) => source,
            },
        })?;
    info!(
        "Wrote {} to `{}`",
        format_size(content.len(), DECIMAL),
        path.display()
    );
    Ok(())
}
