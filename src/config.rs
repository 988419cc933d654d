use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use crate::source::Source;

/// Recognized top-level keys. Any subset may be present; all of them merge
/// into one source list, in this key order.
#[derive(Deserialize, Default)]
#[serde(default)]
struct ListConfig {
    lists: Vec<String>,
    urls: Vec<String>,
    adlists: Vec<String>,
    sources: Vec<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file `{path}`: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Unable to parse config file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid source URL `{url}` in `{path}`: {source}")]
    InvalidUrl {
        url: String,
        path: PathBuf,
        source: url::ParseError,
    },
}

impl ConfigError {
    pub fn is_missing_file(&self) -> bool {
        matches!(self, ConfigError::Read { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Loads one pipeline's JSON config and resolves it to a deduplicated source
/// list. `http://`/`https://` strings become remote sources; anything else is
/// a local path, resolved relative to the config file's directory.
pub fn load_sources(path: &Path) -> Result<Vec<Source>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.into(),
        source,
    })?;
    let config: ListConfig =
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.into(),
            source,
        })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut sources = Vec::new();
    for entry in config
        .lists
        .iter()
        .chain(&config.urls)
        .chain(&config.adlists)
        .chain(&config.sources)
    {
        let source = if entry.starts_with("http://") || entry.starts_with("https://") {
            let url = Url::parse(entry).map_err(|source| ConfigError::InvalidUrl {
                url: entry.clone(),
                path: path.into(),
                source,
            })?;
            Source::Remote { url }
        } else {
            Source::Local {
                path: base_dir.join(entry),
            }
        };
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    Ok(sources)
}
