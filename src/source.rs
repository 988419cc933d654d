use std::fmt;
use std::path::PathBuf;

use url::Url;

/// One configured input: a remote list URL or a local file path.
///
/// Two sources are the same input if they have the same kind and the same
/// location, which is what deduplication of merged config keys relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    Remote { url: Url },
    Local { path: PathBuf },
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Remote { url } => write!(f, "{url}"),
            Source::Local { path } => write!(f, "{}", path.display()),
        }
    }
}
