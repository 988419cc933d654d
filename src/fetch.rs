use std::error::Error;
use std::time::Duration;

use futures::{stream, StreamExt};
use log::{info, warn};

use crate::source::Source;

/// Hard cap on in-flight fetches; some list hosts rate-limit aggressively.
pub const MAX_CONCURRENT_FETCHES: usize = 16;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("adlist-aggregator/", env!("CARGO_PKG_VERSION"));

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("Fetching `{url}` was cut off mid-transfer; the list arrived incomplete and was discarded.")]
    IncompleteBody { url: String },

    #[error("Fetching `{url}` produced no readable response body.")]
    FetchBody { url: String },

    #[error("Fetching `{url}` timed out.")]
    Timeout { url: String },

    #[error("The request to `{url}` could not be sent; the URL or the local network may be at fault.")]
    FetchRequest { url: String },

    #[error("Fetching `{url}` failed: server answered with status {status}.")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Unable to read source file `{path}`: {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    #[error("Fetching `{url}` failed.")]
    Fetch { url: String },
}

/// Raw bytes of one successfully fetched source. No decoding or line
/// splitting happens at this stage.
#[derive(Debug)]
pub struct RawFetchResult {
    pub source: Source,
    pub bytes: Vec<u8>,
}

pub struct Client {
    client: reqwest::Client,
}

impl Default for Client {
    fn default() -> Self {
        Client {
            client: reqwest::Client::new(),
        }
    }
}

impl Client {
    fn handle_fetch_error(url: &str, error: &reqwest::Error) -> FetchError {
        log::error!("{error}");
        if error.is_timeout() {
            return FetchError::Timeout { url: url.into() };
        }
        if error.is_body() {
            if let Some(hyper_error) = error
                .source()
                .and_then(|source| source.downcast_ref::<hyper::Error>())
            {
                if hyper_error.is_incomplete_message() {
                    return FetchError::IncompleteBody { url: url.into() };
                }
            } else {
                return FetchError::FetchBody { url: url.into() };
            }
        }
        if error.is_request() {
            return FetchError::FetchRequest { url: url.into() };
        }
        FetchError::Fetch { url: url.into() }
    }

    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|error| Client::handle_fetch_error(url, &error))?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.into(),
                status: response.status(),
            });
        }
        match response.bytes().await {
            Ok(bytes) => Ok(bytes.to_vec()),
            Err(error) => Err(Client::handle_fetch_error(url, &error)),
        }
    }

    async fn fetch_source(&self, source: &Source) -> Result<Vec<u8>, FetchError> {
        match source {
            Source::Remote { url } => {
                info!("Fetching list: {url}");
                self.fetch_url(url.as_str()).await
            }
            Source::Local { path } => {
                tokio::fs::read(path)
                    .await
                    .map_err(|source| FetchError::ReadFile {
                        path: path.display().to_string(),
                        source,
                    })
            }
        }
    }

    /// Fetches every source exactly once with at most
    /// [`MAX_CONCURRENT_FETCHES`] in flight. A failed source lands in the
    /// second tuple element and never blocks the rest. `progress` runs on
    /// the driver after each source finishes, success or failure, with
    /// non-decreasing `completed` and constant `total`.
    pub async fn fetch_all(
        &self,
        sources: &[Source],
        mut progress: impl FnMut(usize, usize),
    ) -> (Vec<RawFetchResult>, Vec<Source>) {
        let total = sources.len();
        let mut in_flight = stream::iter(
            sources
                .iter()
                .map(|source| async move { (source, self.fetch_source(source).await) }),
        )
        .buffer_unordered(MAX_CONCURRENT_FETCHES);

        let mut results = Vec::new();
        let mut failed = Vec::new();
        let mut completed = 0;
        while let Some((source, outcome)) = in_flight.next().await {
            completed += 1;
            match outcome {
                Ok(bytes) => results.push(RawFetchResult {
                    source: source.clone(),
                    bytes,
                }),
                Err(error) => {
                    warn!("{error}");
                    failed.push(source.clone());
                }
            }
            progress(completed, total);
        }
        (results, failed)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::source::Source;

    use super::Client;

    #[tokio::test]
    async fn fetch_all_reads_local_sources_and_isolates_failures() {
        // arrange
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.txt");
        fs::write(&present, "ads.example.com\n").unwrap();
        let sources = vec![
            Source::Local {
                path: present.clone(),
            },
            Source::Local {
                path: dir.path().join("missing.txt"),
            },
        ];
        let client = Client::default();

        // act
        let (results, failed) = client.fetch_all(&sources, |_, _| {}).await;

        // assert
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].bytes, b"ads.example.com\n");
        assert_eq!(failed, [sources[1].clone()]);
    }

    #[tokio::test]
    async fn fetch_all_reports_monotonic_progress() {
        // arrange
        let dir = tempfile::tempdir().unwrap();
        let mut sources = Vec::new();
        for idx in 0..5 {
            let path = dir.path().join(format!("list-{idx}.txt"));
            fs::write(&path, format!("host-{idx}.example.com\n")).unwrap();
            sources.push(Source::Local { path });
        }
        // a failing source still counts towards progress
        sources.push(Source::Local {
            path: dir.path().join("missing.txt"),
        });
        let client = Client::default();
        let mut calls = Vec::new();

        // act
        let (results, failed) = client
            .fetch_all(&sources, |completed, total| calls.push((completed, total)))
            .await;

        // assert
        assert_eq!(results.len(), 5);
        assert_eq!(failed.len(), 1);
        assert_eq!(calls.len(), sources.len());
        assert!(calls.windows(2).all(|pair| pair[0].0 < pair[1].0));
        assert!(calls.iter().all(|(_, total)| *total == sources.len()));
        assert_eq!(calls.last(), Some(&(sources.len(), sources.len())));
    }

    #[tokio::test]
    async fn fetch_all_with_no_sources_completes_without_progress() {
        // arrange
        let client = Client::default();
        let mut called = false;

        // act
        let (results, failed) = client.fetch_all(&[], |_, _| called = true).await;

        // assert
        assert!(results.is_empty());
        assert!(failed.is_empty());
        assert!(!called);
    }
}
