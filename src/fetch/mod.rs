//! Retrying HTTP primitive shared by the catalog lookup, file downloads and
//! the upload relay.
//!
//! Every call runs under the same bounded-attempt, doubling-backoff policy
//! ([`RetryConfig`]). Any non-2xx status or transport failure counts as a
//! failed attempt; once the budget is spent the caller gets
//! [`FetchError::RetriesExhausted`] back instead of a panic, so it can move on
//! to the next file.

pub mod error;

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

pub use error::FetchError;

use crate::paths;
use crate::retry::{self, RetryAction, RetryConfig};

const USER_AGENT: &str = concat!("archive-relay/", env!("CARGO_PKG_VERSION"));

/// HTTP client wrapper that applies the retry policy to every request.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    retry: RetryConfig,
    shutdown: CancellationToken,
}

impl Fetcher {
    /// Build a fetcher whose client enforces `timeout` on each attempt, so a
    /// hung connection costs one attempt rather than the whole run.
    pub fn new(
        retry: RetryConfig,
        timeout: Duration,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            retry,
            shutdown,
        })
    }

    /// GET `url` and return the whole body.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.with_retry(url, || self.attempt_get(url)).await
    }

    /// GET `url` and stream the body to `dest`.
    ///
    /// The body lands in a sibling `.part` file which is renamed over `dest`
    /// only once fully written: `dest` either holds a complete download or is
    /// left untouched. Returns the number of bytes written.
    pub async fn download_to(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let part = paths::part_path(dest);
        let result = self
            .with_retry(url, || self.attempt_download(url, dest, &part))
            .await;
        if result.is_err() {
            let _ = fs::remove_file(&part).await;
        }
        result
    }

    /// POST `body` to `url` with the given headers.
    pub async fn post_bytes(
        &self,
        url: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(), FetchError> {
        self.with_retry(url, || self.attempt_post(url, headers, body))
            .await
    }

    async fn with_retry<T, F, Fut>(&self, url: &str, attempt: F) -> Result<T, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let shutdown = &self.shutdown;
        let result = retry::retry_with_backoff(
            &self.retry,
            shutdown,
            |e: &FetchError| {
                if e.is_retryable() {
                    RetryAction::Retry
                } else {
                    RetryAction::Abort
                }
            },
            || {
                let fut = attempt();
                async move {
                    if shutdown.is_cancelled() {
                        return Err(FetchError::Cancelled {
                            url: url.to_string(),
                        });
                    }
                    fut.await
                }
            },
        )
        .await;

        result.map_err(|e| {
            if !e.is_retryable() {
                return e;
            }
            if shutdown.is_cancelled() {
                return FetchError::Cancelled {
                    url: url.to_string(),
                };
            }
            let attempts = self.retry.attempts.max(1);
            tracing::error!(url, attempts, "All attempts failed");
            FetchError::RetriesExhausted {
                url: url.to_string(),
                attempts,
                last_error: e.to_string(),
            }
        })
    }

    async fn attempt_get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| http(e, url))?;
        let response = check_status(response, url)?;
        let body = response.bytes().await.map_err(|e| http(e, url))?;
        Ok(body.to_vec())
    }

    async fn attempt_download(
        &self,
        url: &str,
        dest: &Path,
        part: &Path,
    ) -> Result<u64, FetchError> {
        let disk = |source: std::io::Error| FetchError::Disk {
            path: part.display().to_string(),
            source,
        };

        // Always start from an empty .part so each attempt is whole-or-nothing.
        let _ = fs::remove_file(part).await;

        let response = self.client.get(url).send().await.map_err(|e| http(e, url))?;
        let response = check_status(response, url)?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(part)
            .await
            .map_err(disk)?;

        let mut bytes_written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                tracing::warn!(url, bytes_so_far = bytes_written, "Body read error: {}", e);
                http(e, url)
            })?;
            file.write_all(&chunk).await.map_err(disk)?;
            bytes_written += chunk.len() as u64;
        }
        file.flush().await.map_err(disk)?;
        drop(file);

        fs::rename(part, dest).await.map_err(|source| FetchError::Disk {
            path: dest.display().to_string(),
            source,
        })?;
        Ok(bytes_written)
    }

    async fn attempt_post(
        &self,
        url: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(), FetchError> {
        let response = self
            .client
            .post(url)
            .headers(headers.clone())
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| http(e, url))?;
        check_status(response, url)?;
        Ok(())
    }
}

fn http(source: reqwest::Error, url: &str) -> FetchError {
    FetchError::Http {
        source,
        url: url.to_string(),
    }
}

fn check_status(response: Response, url: &str) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(FetchError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}
