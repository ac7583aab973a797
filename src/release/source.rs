use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use super::{decode_releases, ReleaseRecord};

const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching the release list.
///
/// These never escape [`ReleaseSource::fetch`]; they are logged and the
/// caller sees an empty list.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    /// Response body is not a JSON array of releases
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
}

/// Acquires release records from the GitHub releases API.
#[derive(Debug, Clone)]
pub struct ReleaseSource {
    client: reqwest::Client,
    api_base_url: String,
    repository: String,
    timeout_secs: u64,
}

impl ReleaseSource {
    /// `timeout_secs == 0` waits indefinitely.
    pub fn new(
        client: reqwest::Client,
        api_base_url: impl Into<String>,
        repository: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into(),
            repository: repository.into(),
            timeout_secs,
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Endpoint queried by [`fetch`](Self::fetch).
    pub fn releases_url(&self) -> String {
        format!(
            "{}/repos/{}/releases",
            self.api_base_url.trim_end_matches('/'),
            self.repository
        )
    }

    /// Fetches the release list once, best effort.
    ///
    /// Any failure is logged and yields an empty list; there are no retries
    /// and no pagination beyond the API's default page.
    pub async fn fetch(&self) -> Vec<ReleaseRecord> {
        match self.try_fetch().await {
            Ok(records) => {
                tracing::debug!(
                    repository = %self.repository,
                    count = records.len(),
                    "Fetched releases"
                );
                records
            }
            Err(e) => {
                tracing::warn!(
                    repository = %self.repository,
                    url = %self.releases_url(),
                    error = %e,
                    "Failed to fetch releases"
                );
                Vec::new()
            }
        }
    }

    /// Fetches and decodes the release list, surfacing the failure cause.
    ///
    /// The timeout covers the whole exchange, body included, so a server that
    /// stalls after the headers cannot hold the run open.
    pub async fn try_fetch(&self) -> Result<Vec<ReleaseRecord>, FetchError> {
        let bytes = if self.timeout_secs == 0 {
            self.fetch_body().await?
        } else {
            tokio::time::timeout(Duration::from_secs(self.timeout_secs), self.fetch_body())
                .await
                .map_err(|_| FetchError::Timeout(self.timeout_secs))??
        };
        Ok(decode_releases(&bytes)?)
    }

    async fn fetch_body(&self) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(self.releases_url())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, MAX_RESPONSE_SIZE).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
