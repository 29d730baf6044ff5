//! HTTP retrieval of image bodies.
//!
//! The engine only sees the [`ImageFetcher`] trait. [`HttpFetcher`] is the reqwest-backed
//! implementation used by the binary; tests substitute in-memory fakes.

use std::io;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use reqwest::Client;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Desktop Chrome user agent. Several storefronts reject obvious bots outright.
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Error types for a single fetch
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Status(u16),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FetchError {
    /// Network and HTTP failures are worth one attempt against another URL; disk failures are not.
    pub(crate) fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Io(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => FetchError::Status(status.as_u16()),
            None => FetchError::Network(e.to_string()),
        }
    }
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Something that can copy a remote image to a local file.
#[async_trait]
pub(crate) trait ImageFetcher: Send + Sync {
    /// Fetches `url` and writes the whole body to `dest`, returning the number of bytes written.
    ///
    /// Implementations may leave a partially written `dest` behind on error; the caller owns cleanup.
    async fn fetch_to(&self, url: &str, dest: &Path) -> FetchResult<u64>;
}

/// HTTP client settings shared by the image fetcher and the HTML page source.
#[derive(Debug, Clone)]
pub(crate) struct HttpSettings {
    pub(crate) user_agent: String,
    pub(crate) timeout: Duration,
    pub(crate) connect_timeout: Duration,
    pub(crate) referer: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: BROWSER_USER_AGENT.to_string(),
            timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            referer: None,
        }
    }
}

/// Builds a pooled reqwest client from `settings`.
pub(crate) fn build_client(settings: &HttpSettings) -> FetchResult<Client> {
    let mut headers = HeaderMap::new();
    if let Some(referer) = &settings.referer {
        let value = HeaderValue::from_str(referer)
            .map_err(|e| FetchError::Network(format!("Invalid referer '{}': {}", referer, e)))?;
        headers.insert(REFERER, value);
    }

    let client = Client::builder()
        .user_agent(&settings.user_agent)
        .default_headers(headers)
        .timeout(settings.timeout)
        .connect_timeout(settings.connect_timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .gzip(true)
        .tcp_nodelay(true)
        .build()?;

    info!(
        "Initialized HTTP client: {}s request timeout, {}s connect timeout",
        settings.timeout.as_secs(),
        settings.connect_timeout.as_secs()
    );

    Ok(client)
}

/// reqwest-backed [`ImageFetcher`] that streams bodies straight to disk.
#[derive(Debug, Clone)]
pub(crate) struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub(crate) fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch_to(&self, url: &str, dest: &Path) -> FetchResult<u64> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            debug!("GET {} returned {}", url, status);
            return Err(FetchError::Status(status.as_u16()));
        }

        let mut file = File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        Ok(written)
    }
}
