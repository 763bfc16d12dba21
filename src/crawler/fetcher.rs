//! HTTP fetcher implementation
//!
//! This module performs the single GET issued per target per run:
//! - Building the HTTP client with the identifying user agent string
//! - Following redirects (bounded)
//! - Timing the request
//! - Classifying transport faults
//!
//! HTTP status codes are not interpreted here. A 404 or 503 is a normal
//! [`FetchOutcome`]; only transport-level faults become a [`TransportError`].

use crate::config::Config;
use crate::url::host_key_lossy;
use reqwest::{redirect::Policy, Client};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

/// Longest redirect chain followed before giving up
pub const MAX_REDIRECTS: usize = 10;

/// Connect timeout cap; the request timeout bounds it from above
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Normalized result of one GET
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Requested URL
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    /// Politeness key of the requested URL
    pub host: String,
    pub status_code: u16,
    /// Wall-clock duration of the call
    pub duration: Duration,
    pub robots_allowed: bool,
    /// Response text; `None` when the response had no body
    pub body: Option<String>,
}

/// Transport-level fetch failures
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Timed out fetching {url}: {message}")]
    Timeout { url: String, message: String },

    #[error("Connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Redirect error for {url}: {message}")]
    Redirect { url: String, message: String },

    #[error("Failed to read body of {url}: {message}")]
    Body { url: String, message: String },

    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },
}

impl TransportError {
    /// Classifies a reqwest error
    pub fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        let url = url.to_string();
        let message = err.to_string();
        if err.is_timeout() {
            Self::Timeout { url, message }
        } else if err.is_connect() {
            Self::Connect { url, message }
        } else if err.is_redirect() {
            Self::Redirect { url, message }
        } else if err.is_body() || err.is_decode() {
            Self::Body { url, message }
        } else {
            Self::Request { url, message }
        }
    }

    /// Stable error-kind tag written to the request audit
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "transport_timeout",
            Self::Connect { .. } => "transport_connect",
            Self::Redirect { .. } => "transport_redirect",
            Self::Body { .. } => "transport_body",
            Self::Request { .. } => "transport_request",
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Timeout { url, .. }
            | Self::Connect { url, .. }
            | Self::Redirect { url, .. }
            | Self::Body { url, .. }
            | Self::Request { url, .. } => url,
        }
    }
}

/// Performs one GET for an already-authorized URL
pub trait Fetcher {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<FetchOutcome, TransportError>> + Send;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The harvester configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use harvester::config::parse_config;
/// use harvester::crawler::build_http_client;
///
/// let config = parse_config(&std::fs::read_to_string("harvester.toml").unwrap()).unwrap();
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    let timeout = Duration::from_secs(config.politeness.request_timeout_secs);

    Client::builder()
        .user_agent(config.user_agent.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(CONNECT_TIMEOUT))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetcher backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchOutcome, TransportError> {
        let started = Instant::now();

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url.as_str(), &e))?;

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();

        let text = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(url.as_str(), &e))?;

        let duration = started.elapsed();
        tracing::debug!(
            "Fetched {} -> {} in {:?} ({} bytes)",
            url,
            status_code,
            duration,
            text.len()
        );

        Ok(FetchOutcome {
            url: url.to_string(),
            final_url,
            host: host_key_lossy(url.as_str()),
            status_code,
            duration,
            robots_allowed: true,
            body: (!text.is_empty()).then_some(text),
        })
    }
}
