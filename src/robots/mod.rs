//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching robots.txt files.

mod cache;
mod parser;

pub use cache::CachedRobots;
pub use parser::ParsedRobots;

use crate::config::RobotsFailurePolicy;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use url::Url;

/// Why a robots.txt document could not be used
#[derive(Debug, Error)]
pub enum RobotsError {
    #[error("robots.txt request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("robots.txt returned HTTP {0}")]
    Status(u16),

    #[error("robots.txt body is not valid UTF-8")]
    Malformed,
}

/// Fetches and parses robots.txt, applying `on_failure` when it is unusable
///
/// Never fails: a network error, a non-200 status, or an undecodable body
/// yields [`ParsedRobots::allow_all`] or [`ParsedRobots::deny_all`] per the
/// configured policy.
pub async fn fetch_robots(
    client: &Client,
    robots_url: &Url,
    on_failure: RobotsFailurePolicy,
) -> ParsedRobots {
    match try_fetch(client, robots_url).await {
        Ok(body) => {
            tracing::debug!("Fetched {} ({} bytes)", robots_url, body.len());
            ParsedRobots::from_content(&body)
        }
        Err(e) => {
            tracing::warn!(
                robots_url = %robots_url,
                policy = ?on_failure,
                "Unusable robots.txt: {}",
                e
            );
            match on_failure {
                RobotsFailurePolicy::Allow => ParsedRobots::allow_all(),
                RobotsFailurePolicy::Deny => ParsedRobots::deny_all(),
            }
        }
    }
}

async fn try_fetch(client: &Client, robots_url: &Url) -> Result<String, RobotsError> {
    let response = client.get(robots_url.clone()).send().await?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(RobotsError::Status(status.as_u16()));
    }

    let bytes = response.bytes().await?;
    String::from_utf8(bytes.to_vec()).map_err(|_| RobotsError::Malformed)
}
