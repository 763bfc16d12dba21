//! Politeness guard: robots.txt compliance and per-host request spacing
//!
//! Two independent checks gate every fetch:
//!
//! - [`PolitenessGuard::authorize`] answers whether robots.txt permits the URL.
//! - [`PolitenessGuard::wait_turn`] suspends until the host's minimum delay has
//!   elapsed since its previous request, then claims the slot.
//!
//! Per-host state sits in a map keyed by host. The map lock is only held long
//! enough to find or create a host's slot; each slot has its own async lock
//! covering the whole check-sleep-record sequence, so concurrent workers
//! hitting one host are released one at a time, `min_delay` apart.

mod host_state;

pub use host_state::HostState;

use crate::config::{Config, PolitenessConfig, RobotsFailurePolicy};
use crate::robots::{fetch_robots, CachedRobots};
use crate::url::{host_key, robots_url};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Robots verdict for one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub allowed: bool,
    /// Politeness key of the URL's host
    pub host: String,
}

pub struct PolitenessGuard {
    client: Client,
    /// Product token matched against robots.txt user-agent groups
    robots_agent: String,
    robots_ttl: Duration,
    on_robots_failure: RobotsFailurePolicy,
    min_delay: Duration,
    hosts: Mutex<HashMap<String, Arc<tokio::sync::Mutex<HostState>>>>,
}

impl PolitenessGuard {
    /// Creates a guard
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client used for robots.txt requests
    /// * `robots_agent` - Product token, e.g. `harvester`
    /// * `config` - TTL, delay, and failure policy
    pub fn new(client: Client, robots_agent: impl Into<String>, config: &PolitenessConfig) -> Self {
        Self {
            client,
            robots_agent: robots_agent.into(),
            robots_ttl: Duration::from_secs(config.robots_ttl_secs),
            on_robots_failure: config.robots_failure,
            min_delay: Duration::from_millis(config.min_delay_ms),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a guard from the full configuration
    pub fn from_config(client: Client, config: &Config) -> Self {
        Self::new(client, &config.user_agent.crawler_name, &config.politeness)
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Decides whether robots.txt permits fetching `url`
    ///
    /// The host's robots.txt is fetched on first use and again once the
    /// cached copy is older than the TTL. A URL without a host is never
    /// allowed.
    pub async fn authorize(&self, url: &Url) -> Authorization {
        let Some(host) = host_key(url) else {
            return Authorization {
                allowed: false,
                host: String::new(),
            };
        };

        let slot = self.slot(&host);
        let mut state = slot.lock().await;

        let allowed = match state.fresh_robots(self.robots_ttl) {
            Some(cached) => {
                tracing::debug!("Using cached robots.txt for host: {}", host);
                cached.is_allowed(url.as_str(), &self.robots_agent)
            }
            None => {
                let cached = match robots_url(url) {
                    Some(robots) => {
                        tracing::debug!("Fetching robots.txt for host: {}", host);
                        CachedRobots::new(
                            fetch_robots(&self.client, &robots, self.on_robots_failure).await,
                        )
                    }
                    None => CachedRobots::new(crate::robots::ParsedRobots::deny_all()),
                };
                let allowed = cached.is_allowed(url.as_str(), &self.robots_agent);
                state.robots = Some(cached);
                allowed
            }
        };

        Authorization { allowed, host }
    }

    /// Suspends until `url`'s host may be contacted, then claims the slot
    ///
    /// Returns how long the caller waited.
    pub async fn wait_turn(&self, url: &Url) -> Duration {
        let host = host_key(url).unwrap_or_default();
        let slot = self.slot(&host);

        // Held across the sleep: the next caller for this host measures its
        // delay from the timestamp recorded below.
        let mut state = slot.lock().await;

        let started = Instant::now();
        if let Some(wait) = state.time_until_next_request(self.min_delay, started) {
            tracing::debug!("Throttling {} for {:?}", host, wait);
            tokio::time::sleep(wait).await;
        }

        let now = Instant::now();
        state.record_request(now);
        now - started
    }

    /// Copy of a host's current state, if the host has been seen
    pub async fn host_state(&self, host: &str) -> Option<HostState> {
        let slot = self
            .hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .cloned()?;
        let state = slot.lock().await;
        Some(state.clone())
    }

    fn slot(&self, host: &str) -> Arc<tokio::sync::Mutex<HostState>> {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts.entry(host.to_string()).or_default().clone()
    }
}
