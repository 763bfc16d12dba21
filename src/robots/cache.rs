//! Robots.txt caching implementation
//!
//! Cached entries expire after a configurable TTL and are refetched lazily on
//! the next access.

use crate::robots::ParsedRobots;
use std::time::Duration;
use tokio::time::Instant;

/// Cached robots.txt data for a host
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt content (or the failure-policy stand-in)
    pub content: ParsedRobots,

    /// When the robots.txt was fetched
    pub fetched_at: Instant,
}

impl CachedRobots {
    /// Creates a new CachedRobots instance stamped with the current time
    pub fn new(content: ParsedRobots) -> Self {
        Self {
            content,
            fetched_at: Instant::now(),
        }
    }

    /// Checks if the entry is at least `ttl` old
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age() >= ttl
    }

    /// Returns the age of the cached robots.txt
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.fetched_at)
    }

    /// Checks if a URL is allowed according to the cached robots.txt
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        self.content.is_allowed(url, user_agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(3600);

    #[tokio::test(start_paused = true)]
    async fn test_new_cache_not_stale() {
        let cache = CachedRobots::new(ParsedRobots::allow_all());
        assert!(!cache.is_stale(TTL));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_is_stale_after_ttl() {
        let cache = CachedRobots::new(ParsedRobots::allow_all());

        tokio::time::advance(Duration::from_secs(3599)).await;
        assert!(!cache.is_stale(TTL));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.is_stale(TTL));
    }

    #[tokio::test(start_paused = true)]
    async fn test_age() {
        let cache = CachedRobots::new(ParsedRobots::allow_all());
        tokio::time::advance(Duration::from_secs(12)).await;
        assert_eq!(cache.age(), Duration::from_secs(12));
    }

    #[test]
    fn test_is_allowed_delegates_to_content() {
        let cache = CachedRobots::new(ParsedRobots::from_content("User-agent: *\nDisallow: /x"));
        assert!(cache.is_allowed("/any/path", "TestBot"));
        assert!(!cache.is_allowed("/x/y", "TestBot"));
    }
}
