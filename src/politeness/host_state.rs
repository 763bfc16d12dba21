use crate::robots::CachedRobots;
use std::time::Duration;
use tokio::time::Instant;

/// Tracks the politeness state of one host
///
/// Lives behind the host's own async lock inside the guard, so every
/// read-check-write sequence on it is exclusive per host.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// Number of requests permitted to this host since startup
    pub request_count: u32,

    /// When the last permitted request was released
    pub last_request_time: Option<Instant>,

    /// Cached robots.txt decision for this host
    pub robots: Option<CachedRobots>,
}

impl HostState {
    /// Creates a new HostState with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a request was released at `now`
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, min_delay: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < min_delay).then(|| min_delay - elapsed)
    }

    /// Returns the cached robots entry if it is younger than `ttl`
    pub fn fresh_robots(&self, ttl: Duration) -> Option<&CachedRobots> {
        self.robots.as_ref().filter(|cached| !cached.is_stale(ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robots::ParsedRobots;

    const MIN_DELAY: Duration = Duration::from_millis(1000);

    #[test]
    fn test_new_host_state() {
        let state = HostState::new();
        assert_eq!(state.request_count, 0);
        assert!(state.last_request_time.is_none());
        assert!(state.robots.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_request() {
        let mut state = HostState::new();
        let now = Instant::now();

        state.record_request(now);
        assert_eq!(state.request_count, 1);
        assert_eq!(state.last_request_time, Some(now));

        state.record_request(now);
        assert_eq!(state.request_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_until_next_request() {
        let mut state = HostState::new();
        let now = Instant::now();

        // No previous request
        assert!(state.time_until_next_request(MIN_DELAY, now).is_none());

        // Just made a request
        state.last_request_time = Some(now);
        assert_eq!(
            state.time_until_next_request(MIN_DELAY, now),
            Some(Duration::from_millis(1000))
        );

        // 500ms later
        let soon = now + Duration::from_millis(500);
        assert_eq!(
            state.time_until_next_request(MIN_DELAY, soon),
            Some(Duration::from_millis(500))
        );

        // Exactly at the boundary and after it
        assert!(state
            .time_until_next_request(MIN_DELAY, now + MIN_DELAY)
            .is_none());
        let later = now + Duration::from_millis(1100);
        assert!(state.time_until_next_request(MIN_DELAY, later).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_robots_expires() {
        let ttl = Duration::from_secs(60);
        let mut state = HostState::new();
        assert!(state.fresh_robots(ttl).is_none());

        state.robots = Some(CachedRobots::new(ParsedRobots::allow_all()));
        assert!(state.fresh_robots(ttl).is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(state.fresh_robots(ttl).is_none());
    }
}
