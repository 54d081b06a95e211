use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::url_utils;

// In-memory politeness window per host
#[derive(Debug)]
struct HostTracking {
    /// When the next request to this host may start
    ready_at: Instant,
}

/// Per-host request spacing shared by all workers.
///
/// A worker reserves a slot before fetching. Reservation happens under the
/// host's map entry, so two workers hitting the same host get slots at least
/// `delay` apart even when they ask at the same instant.
#[derive(Debug)]
pub struct Politeness {
    delay: Duration,
    host_tracking: DashMap<String, HostTracking>,
}

impl Politeness {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            host_tracking: DashMap::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Claim the next slot for `host` and return how long to wait for it.
    pub fn reserve(&self, host: &str) -> Duration {
        let now = Instant::now();
        let mut tracking = self
            .host_tracking
            .entry(host.to_string())
            .or_insert_with(|| HostTracking { ready_at: now });

        let start = tracking.ready_at.max(now);
        tracking.ready_at = start + self.delay;
        start.saturating_duration_since(now)
    }

    /// Sleep until this worker may fetch `url`. URLs without a host go straight through.
    pub async fn wait_turn(&self, url: &str) {
        let Some(host) = url_utils::extract_host(url) else {
            return;
        };
        let wait = self.reserve(&host);
        if !wait.is_zero() {
            tracing::trace!(%host, wait_ms = wait.as_millis() as u64, "politeness wait");
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of hosts contacted so far.
    pub fn host_count(&self) -> usize {
        self.host_tracking.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_is_immediate() {
        let politeness = Politeness::new(Duration::from_millis(500));
        assert_eq!(politeness.reserve("ics.uci.edu"), Duration::ZERO);
    }

    #[test]
    fn test_back_to_back_requests_are_spaced() {
        let politeness = Politeness::new(Duration::from_millis(500));
        politeness.reserve("ics.uci.edu");
        let second = politeness.reserve("ics.uci.edu");
        let third = politeness.reserve("ics.uci.edu");
        assert!(second > Duration::from_millis(400));
        assert!(third > Duration::from_millis(900));
    }

    #[test]
    fn test_hosts_are_independent() {
        let politeness = Politeness::new(Duration::from_millis(500));
        politeness.reserve("ics.uci.edu");
        assert_eq!(politeness.reserve("stat.uci.edu"), Duration::ZERO);
        assert_eq!(politeness.host_count(), 2);
    }

    #[tokio::test]
    async fn test_wait_turn_sleeps_for_same_host() {
        let politeness = Politeness::new(Duration::from_millis(50));
        let start = Instant::now();
        politeness.wait_turn("https://ics.uci.edu/a").await;
        politeness.wait_turn("https://ics.uci.edu/b").await;
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn test_wait_turn_ignores_hostless_url() {
        let politeness = Politeness::new(Duration::from_secs(60));
        politeness.wait_turn("not a url").await;
        politeness.wait_turn("not a url").await;
        assert_eq!(politeness.host_count(), 0);
    }
}
