use rand::Rng;
use std::time::Duration;

/// Capped exponential delay with optional jitter.
///
/// Keeps its own attempt count: idle workers call [`next_delay`] while the
/// frontier is empty and [`reset`] as soon as they get work again.
///
/// [`next_delay`]: ExponentialBackoff::next_delay
/// [`reset`]: ExponentialBackoff::reset
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_ms: u64,
    max_ms: u64,
    jitter_percent: u64,
    attempt: u32,
}

impl ExponentialBackoff {
    pub const fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            jitter_percent: 10,
            attempt: 0,
        }
    }

    pub fn with_jitter(mut self, jitter_percent: u64) -> Self {
        self.jitter_percent = jitter_percent;
        self
    }

    /// Delay for a given attempt, without touching the internal count.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential_delay = self
            .base_ms
            .saturating_mul(2u64.saturating_pow(attempt.min(20)));
        let capped_delay = exponential_delay.min(self.max_ms);
        let jitter = if self.jitter_percent > 0 {
            rand::thread_rng().gen_range(0..capped_delay * self.jitter_percent / 100 + 1)
        } else {
            0
        };
        Duration::from_millis(capped_delay + jitter)
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth() {
        let backoff = ExponentialBackoff::new(50, 1000).with_jitter(0);
        assert_eq!(backoff.delay(0).as_millis(), 50);
        assert_eq!(backoff.delay(1).as_millis(), 100);
        assert_eq!(backoff.delay(2).as_millis(), 200);
    }

    #[test]
    fn test_max_cap() {
        let backoff = ExponentialBackoff::new(50, 1000).with_jitter(0);
        assert_eq!(backoff.delay(10).as_millis(), 1000);
        assert_eq!(backoff.delay(u32::MAX).as_millis(), 1000);
    }

    #[test]
    fn test_jitter_stays_bounded() {
        let backoff = ExponentialBackoff::new(100, 1000).with_jitter(10);
        for _ in 0..50 {
            let ms = backoff.delay(0).as_millis();
            assert!((100..=110).contains(&ms), "{} out of range", ms);
        }
    }

    #[test]
    fn test_next_delay_and_reset() {
        let mut backoff = ExponentialBackoff::new(50, 1000).with_jitter(0);
        assert_eq!(backoff.next_delay().as_millis(), 50);
        assert_eq!(backoff.next_delay().as_millis(), 100);
        assert_eq!(backoff.attempts(), 2);
        backoff.reset();
        assert_eq!(backoff.next_delay().as_millis(), 50);
    }
}
