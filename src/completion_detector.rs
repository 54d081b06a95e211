//! Cooperative termination for the worker pool.
//!
//! The crawl is over once the frontier has stayed empty, with no page in
//! flight, for the whole idle timeout. Workers register a page *before*
//! popping from the frontier, so a URL that has been handed out but not yet
//! processed always counts as in flight.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub struct CompletionDetector {
    idle_timeout: Duration,

    /// Workers between `begin_page` and `end_page`.
    in_flight: AtomicUsize,

    /// First moment every signal said "idle"; reset by any activity.
    idle_since: Mutex<Option<Instant>>,

    /// Latched once completion is confirmed.
    is_completed: AtomicBool,
}

impl CompletionDetector {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            in_flight: AtomicUsize::new(0),
            idle_since: Mutex::new(None),
            is_completed: AtomicBool::new(false),
        }
    }

    pub fn begin_page(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    pub fn end_page(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_completed(&self) -> bool {
        self.is_completed.load(Ordering::SeqCst)
    }

    /// True once the crawl has been idle for the full timeout.
    pub fn check_completion(&self, frontier_empty: bool) -> bool {
        if self.is_completed() {
            return true;
        }

        if !frontier_empty || self.in_flight() > 0 {
            *self.idle_since.lock() = None;
            return false;
        }

        let now = Instant::now();
        let mut idle_since = self.idle_since.lock();
        match *idle_since {
            Some(start) if now.duration_since(start) >= self.idle_timeout => {
                self.is_completed.store(true, Ordering::SeqCst);
                tracing::info!(
                    idle_secs = now.duration_since(start).as_secs_f64(),
                    "Crawl complete: frontier empty and nothing in flight"
                );
                true
            }
            Some(_) => false,
            None => {
                *idle_since = Some(now);
                tracing::debug!(
                    timeout_ms = self.idle_timeout.as_millis() as u64,
                    "Frontier empty, starting idle timer"
                );
                false
            }
        }
    }
}
