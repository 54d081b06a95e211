use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Histogram {
    buckets: Vec<(u64, u64)>,
    sum_ms: u64,
    count: u64,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            buckets: vec![
                (50, 0),
                (100, 0),
                (250, 0),
                (500, 0),
                (1000, 0),
                (5000, 0),
                (u64::MAX, 0),
            ],
            sum_ms: 0,
            count: 0,
        }
    }

    pub fn observe(&mut self, value_ms: u64) {
        self.sum_ms += value_ms;
        self.count += 1;

        for (threshold, count) in &mut self.buckets {
            if value_ms <= *threshold {
                *count += 1;
                break;
            }
        }
    }

    pub fn mean_ms(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.sum_ms / self.count
        }
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self { value: AtomicU64::new(0) }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened to one popped URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Crawled { links_added: usize },
    FetchFailed,
    BadStatus(u16),
    RedirectedAway,
    ParseFailed,
    LowContent,
    Trap,
}

/// Per-outcome counters for one crawl run.
#[derive(Debug, Default)]
pub struct CrawlMetrics {
    pub urls_processed: Counter,
    pub pages_crawled: Counter,
    pub fetch_failures: Counter,
    pub bad_status: Counter,
    pub redirected_away: Counter,
    pub parse_failures: Counter,
    pub low_content: Counter,
    pub traps: Counter,
    pub links_enqueued: Counter,
    pub fetch_latency: Mutex<Histogram>,
}

impl CrawlMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_outcome(&self, outcome: PageOutcome) {
        self.urls_processed.inc();
        match outcome {
            PageOutcome::Crawled { links_added } => {
                self.pages_crawled.inc();
                self.links_enqueued.add(links_added as u64);
            }
            PageOutcome::FetchFailed => self.fetch_failures.inc(),
            PageOutcome::BadStatus(_) => self.bad_status.inc(),
            PageOutcome::RedirectedAway => self.redirected_away.inc(),
            PageOutcome::ParseFailed => self.parse_failures.inc(),
            PageOutcome::LowContent => self.low_content.inc(),
            PageOutcome::Trap => self.traps.inc(),
        }
    }

    pub fn record_fetch_latency(&self, duration: Duration) {
        self.fetch_latency.lock().observe(duration.as_millis() as u64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            urls_processed: self.urls_processed.get(),
            pages_crawled: self.pages_crawled.get(),
            fetch_failures: self.fetch_failures.get(),
            bad_status: self.bad_status.get(),
            redirected_away: self.redirected_away.get(),
            parse_failures: self.parse_failures.get(),
            low_content: self.low_content.get(),
            traps: self.traps.get(),
            links_enqueued: self.links_enqueued.get(),
            mean_fetch_ms: self.fetch_latency.lock().mean_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub urls_processed: u64,
    pub pages_crawled: u64,
    pub fetch_failures: u64,
    pub bad_status: u64,
    pub redirected_away: u64,
    pub parse_failures: u64,
    pub low_content: u64,
    pub traps: u64,
    pub links_enqueued: u64,
    pub mean_fetch_ms: u64,
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} processed ({} crawled, {} fetch errors, {} non-200, {} off-domain redirects, {} unparseable, {} thin, {} traps) | {} links queued | {}ms mean fetch",
            self.urls_processed,
            self.pages_crawled,
            self.fetch_failures,
            self.bad_status,
            self.redirected_away,
            self.parse_failures,
            self.low_content,
            self.traps,
            self.links_enqueued,
            self.mean_fetch_ms
        )
    }
}
