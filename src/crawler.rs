use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::{sleep, Duration};

use crate::backoff::ExponentialBackoff;
use crate::completion_detector::CompletionDetector;
use crate::config::{Config, ConfigError, CrawlerConfig};
use crate::filter::UrlFilter;
use crate::frontier::{Frontier, FrontierError, FrontierStats, StartMode};
use crate::metrics::{CrawlMetrics, MetricsSnapshot, PageOutcome};
use crate::network::Fetcher;
use crate::parser;
use crate::politeness::Politeness;
use crate::stats::{CrawlReport, CrawlStats, StatsError};
use crate::store::{KvStore, RedbStore, StoreError};
use crate::text;
use crate::trap_detector::TrapDetector;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Frontier(#[from] FrontierError),

    #[error("Statistics error: {0}")]
    Stats(#[from] StatsError),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub start_mode: StartMode,
    pub duration_secs: u64,
    pub frontier: FrontierStats,
    pub metrics: MetricsSnapshot,
    pub unique_pages: usize,
}

impl std::fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Crawled for {}s | {} unique pages | {} | {}",
            self.duration_secs, self.unique_pages, self.frontier, self.metrics
        )
    }
}

/// Multi-worker crawl over a durable frontier.
///
/// Cheap to clone; every clone shares the same frontier, statistics and
/// stop flag, so a clone can be handed to a signal handler to call [`stop`].
///
/// [`stop`]: Crawler::stop
#[derive(Clone)]
pub struct Crawler {
    config: Arc<CrawlerConfig>,
    frontier: Arc<Frontier>,
    filter: Arc<UrlFilter>,
    traps: Arc<TrapDetector>,
    stats: Arc<CrawlStats>,
    politeness: Arc<Politeness>,
    fetcher: Arc<dyn Fetcher>,
    metrics: Arc<CrawlMetrics>,
    completion: Arc<CompletionDetector>,
    running: Arc<Mutex<bool>>,
    start_mode: StartMode,
}

impl Crawler {
    /// Open durable state under `config.data_dir` and bring the frontier up.
    pub fn new(config: CrawlerConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self, CrawlError> {
        config.validate()?;
        let store: Arc<dyn KvStore> = Arc::new(RedbStore::open(config.frontier_path())?);
        Self::assemble(config, store, fetcher)
    }

    /// Same as [`Crawler::new`] over an already opened store.
    pub fn with_store(
        config: CrawlerConfig,
        store: Arc<dyn KvStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, CrawlError> {
        config.validate()?;
        Self::assemble(config, store, fetcher)
    }

    fn assemble(
        config: CrawlerConfig,
        store: Arc<dyn KvStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, CrawlError> {
        let filter = UrlFilter::new(&config.allowed_domains, &config.filter);
        let (frontier, start_mode) = Frontier::open(
            store,
            &filter,
            &config.seed_urls,
            config.restart,
            config.queue_order,
        )?;

        let stats = if config.restart {
            CrawlStats::new()
        } else {
            CrawlStats::load(&config.stats_path())?
        }
        .with_report_domain(config.report_domain.clone());

        Ok(Self {
            traps: Arc::new(TrapDetector::new(config.traps.clone())),
            politeness: Arc::new(Politeness::new(Duration::from_millis(
                config.politeness_delay_ms,
            ))),
            completion: Arc::new(CompletionDetector::new(Duration::from_secs(
                config.idle_timeout_secs,
            ))),
            frontier: Arc::new(frontier),
            filter: Arc::new(filter),
            stats: Arc::new(stats),
            metrics: Arc::new(CrawlMetrics::new()),
            running: Arc::new(Mutex::new(false)),
            config: Arc::new(config),
            fetcher,
            start_mode,
        })
    }

    pub fn start_mode(&self) -> StartMode {
        self.start_mode
    }

    pub fn frontier(&self) -> &Arc<Frontier> {
        &self.frontier
    }

    pub fn stats(&self) -> &Arc<CrawlStats> {
        &self.stats
    }

    pub fn trap_detector(&self) -> &Arc<TrapDetector> {
        &self.traps
    }

    /// Run the worker pool until the crawl goes idle, [`Crawler::stop`] is
    /// called, or a storage write fails. Storage failures are returned.
    pub async fn run(&self) -> Result<CrawlSummary, CrawlError> {
        let start = SystemTime::now();
        *self.running.lock() = true;

        tracing::info!(
            workers = self.config.workers,
            queued = self.frontier.len(),
            "Starting crawl"
        );

        let report_task = self.spawn_report_task();

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.workers {
            let crawler = self.clone();
            workers.spawn(async move { crawler.worker_loop(worker_id).await });
        }

        let mut first_error: Option<CrawlError> = None;
        while let Some(joined) = workers.join_next().await {
            let outcome = match joined {
                Ok(result) => result,
                Err(e) => Err(CrawlError::Join(e)),
            };
            if let Err(e) = outcome {
                tracing::error!("Worker stopped with error: {}", e);
                self.stop();
                first_error.get_or_insert(e);
            }
        }

        self.stop();
        if let Some(task) = report_task {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!("Report task error: {}", e);
                }
            }
        }

        // Statistics are flushed even when the crawl halts on a storage error.
        let flushed = self.flush_reports();

        if let Some(e) = first_error {
            return Err(e);
        }
        flushed?;

        let summary = CrawlSummary {
            start_mode: self.start_mode,
            duration_secs: SystemTime::now()
                .duration_since(start)
                .unwrap_or_default()
                .as_secs(),
            frontier: self.frontier.stats()?,
            metrics: self.metrics.snapshot(),
            unique_pages: self.stats.unique_pages(),
        };
        tracing::info!("{}", summary);
        Ok(summary)
    }

    /// Ask every worker to finish its current page and exit.
    pub fn stop(&self) {
        let mut running = self.running.lock();
        *running = false;
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock()
    }

    async fn worker_loop(self, worker_id: usize) -> Result<(), CrawlError> {
        let mut idle_backoff =
            ExponentialBackoff::new(Config::IDLE_BACKOFF_BASE_MS, Config::IDLE_BACKOFF_MAX_MS)
                .with_jitter(10);

        tracing::debug!(worker_id, "worker started");

        while self.is_running() {
            // Registered before popping so an in-hand URL always counts as in flight.
            self.completion.begin_page();
            let next = match self.frontier.get_next() {
                Ok(next) => next,
                Err(e) => {
                    self.completion.end_page();
                    return Err(e.into());
                }
            };

            let Some(url) = next else {
                self.completion.end_page();
                if self.completion.check_completion(self.frontier.is_empty()) {
                    break;
                }
                sleep(idle_backoff.next_delay()).await;
                continue;
            };
            idle_backoff.reset();

            let processed = self.process_url(&url).await;
            // Every popped URL is completed, whatever happened to it.
            let completed = self.frontier.mark_complete(&url);
            self.completion.end_page();

            let outcome = processed?;
            completed?;
            tracing::debug!(worker_id, %url, ?outcome, "page done");
            self.metrics.record_outcome(outcome);
        }

        tracing::debug!(worker_id, "worker exiting");
        Ok(())
    }

    /// Fetch one URL and enqueue its links. Only storage failures are errors.
    async fn process_url(&self, url: &str) -> Result<PageOutcome, FrontierError> {
        self.politeness.wait_turn(url).await;

        let fetch_start = Instant::now();
        let response = match self.fetcher.fetch(url).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(%url, "fetch failed: {}", e);
                return Ok(PageOutcome::FetchFailed);
            }
        };
        self.metrics.record_fetch_latency(fetch_start.elapsed());

        if response.status != 200 {
            tracing::debug!(%url, status = response.status, "non-200 response");
            return Ok(PageOutcome::BadStatus(response.status));
        }

        let final_url = if response.final_url.is_empty() {
            url.to_string()
        } else {
            response.final_url.clone()
        };
        if final_url != url && !self.filter.is_valid(&final_url) {
            tracing::debug!(%url, %final_url, "redirected outside the crawl scope");
            return Ok(PageOutcome::RedirectedAway);
        }

        let page = match parser::parse_page(&response.body, response.content_type(), &final_url) {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("{}", e);
                return Ok(PageOutcome::ParseFailed);
            }
        };

        let tokens = text::tokenize(&page.text);
        if !self.traps.has_enough_content(&tokens) {
            tracing::debug!(%final_url, words = tokens.len(), "too little content");
            return Ok(PageOutcome::LowContent);
        }
        if self.traps.check(&final_url, &tokens) {
            tracing::info!(%final_url, "crawler trap, links not followed");
            return Ok(PageOutcome::Trap);
        }

        self.stats.record_page(&final_url, &tokens);

        let mut links_added = 0;
        for link in &page.links {
            if self.filter.is_valid(link) && self.frontier.add_url(link)? {
                links_added += 1;
            }
        }
        Ok(PageOutcome::Crawled { links_added })
    }

    /// Write `stats.json` and `report.txt`.
    pub fn flush_reports(&self) -> Result<(), StatsError> {
        self.stats.save(&self.config.stats_path())?;
        self.stats
            .write_report(&self.config.report_path(), self.config.top_words)?;
        Ok(())
    }

    pub fn report(&self) -> CrawlReport {
        self.stats.report(self.config.top_words)
    }

    fn spawn_report_task(&self) -> Option<tokio::task::JoinHandle<()>> {
        if self.config.report_interval_secs == 0 {
            return None;
        }

        let interval = Duration::from_secs(self.config.report_interval_secs);
        let crawler = self.clone();

        Some(tokio::spawn(async move {
            loop {
                sleep(interval).await;
                if !crawler.is_running() {
                    break;
                }

                if let Err(e) = crawler.flush_reports() {
                    tracing::warn!("Failed to write crawl report: {}", e);
                }
                match crawler.frontier.stats() {
                    Ok(frontier_stats) => tracing::info!(
                        "Progress: {} | {}",
                        crawler.metrics.snapshot(),
                        frontier_stats
                    ),
                    Err(e) => tracing::warn!("Failed to read frontier stats: {}", e),
                }
            }
        }))
    }
}
