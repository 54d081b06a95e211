use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

use crate::config::QueueOrder;
use crate::filter::UrlFilter;
use crate::store::{KvStore, StoreError, UrlRecord};
use crate::url_utils;

#[derive(Error, Debug)]
pub enum FrontierError {
    /// The durable store failed a read or write. Fatal to the crawl.
    #[error("Durability failure: {0}")]
    Durability(#[from] StoreError),
}

/// How the frontier was brought up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Existing state was discarded and the seeds queued.
    Fresh,
    /// Pending records were reloaded from durable state.
    Resumed { pending: usize, total: usize },
    /// Resume was requested but the durable map was empty.
    SeededAfterEmptyResume,
}

/// Durable, crash-recoverable queue of URLs to fetch.
///
/// Records live in the [`KvStore`]; the queue is an in-memory ordering of
/// not-yet-fetched URLs rebuilt from the store on resume. Every mutation
/// runs under one lock so a URL discovered by several workers at once ends
/// up with one record and one queue slot.
pub struct Frontier {
    store: Arc<dyn KvStore>,
    queue: Mutex<VecDeque<String>>,
    order: QueueOrder,
}

impl Frontier {
    /// Wrap a store without loading anything. Used by `open` and by tests.
    pub fn new(store: Arc<dyn KvStore>, order: QueueOrder) -> Self {
        Self {
            store,
            queue: Mutex::new(VecDeque::new()),
            order,
        }
    }

    /// Bring the frontier up from `store`.
    ///
    /// With `restart` the store is cleared and `seeds` are queued. Otherwise
    /// every incomplete record that still passes `filter` is queued once; an
    /// empty store falls back to seeding.
    #[tracing::instrument(skip_all, fields(restart, seeds = seeds.len()))]
    pub fn open(
        store: Arc<dyn KvStore>,
        filter: &UrlFilter,
        seeds: &[String],
        restart: bool,
        order: QueueOrder,
    ) -> Result<(Self, StartMode), FrontierError> {
        let frontier = Self::new(store, order);

        if restart {
            if !frontier.store.is_empty()? {
                tracing::info!("Found existing frontier state, discarding it");
            }
            frontier.store.clear()?;
            frontier.seed(seeds)?;
            return Ok((frontier, StartMode::Fresh));
        }

        let (pending, total) = frontier.reload(filter)?;
        if total == 0 {
            tracing::info!("No saved frontier state, starting from seeds");
            frontier.seed(seeds)?;
            return Ok((frontier, StartMode::SeededAfterEmptyResume));
        }

        tracing::info!(
            "Found {} urls to be downloaded from {} total urls discovered",
            pending,
            total
        );
        Ok((frontier, StartMode::Resumed { pending, total }))
    }

    fn seed(&self, seeds: &[String]) -> Result<(), FrontierError> {
        for seed in seeds {
            self.add_url(seed)?;
        }
        Ok(())
    }

    fn reload(&self, filter: &UrlFilter) -> Result<(usize, usize), FrontierError> {
        let mut pending = Vec::new();
        let mut total = 0usize;
        self.store.iterate(&mut |_key, record| {
            total += 1;
            if !record.completed && filter.is_valid(&record.url) {
                pending.push(record.url);
            }
            Ok(())
        })?;

        let count = pending.len();
        self.queue.lock().extend(pending);
        Ok((count, total))
    }

    /// Record and queue a newly discovered URL.
    ///
    /// Returns `Ok(true)` if the URL was new. Re-adding a known URL,
    /// completed or not, is a no-op. Malformed URLs are logged and dropped.
    pub fn add_url(&self, url: &str) -> Result<bool, FrontierError> {
        let normalized = match url_utils::normalize(url) {
            Ok(normalized) => normalized,
            Err(e) => {
                tracing::debug!("Dropping URL: {}", e);
                return Ok(false);
            }
        };
        let hash = url_utils::url_hash(&normalized).to_hex();

        let mut queue = self.queue.lock();
        let record = UrlRecord::discovered(normalized.clone(), hash.clone());
        if !self.store.put_if_absent(&hash, &record)? {
            return Ok(false);
        }
        queue.push_back(normalized);
        Ok(true)
    }

    /// Next URL to fetch, or `None` when the queue is currently empty.
    ///
    /// Entries completed while they sat in the queue are skipped.
    pub fn get_next(&self) -> Result<Option<String>, FrontierError> {
        loop {
            let next = {
                let mut queue = self.queue.lock();
                match self.order {
                    QueueOrder::Lifo => queue.pop_back(),
                    QueueOrder::Fifo => queue.pop_front(),
                }
            };
            let Some(url) = next else {
                return Ok(None);
            };

            let hash = url_utils::url_hash(&url).to_hex();
            match self.store.get(&hash)? {
                Some(record) if record.completed => {
                    tracing::debug!(%url, "skipping already completed URL");
                    continue;
                }
                _ => return Ok(Some(url)),
            }
        }
    }

    /// Durably mark a URL as fetched. It will never be queued again.
    pub fn mark_complete(&self, url: &str) -> Result<(), FrontierError> {
        let normalized = match url_utils::normalize(url) {
            Ok(normalized) => normalized,
            Err(e) => {
                tracing::warn!("Cannot mark malformed URL complete: {}", e);
                return Ok(());
            }
        };
        let hash = url_utils::url_hash(&normalized).to_hex();

        let _queue = self.queue.lock();
        if self.store.get(&hash)?.is_none() {
            tracing::error!("Completed url {}, but have not seen it before", normalized);
        }
        self.store.put(
            &hash,
            &UrlRecord {
                url: normalized,
                hash: hash.clone(),
                completed: true,
            },
        )?;
        self.store.flush()?;
        Ok(())
    }

    /// True once `url` has been marked complete.
    pub fn is_completed(&self, url: &str) -> Result<bool, FrontierError> {
        let Ok(normalized) = url_utils::normalize(url) else {
            return Ok(false);
        };
        let hash = url_utils::url_hash(&normalized).to_hex();
        Ok(self.store.get(&hash)?.map(|r| r.completed).unwrap_or(false))
    }

    /// Number of queued URLs.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Snapshot of every durable record, sorted by URL.
    pub fn records(&self) -> Result<Vec<UrlRecord>, FrontierError> {
        let mut records = Vec::new();
        self.for_each_record(|record| {
            records.push(record);
            Ok(())
        })?;
        records.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(records)
    }

    /// Visit every durable record.
    pub fn for_each_record(
        &self,
        mut f: impl FnMut(UrlRecord) -> Result<(), StoreError>,
    ) -> Result<(), FrontierError> {
        self.store.iterate(&mut |_key, record| f(record))?;
        Ok(())
    }

    /// Counts come from a full scan of the store.
    pub fn stats(&self) -> Result<FrontierStats, FrontierError> {
        let mut total_records = 0;
        let mut completed = 0;
        self.store.iterate(&mut |_key, record| {
            total_records += 1;
            if record.completed {
                completed += 1;
            }
            Ok(())
        })?;

        Ok(FrontierStats {
            total_records,
            completed,
            queued: self.len(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontierStats {
    pub total_records: usize,
    pub completed: usize,
    pub queued: usize,
}

impl std::fmt::Display for FrontierStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Frontier: {} discovered, {} completed, {} queued",
            self.total_records, self.completed, self.queued
        )
    }
}
