pub mod backoff;
pub mod cli;
pub mod completion_detector;
pub mod config;
pub mod crawler;
pub mod export;
pub mod filter;
pub mod frontier;
pub mod logging;
pub mod metrics;
pub mod network;
pub mod parser;
pub mod politeness;
pub mod stats;
pub mod store;
pub mod text;
pub mod trap_detector;
pub mod url_utils;

// Re-export main types for library usage
pub use config::{CrawlerConfig, FilterConfig, QueueOrder, TrapConfig};
pub use crawler::{CrawlError, CrawlSummary, Crawler};
pub use filter::{Rejection, UrlFilter};
pub use frontier::{Frontier, FrontierError, FrontierStats, StartMode};
pub use network::{FetchError, FetchResponse, Fetcher, HttpClient};
pub use parser::extract_links;
pub use stats::{CrawlReport, CrawlStats};
pub use store::{KvStore, RedbStore, StoreError, UrlRecord};
pub use trap_detector::{TrapDetector, TrapVerdict};
pub use url_utils::{normalize, url_hash};
