// Global configuration constants - single source of truth

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub struct Config;

impl Config {
    // Crawler timing
    pub const POLITENESS_DELAY_MS: u64 = 500;
    pub const IDLE_TIMEOUT_SECS: u64 = 30;
    pub const REPORT_INTERVAL_SECS: u64 = 60;
    pub const IDLE_BACKOFF_BASE_MS: u64 = 50;
    pub const IDLE_BACKOFF_MAX_MS: u64 = 1_000;

    // HTTP/Network config
    pub const REQUEST_TIMEOUT_SECS: u64 = 20;
    pub const MAX_CONTENT_SIZE: usize = 10 * 1024 * 1024; // 10MB
    pub const MAX_REDIRECTS: usize = 5;
    pub const POOL_IDLE_PER_HOST: usize = 4;
    pub const POOL_IDLE_TIMEOUT_SECS: u64 = 30;

    // Trap heuristics
    pub const MAX_PATTERN_REPEAT: usize = 10;
    pub const MAX_SIMILAR_CONTENT: usize = 5;
    pub const MIN_WORDS_PER_PAGE: usize = 50;
    pub const MIN_CONTENT_TOKENS: usize = 20;
    pub const FINGERPRINT_SEGMENT_TOKENS: usize = 200;

    // URL shape heuristics
    pub const MAX_REPEATED_SEGMENTS: usize = 3;
    pub const MAX_URL_LENGTH: usize = 300;

    // Reporting
    pub const TOP_WORDS: usize = 50;

    // File names under the data directory
    pub const FRONTIER_FILE: &'static str = "frontier.redb";
    pub const STATS_FILE: &'static str = "stats.json";
    pub const REPORT_FILE: &'static str = "report.txt";
    pub const LOG_DIR: &'static str = "logs";
}

/// Non-content file extensions rejected by the URL filter.
pub const DEFAULT_DISALLOWED_EXTENSIONS: &[&str] = &[
    "css", "js", "bmp", "gif", "jpeg", "jpg", "ico", "png", "tiff", "tif", "svg", "webp",
    "mid", "mp2", "mp3", "mp4", "wav", "avi", "mov", "mpeg", "mpg", "ram", "m4v", "mkv",
    "ogg", "ogv", "flac", "wmv", "wma", "swf", "rm", "smil", "pdf", "ps", "eps", "tex",
    "bib", "ppt", "pptx", "pps", "ppsx", "doc", "docx", "xls", "xlsx", "odt", "ods",
    "odp", "rtf", "names", "data", "dat", "csv", "arff", "sql", "exe", "msi", "bin",
    "dll", "dmg", "iso", "apk", "jar", "psd", "epub", "cnf", "sha1", "thmx", "mso",
    "bz2", "tar", "7z", "tgz", "gz", "xz", "z", "lzma", "zip", "rar", "woff", "woff2",
    "ttf",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Order in which queued URLs are handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOrder {
    /// Most recently discovered first (depth-first bias).
    #[default]
    Lifo,
    /// Oldest discovery first (breadth-first).
    Fifo,
}

impl std::str::FromStr for QueueOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lifo" => Ok(QueueOrder::Lifo),
            "fifo" => Ok(QueueOrder::Fifo),
            other => Err(format!("unknown queue order '{}' (expected lifo or fifo)", other)),
        }
    }
}

/// URL filter rules. Scheme and domain checks are always on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub disallowed_extensions: Vec<String>,
    pub reject_extensions: bool,
    /// Query keys starting with one of these count as "filter" parameters.
    pub filter_query_prefixes: Vec<String>,
    pub reject_filter_params: bool,
    pub reject_wiki_actions: bool,
    pub reject_repeated_segments: bool,
    pub max_repeated_segments: usize,
    pub reject_long_urls: bool,
    pub max_url_length: usize,
    pub reject_calendar_pages: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            disallowed_extensions: DEFAULT_DISALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            reject_extensions: true,
            filter_query_prefixes: vec!["filter".to_string(), "tribe".to_string()],
            reject_filter_params: true,
            reject_wiki_actions: true,
            reject_repeated_segments: true,
            max_repeated_segments: Config::MAX_REPEATED_SEGMENTS,
            reject_long_urls: true,
            max_url_length: Config::MAX_URL_LENGTH,
            reject_calendar_pages: true,
        }
    }
}

/// Thresholds for the trap detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrapConfig {
    pub max_pattern_repeat: usize,
    pub max_similar_content: usize,
    pub min_words_per_page: usize,
    pub min_content_tokens: usize,
    /// Query keys whose values stay verbatim in the structural signature.
    pub stable_query_keys: Vec<String>,
}

impl Default for TrapConfig {
    fn default() -> Self {
        Self {
            max_pattern_repeat: Config::MAX_PATTERN_REPEAT,
            max_similar_content: Config::MAX_SIMILAR_CONTENT,
            min_words_per_page: Config::MIN_WORDS_PER_PAGE,
            min_content_tokens: Config::MIN_CONTENT_TOKENS,
            stable_query_keys: ["id", "page_id", "p", "lang"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Complete crawler configuration, loadable from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub seed_urls: Vec<String>,
    pub allowed_domains: Vec<String>,
    pub data_dir: PathBuf,
    pub workers: usize,
    pub politeness_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub idle_timeout_secs: u64,
    /// Start fresh (clear durable state) instead of resuming.
    pub restart: bool,
    pub queue_order: QueueOrder,
    pub report_interval_secs: u64,
    pub top_words: usize,
    /// Limit the report's subdomain table to hosts under this domain.
    pub report_domain: Option<String>,
    pub filter: FilterConfig,
    pub traps: TrapConfig,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            seed_urls: vec![
                "https://www.ics.uci.edu".to_string(),
                "https://www.cs.uci.edu".to_string(),
                "https://www.informatics.uci.edu".to_string(),
                "https://www.stat.uci.edu".to_string(),
            ],
            allowed_domains: vec![
                "ics.uci.edu".to_string(),
                "cs.uci.edu".to_string(),
                "informatics.uci.edu".to_string(),
                "stat.uci.edu".to_string(),
            ],
            data_dir: PathBuf::from("./data"),
            workers: 4,
            politeness_delay_ms: Config::POLITENESS_DELAY_MS,
            request_timeout_secs: Config::REQUEST_TIMEOUT_SECS,
            user_agent: "RustCrawler/1.0".to_string(),
            idle_timeout_secs: Config::IDLE_TIMEOUT_SECS,
            restart: false,
            queue_order: QueueOrder::default(),
            report_interval_secs: Config::REPORT_INTERVAL_SECS,
            top_words: Config::TOP_WORDS,
            report_domain: None,
            filter: FilterConfig::default(),
            traps: TrapConfig::default(),
        }
    }
}

impl CrawlerConfig {
    /// Load a config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be at least 1".into()));
        }
        if self.seed_urls.is_empty() {
            return Err(ConfigError::Invalid("at least one seed URL is required".into()));
        }
        if self.allowed_domains.is_empty() {
            return Err(ConfigError::Invalid("at least one allowed domain is required".into()));
        }
        for seed in &self.seed_urls {
            crate::url_utils::normalize(seed)
                .map_err(|e| ConfigError::Invalid(format!("bad seed URL: {}", e)))?;
        }
        if self.traps.max_pattern_repeat == 0 || self.traps.max_similar_content == 0 {
            return Err(ConfigError::Invalid("trap thresholds must be positive".into()));
        }
        Ok(())
    }

    pub fn frontier_path(&self) -> PathBuf {
        self.data_dir.join(Config::FRONTIER_FILE)
    }

    pub fn stats_path(&self) -> PathBuf {
        self.data_dir.join(Config::STATS_FILE)
    }

    pub fn report_path(&self) -> PathBuf {
        self.data_dir.join(Config::REPORT_FILE)
    }
}
