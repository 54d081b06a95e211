use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{ConfigError, CrawlerConfig, QueueOrder};
use crate::url_utils::normalize_url_for_cli;

#[derive(Parser, Debug)]
#[command(name = "rust_crawler")]
#[command(about = "A polite, domain-restricted web crawler with a durable frontier")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl from the seed URLs, or pick up where the last run stopped.
    Crawl(CrawlArgs),

    /// Print the statistics saved by the last crawl.
    Report {
        #[arg(short, long, default_value = "./data", help = "Directory containing crawl state")]
        data_dir: PathBuf,

        #[arg(short, long, default_value_t = 50, help = "Number of top words to show")]
        top: usize,

        #[arg(long, help = "Print the report as JSON")]
        json: bool,

        #[arg(long, help = "Only list subdomains of this domain")]
        report_domain: Option<String>,
    },

    /// Dump frontier records as JSON Lines.
    Export {
        #[arg(short, long, default_value = "./data", help = "Directory containing crawl state")]
        data_dir: PathBuf,

        #[arg(short, long, default_value = "./frontier.jsonl", help = "Output JSONL file")]
        output: PathBuf,

        #[arg(long, help = "Only export URLs that have not been fetched yet")]
        pending_only: bool,
    },
}

/// Flags for `crawl`. Every flag overrides the matching config file value.
#[derive(Args, Debug)]
pub struct CrawlArgs {
    #[arg(short, long, help = "TOML config file")]
    pub config: Option<PathBuf>,

    #[arg(short, long = "seed", help = "Seed URL (repeatable)")]
    pub seeds: Vec<String>,

    #[arg(long = "domain", help = "Allowed domain suffix (repeatable)")]
    pub domains: Vec<String>,

    #[arg(short, long, help = "Directory for the frontier, statistics and logs")]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, help = "Number of concurrent workers")]
    pub workers: Option<usize>,

    #[arg(long, help = "Minimum delay between requests to one host, in milliseconds")]
    pub politeness_ms: Option<u64>,

    #[arg(short, long, help = "User agent string for requests")]
    pub user_agent: Option<String>,

    #[arg(short, long, help = "Request timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Seconds the frontier must stay empty before the crawl ends")]
    pub idle_timeout: Option<u64>,

    #[arg(long, help = "Queue order: lifo or fifo")]
    pub queue_order: Option<QueueOrder>,

    #[arg(long, help = "Seconds between report flushes (0 disables)")]
    pub report_interval: Option<u64>,

    #[arg(long, help = "Only list subdomains of this domain in the report")]
    pub report_domain: Option<String>,

    #[arg(long, conflicts_with = "restart", help = "Resume from saved frontier state")]
    pub resume: bool,

    #[arg(long, help = "Discard saved state and start from the seeds")]
    pub restart: bool,

    #[arg(long, help = "Write the frontier to <data-dir>/frontier.jsonl when done")]
    pub export_jsonl: bool,
}

impl CrawlArgs {
    /// Load the config file (or defaults) and apply the flags on top.
    pub fn into_config(self) -> Result<CrawlerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => CrawlerConfig::load(path)?,
            None => CrawlerConfig::default(),
        };

        if !self.seeds.is_empty() {
            config.seed_urls = self.seeds.iter().map(|s| normalize_url_for_cli(s)).collect();
        }
        if !self.domains.is_empty() {
            config.allowed_domains = self.domains;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(delay) = self.politeness_ms {
            config.politeness_delay_ms = delay;
        }
        if let Some(user_agent) = self.user_agent {
            config.user_agent = user_agent;
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout_secs = timeout;
        }
        if let Some(idle) = self.idle_timeout {
            config.idle_timeout_secs = idle;
        }
        if let Some(order) = self.queue_order {
            config.queue_order = order;
        }
        if let Some(interval) = self.report_interval {
            config.report_interval_secs = interval;
        }
        if let Some(domain) = self.report_domain {
            config.report_domain = Some(domain);
        }
        if self.resume {
            config.restart = false;
        }
        if self.restart {
            config.restart = true;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
