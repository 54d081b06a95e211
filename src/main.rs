use rust_crawler::cli::{Cli, Commands, CrawlArgs};
use rust_crawler::config::{Config, ConfigError, QueueOrder};
use rust_crawler::crawler::{CrawlError, Crawler};
use rust_crawler::export::{export_to_jsonl, ExportRecord};
use rust_crawler::frontier::{Frontier, FrontierError};
use rust_crawler::logging::init_logging_in_data_dir;
use rust_crawler::network::{FetchError, HttpClient};
use rust_crawler::stats::{CrawlStats, StatsError};
use rust_crawler::store::{KvStore, RedbStore, StoreError};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MainError {
    #[error("Crawler error: {0}")]
    Crawl(#[from] CrawlError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Frontier error: {0}")]
    Frontier(#[from] FrontierError),

    #[error("Statistics error: {0}")]
    Stats(#[from] StatsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

fn export_frontier(frontier: &Frontier, output: &Path, pending_only: bool) -> Result<usize, MainError> {
    let records = frontier.records()?;
    let mut writer = BufWriter::new(File::create(output)?);
    export_to_jsonl(
        records.into_iter().map(ExportRecord::from),
        pending_only,
        &mut writer,
    )
    .map_err(|e| MainError::Export(e.to_string()))
}

/// Open an existing frontier without seeding or clearing it.
fn open_existing_frontier(data_dir: &Path) -> Result<Option<Frontier>, MainError> {
    let path = data_dir.join(Config::FRONTIER_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let store: Arc<dyn KvStore> = Arc::new(RedbStore::open(&path)?);
    Ok(Some(Frontier::new(store, QueueOrder::default())))
}

async fn run_crawl_command(args: CrawlArgs) -> Result<(), MainError> {
    let export_jsonl = args.export_jsonl;
    let config = args.into_config()?;
    std::fs::create_dir_all(&config.data_dir)?;
    let _log_guard = init_logging_in_data_dir(&config.data_dir)
        .map_err(|e| MainError::Logging(e.to_string()))?;

    println!(
        "Crawling {} ({} workers, {}ms per-host delay, {}s timeout)",
        config.seed_urls.join(", "),
        config.workers,
        config.politeness_delay_ms,
        config.request_timeout_secs
    );

    let http = HttpClient::new(config.user_agent.clone(), config.request_timeout_secs)?;
    let data_dir = config.data_dir.clone();
    let crawler = Crawler::new(config, Arc::new(http))?;
    tracing::info!(start_mode = ?crawler.start_mode(), "Frontier ready");

    let signal_crawler = crawler.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nReceived Ctrl+C, finishing in-flight pages...");
            tracing::info!("Shutdown requested");
            signal_crawler.stop();
        }
    });

    let summary = crawler.run().await?;

    if export_jsonl {
        let path = data_dir.join("frontier.jsonl");
        let count = export_frontier(crawler.frontier(), &path, false)?;
        println!("Exported {} URLs to {}", count, path.display());
    }

    println!("{}", summary);
    println!("Report: {}", data_dir.join(Config::REPORT_FILE).display());
    Ok(())
}

fn run_report_command(
    data_dir: &Path,
    top: usize,
    json: bool,
    report_domain: Option<String>,
) -> Result<(), MainError> {
    let stats =
        CrawlStats::load(&data_dir.join(Config::STATS_FILE))?.with_report_domain(report_domain);
    let report = stats.report(top);

    if json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| MainError::Export(e.to_string()))?;
        println!("{}", rendered);
    } else {
        print!("{}", report);
        if let Some(frontier) = open_existing_frontier(data_dir)? {
            println!("Frontier: {}", frontier.stats()?);
        }
    }
    Ok(())
}

fn run_export_command(data_dir: &Path, output: &Path, pending_only: bool) -> Result<(), MainError> {
    let frontier = open_existing_frontier(data_dir)?.ok_or_else(|| {
        MainError::Export(format!("no frontier found in {}", data_dir.display()))
    })?;

    let count = export_frontier(&frontier, output, pending_only)?;
    println!("Exported {} URLs to {}", count, output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), MainError> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Crawl(args) => run_crawl_command(args).await?,
        Commands::Report {
            data_dir,
            top,
            json,
            report_domain,
        } => run_report_command(&data_dir, top, json, report_domain)?,
        Commands::Export {
            data_dir,
            output,
            pending_only,
        } => run_export_command(&data_dir, &output, pending_only)?,
    }

    Ok(())
}
