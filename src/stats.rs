//! Crawl statistics: unique pages, per-page word counts, global word
//! frequencies and per-subdomain page counts.
//!
//! The aggregate is merge-only. Each page is counted once no matter how many
//! times it is reported, and the whole thing round-trips through JSON so a
//! resumed crawl keeps accumulating where the last run stopped.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

use crate::url_utils;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StatsData {
    /// Defragmented URL → token count. Keys are the unique-page set.
    page_word_counts: BTreeMap<String, usize>,
    word_frequencies: HashMap<String, u64>,
    subdomains: BTreeMap<String, usize>,
}

#[derive(Debug, Default)]
pub struct CrawlStats {
    data: Mutex<StatsData>,
    /// When set, the subdomain table only lists hosts under this domain.
    report_domain: Option<String>,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the subdomain table of reports to hosts under `domain`.
    /// Every host is still tracked, so the choice can change between runs.
    pub fn with_report_domain(mut self, domain: Option<String>) -> Self {
        self.report_domain = domain;
        self
    }

    /// Load saved statistics. A missing file yields empty statistics.
    pub fn load(path: &Path) -> Result<Self, StatsError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path)?;
        let data: StatsData = serde_json::from_str(&raw)?;
        tracing::info!(
            pages = data.page_word_counts.len(),
            "Loaded crawl statistics from {}",
            path.display()
        );
        Ok(Self {
            data: Mutex::new(data),
            report_domain: None,
        })
    }

    /// Count a fetched page. Returns false if the page was already counted.
    pub fn record_page(&self, url: &str, tokens: &[String]) -> bool {
        let page = url_utils::defragment(url).to_string();
        let host = url_utils::extract_host(&page);

        let mut data = self.data.lock();
        if data.page_word_counts.contains_key(&page) {
            return false;
        }

        data.page_word_counts.insert(page, tokens.len());
        for token in tokens {
            *data.word_frequencies.entry(token.clone()).or_insert(0) += 1;
        }
        if let Some(host) = host {
            *data.subdomains.entry(host).or_insert(0) += 1;
        }
        true
    }

    pub fn unique_pages(&self) -> usize {
        self.data.lock().page_word_counts.len()
    }

    pub fn report(&self, top_n: usize) -> CrawlReport {
        let data = self.data.lock();

        let longest_page = data
            .page_word_counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(url, words)| (url.clone(), *words));

        let mut top_words: Vec<(String, u64)> = data
            .word_frequencies
            .iter()
            .map(|(word, count)| (word.clone(), *count))
            .collect();
        top_words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_words.truncate(top_n);

        CrawlReport {
            unique_pages: data.page_word_counts.len(),
            longest_page,
            top_words,
            subdomains: data
                .subdomains
                .iter()
                .filter(|(host, _)| match &self.report_domain {
                    Some(domain) => url_utils::host_matches_domain(host, domain),
                    None => true,
                })
                .map(|(host, count)| (host.clone(), *count))
                .collect(),
        }
    }

    /// Persist the aggregate as JSON. Written to a sibling temp file first.
    pub fn save(&self, path: &Path) -> Result<(), StatsError> {
        let json = {
            let data = self.data.lock();
            serde_json::to_vec(&*data)?
        };
        write_atomically(path, &json)
    }

    /// Write the human-readable report.
    pub fn write_report(&self, path: &Path, top_n: usize) -> Result<(), StatsError> {
        let report = self.report(top_n);
        let body = format!(
            "Generated {}\n\n{}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            report
        );
        write_atomically(path, body.as_bytes())
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StatsError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Point-in-time summary of the statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    pub unique_pages: usize,
    /// URL and word count of the longest page.
    pub longest_page: Option<(String, usize)>,
    /// Most frequent words, highest count first.
    pub top_words: Vec<(String, u64)>,
    /// Host → unique pages, sorted by host.
    pub subdomains: Vec<(String, usize)>,
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Unique pages: {}", self.unique_pages)?;
        match &self.longest_page {
            Some((url, words)) => writeln!(f, "Longest page: {} ({} words)", url, words)?,
            None => writeln!(f, "Longest page: none")?,
        }

        writeln!(f)?;
        writeln!(f, "Top {} words:", self.top_words.len())?;
        for (rank, (word, count)) in self.top_words.iter().enumerate() {
            writeln!(f, "{:>4}. {} - {}", rank + 1, word, count)?;
        }

        writeln!(f)?;
        writeln!(f, "Subdomains ({}):", self.subdomains.len())?;
        for (host, count) in &self.subdomains {
            writeln!(f, "{}, {}", host, count)?;
        }
        Ok(())
    }
}
