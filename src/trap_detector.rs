//! Heuristic crawler-trap detection.
//!
//! Two independent signals, checked in order:
//!
//! 1. **URL pattern repetition.** Every URL is reduced to a structural
//!    signature (host + path with digit runs collapsed, sorted query keys).
//!    Once a signature has been seen more than `max_pattern_repeat` times,
//!    further URLs with it are traps.
//! 2. **Content repetition.** Pages with enough tokens are fingerprinted from
//!    a head/middle/tail sample. Once `max_similar_content` URLs share a
//!    fingerprint, further pages with it are traps.
//!
//! Both tables live for the process lifetime and are never persisted.

use lazy_static::lazy_static;
use parking_lot::Mutex;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use url::Url;

use crate::config::{Config, TrapConfig};

lazy_static! {
    static ref DIGIT_RUN: Regex = Regex::new(r"\d+").expect("Invalid digit regex");
}

/// Outcome of a trap check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapVerdict {
    Clean,
    RepeatedPattern { signature: String, count: usize },
    SimilarContent { similar_pages: usize },
}

impl TrapVerdict {
    pub fn is_trap(&self) -> bool {
        !matches!(self, TrapVerdict::Clean)
    }
}

#[derive(Debug, Default)]
struct TrapTables {
    patterns: HashMap<String, usize>,
    fingerprints: HashMap<[u8; 32], Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapStats {
    pub signatures: usize,
    pub fingerprints: usize,
}

pub struct TrapDetector {
    config: TrapConfig,
    stable_keys: HashSet<String>,
    tables: Mutex<TrapTables>,
}

impl TrapDetector {
    pub fn new(config: TrapConfig) -> Self {
        let stable_keys = config
            .stable_query_keys
            .iter()
            .map(|k| k.to_ascii_lowercase())
            .collect();
        Self {
            config,
            stable_keys,
            tables: Mutex::new(TrapTables::default()),
        }
    }

    /// True when the page is a trap and its links must not be followed.
    pub fn check(&self, url: &str, tokens: &[String]) -> bool {
        self.inspect(url, tokens).is_trap()
    }

    pub fn inspect(&self, url: &str, tokens: &[String]) -> TrapVerdict {
        let signature = self.signature(url);
        // Fingerprint outside the lock; hashing a long page is the expensive part.
        let fingerprint = if tokens.len() >= self.config.min_content_tokens {
            Some(fingerprint(tokens))
        } else {
            None
        };

        let mut tables = self.tables.lock();

        let count = tables.patterns.entry(signature.clone()).or_insert(0);
        *count += 1;
        if *count > self.config.max_pattern_repeat {
            let count = *count;
            tracing::debug!(url, %signature, count, "URL pattern trap");
            return TrapVerdict::RepeatedPattern { signature, count };
        }

        let Some(fingerprint) = fingerprint else {
            return TrapVerdict::Clean;
        };

        let urls = tables.fingerprints.entry(fingerprint).or_default();
        if urls.len() >= self.config.max_similar_content {
            tracing::debug!(url, similar = urls.len(), "near-duplicate content trap");
            return TrapVerdict::SimilarContent {
                similar_pages: urls.len(),
            };
        }
        urls.push(url.to_string());
        TrapVerdict::Clean
    }

    /// Content floor applied by the crawl loop before a page counts.
    pub fn has_enough_content(&self, tokens: &[String]) -> bool {
        tokens.len() >= self.config.min_words_per_page
    }

    pub fn stats(&self) -> TrapStats {
        let tables = self.tables.lock();
        TrapStats {
            signatures: tables.patterns.len(),
            fingerprints: tables.fingerprints.len(),
        }
    }

    /// Structural signature of a URL.
    ///
    /// `https://a.edu/page/12?id=7&sort=3` becomes `a.edu/page/N?id=7&sort=N`
    /// when `id` is a stable key. Unparseable input is digit-collapsed as is.
    pub fn signature(&self, url: &str) -> String {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => return collapse_digits(url),
        };

        let host = parsed.host_str().unwrap_or("").to_ascii_lowercase();
        let mut signature = format!("{}{}", host, collapse_digits(parsed.path()));

        let mut pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| {
                let key = k.to_ascii_lowercase();
                let value = if self.stable_keys.contains(&key) {
                    v.into_owned()
                } else {
                    collapse_digits(&v)
                };
                (key, value)
            })
            .collect();
        pairs.sort();

        if !pairs.is_empty() {
            let query: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            signature.push('?');
            signature.push_str(&query.join("&"));
        }
        signature
    }
}

fn collapse_digits(s: &str) -> String {
    DIGIT_RUN.replace_all(s, "N").into_owned()
}

/// SHA-256 over a bounded sample of the token stream.
///
/// Short pages are hashed whole; longer ones contribute their head, middle
/// and tail so shared navigation boilerplate alone cannot make two pages
/// collide.
fn fingerprint(tokens: &[String]) -> [u8; 32] {
    let segment = Config::FINGERPRINT_SEGMENT_TOKENS;
    let mut hasher = Sha256::new();

    let mut feed = |slice: &[String]| {
        for token in slice {
            hasher.update(token.as_bytes());
            hasher.update(b" ");
        }
    };

    if tokens.len() <= segment * 3 {
        feed(tokens);
    } else {
        let mid_start = tokens.len() / 2 - segment / 2;
        feed(&tokens[..segment]);
        feed(&tokens[mid_start..mid_start + segment]);
        feed(&tokens[tokens.len() - segment..]);
    }

    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}
