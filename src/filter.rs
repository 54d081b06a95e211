//! Eligibility predicate for discovered URLs.
//!
//! Rules run in a fixed order and the first failing one rejects the URL:
//! scheme, allowed domain, file extension, then the structural trap rules
//! (filter parameters, wiki actions, repeated path segments, URL length,
//! calendar pages). Each structural rule can be switched off in
//! [`FilterConfig`].

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use url::Url;

use crate::config::FilterConfig;
use crate::url_utils;

lazy_static! {
    static ref DATE_SEGMENT: Regex =
        Regex::new(r"^\d{4}-\d{2}(-\d{2})?$").expect("Invalid date segment regex");
}

/// DokuWiki `do=` actions that only change the view of a page.
const WIKI_DO_ACTIONS: &[&str] = &[
    "edit", "diff", "revisions", "backlink", "media", "index", "recent", "login", "register",
    "resendpwd", "admin", "profile",
];

/// MediaWiki-style `action=` values.
const WIKI_ACTIONS: &[&str] = &[
    "edit", "diff", "history", "raw", "login", "info", "download", "upload", "purge",
];

/// Query keys that only ever point at a revision or a diff of an existing page.
const REVISION_KEYS: &[&str] = &["rev", "oldid", "diff", "difftype", "rev2[0]", "rev2[1]"];

const CALENDAR_KEYS: &[&str] = &["ical", "outlook-ical", "tribe-bar-date"];
const CALENDAR_DISPLAYS: &[&str] = &["past", "day", "list", "month", "week"];
const CALENDAR_SEGMENTS: &[&str] = &["events", "event", "calendar"];

/// Why a URL was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Malformed,
    Scheme,
    Domain,
    Extension,
    FilterParams,
    WikiAction,
    RepeatedSegments,
    TooLong,
    Calendar,
}

#[derive(Debug, Clone)]
pub struct UrlFilter {
    allowed_domains: Vec<String>,
    extensions: HashSet<String>,
    filter_prefixes: Vec<String>,
    config: FilterConfig,
}

impl UrlFilter {
    pub fn new(allowed_domains: &[String], config: &FilterConfig) -> Self {
        Self {
            allowed_domains: allowed_domains
                .iter()
                .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            extensions: config
                .disallowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            filter_prefixes: config
                .filter_query_prefixes
                .iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
            config: config.clone(),
        }
    }

    pub fn is_valid(&self, url: &str) -> bool {
        match self.check(url) {
            Ok(()) => true,
            Err(reason) => {
                tracing::trace!(url, ?reason, "rejected by filter");
                false
            }
        }
    }

    pub fn check(&self, url: &str) -> Result<(), Rejection> {
        let parsed = Url::parse(url).map_err(|_| Rejection::Malformed)?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Rejection::Scheme);
        }

        let host = parsed.host_str().ok_or(Rejection::Malformed)?;
        if !self
            .allowed_domains
            .iter()
            .any(|domain| url_utils::host_matches_domain(host, domain))
        {
            return Err(Rejection::Domain);
        }

        let path = parsed.path().to_ascii_lowercase();
        if self.config.reject_extensions && self.has_disallowed_extension(&path) {
            return Err(Rejection::Extension);
        }

        let query: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_ascii_lowercase()))
            .collect();

        if self.config.reject_filter_params && self.has_filter_params(&query) {
            return Err(Rejection::FilterParams);
        }
        if self.config.reject_wiki_actions && has_wiki_action(&query) {
            return Err(Rejection::WikiAction);
        }
        if self.config.reject_repeated_segments
            && has_repeated_segments(&path, self.config.max_repeated_segments)
        {
            return Err(Rejection::RepeatedSegments);
        }
        if self.config.reject_long_urls && url.len() > self.config.max_url_length {
            return Err(Rejection::TooLong);
        }
        if self.config.reject_calendar_pages && is_calendar_page(&path, &query) {
            return Err(Rejection::Calendar);
        }

        Ok(())
    }

    fn has_disallowed_extension(&self, path: &str) -> bool {
        let last_segment = path.rsplit('/').next().unwrap_or("");
        match last_segment.rsplit_once('.') {
            Some((_, ext)) => self.extensions.contains(ext),
            None => false,
        }
    }

    /// Two or more distinct filter-prefixed keys means a faceted listing.
    fn has_filter_params(&self, query: &[(String, String)]) -> bool {
        let keys: HashSet<&str> = query
            .iter()
            .map(|(k, _)| k.as_str())
            .filter(|k| self.filter_prefixes.iter().any(|p| k.starts_with(p.as_str())))
            .collect();
        keys.len() >= 2
    }
}

fn has_wiki_action(query: &[(String, String)]) -> bool {
    query.iter().any(|(key, value)| match key.as_str() {
        "do" => {
            WIKI_DO_ACTIONS.contains(&value.as_str()) || value.starts_with("export_")
        }
        "action" => WIKI_ACTIONS.contains(&value.as_str()),
        k => REVISION_KEYS.contains(&k),
    })
}

fn has_repeated_segments(path: &str, max_repeats: usize) -> bool {
    if max_repeats == 0 {
        return false;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let count = counts.entry(segment).or_insert(0);
        *count += 1;
        if *count >= max_repeats {
            return true;
        }
    }
    false
}

fn is_calendar_page(path: &str, query: &[(String, String)]) -> bool {
    let query_hit = query.iter().any(|(key, value)| {
        CALENDAR_KEYS.contains(&key.as_str())
            || (key == "eventdisplay" && CALENDAR_DISPLAYS.contains(&value.as_str()))
    });
    if query_hit {
        return true;
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    segments.iter().any(|s| CALENDAR_SEGMENTS.contains(s))
        && segments.iter().any(|s| DATE_SEGMENT.is_match(s))
}
