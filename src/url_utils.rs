//! URL utilities for consistent crawling behavior across modules.
//!
//! Everything that needs a stable identity for a URL goes through
//! [`normalize`] and [`url_hash`], so the frontier, the filter and the
//! statistics all agree on what "the same page" means.

use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("Malformed URL '{url}': {reason}")]
    Malformed { url: String, reason: String },
}

impl UrlError {
    fn malformed(url: &str, reason: impl Into<String>) -> Self {
        UrlError::Malformed {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

/// Fixed-width SHA-256 digest of a normalized URL, used as the durable map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UrlHash([u8; 32]);

impl UrlHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for UrlHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Canonicalize an absolute URL into its key form.
///
/// Scheme and host are lowercased and default ports dropped by the `url`
/// parser itself. On top of that the fragment is removed and query pairs are
/// sorted, so `?b=2&a=1` and `?a=1&b=2` collapse to one key. An empty query
/// (`?` or `?&`) is dropped entirely.
///
/// The result is idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> Result<String, UrlError> {
    let trimmed = raw.trim();
    let mut url = Url::parse(trimmed).map_err(|e| UrlError::malformed(raw, e.to_string()))?;

    if url.cannot_be_a_base() {
        return Err(UrlError::malformed(raw, "not a hierarchical URL"));
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::malformed(raw, "missing host")),
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        if pairs.is_empty() {
            url.set_query(None);
        } else {
            pairs.sort();
            url.query_pairs_mut().clear().extend_pairs(pairs.iter());
        }
    }

    Ok(url.to_string())
}

/// Hash a normalized URL. Callers are expected to pass the output of [`normalize`].
pub fn url_hash(normalized: &str) -> UrlHash {
    let digest = Sha256::digest(normalized.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    UrlHash(bytes)
}

/// Strip the fragment without any other canonicalization.
pub fn defragment(url: &str) -> &str {
    match url.find('#') {
        Some(pos) => &url[..pos],
        None => url,
    }
}

pub fn extract_host(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_ascii_lowercase()))
}

/// True when `host` equals `domain` or is a subdomain of it on a label boundary.
///
/// `www.ics.uci.edu` matches `ics.uci.edu`; `evilics.uci.edu` and
/// `ics.uci.edu.attacker.com` do not.
pub fn host_matches_domain(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain.trim_start_matches('.').trim_end_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return false;
    }
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(&domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

pub fn convert_to_absolute_url(link: &str, base_url: &str) -> Result<String, String> {
    let base = Url::parse(base_url).map_err(|e| e.to_string())?;
    let absolute_url = base.join(link).map_err(|e| e.to_string())?;
    Ok(absolute_url.to_string())
}

/// Add https:// prefix for bare domains (CLI convenience).
pub fn normalize_url_for_cli(url: &str) -> String {
    let trimmed = url.trim();

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return trimmed.to_string();
    }

    format!("https://{}", trimmed)
}

pub fn is_html_content_type(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    lower.starts_with("text/html") || lower.starts_with("application/xhtml+xml")
}
