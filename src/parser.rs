use lazy_static::lazy_static;
use scraper::{Html, Selector};
use thiserror::Error;

use crate::url_utils;

lazy_static! {
    static ref LINK_SELECTOR: Selector = Selector::parse("a[href]").expect("Invalid CSS selector");
}

/// Elements whose text is never shown to a reader.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Content type '{content_type}' of {url} is not HTML")]
    NotHtml { url: String, content_type: String },
}

/// Links and visible text of one HTML page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    pub links: Vec<String>,
    pub text: String,
}

/// Decode and parse a fetched body.
///
/// A missing content type is treated as HTML; anything else that does not
/// look like HTML is a [`ParseError`]. The body is decoded with the declared
/// charset, falling back to lossy UTF-8.
pub fn parse_page(
    body: &[u8],
    content_type: Option<&str>,
    base_url: &str,
) -> Result<ParsedPage, ParseError> {
    if let Some(content_type) = content_type {
        if !url_utils::is_html_content_type(content_type) {
            return Err(ParseError::NotHtml {
                url: base_url.to_string(),
                content_type: content_type.to_string(),
            });
        }
    }

    let html = decode_body(body, content_type);
    let document = Html::parse_document(&html);
    Ok(ParsedPage {
        links: links_in(&document, base_url),
        text: text_in(&document),
    })
}

/// Charset parameter of a content type, lowercased.
fn charset_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_ascii_lowercase())
        } else {
            None
        }
    })
}

/// Decode a page body. Latin-1 family charsets map bytes straight to code
/// points; everything else is read as UTF-8 with invalid bytes replaced.
fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    let charset = content_type.and_then(charset_of);
    match charset.as_deref() {
        Some("iso-8859-1" | "latin1" | "latin-1" | "iso8859-1" | "windows-1252" | "cp1252")
            if std::str::from_utf8(body).is_err() =>
        {
            body.iter().map(|&b| b as char).collect()
        }
        _ => String::from_utf8_lossy(body).into_owned(),
    }
}

/// Extract every hyperlink as an absolute, defragmented URL.
///
/// # Examples
/// ```
/// use rust_crawler::parser::extract_links;
///
/// let html = r#"<html><body><a href="/about#team">About</a></body></html>"#;
/// let links = extract_links(html, "https://www.ics.uci.edu/index.html");
/// assert_eq!(links, vec!["https://www.ics.uci.edu/about"]);
/// ```
pub fn extract_links(html_body: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html_body);
    links_in(&document, base_url)
}

/// Visible text of the page with script and style content removed.
pub fn extract_text(html_body: &str) -> String {
    let document = Html::parse_document(html_body);
    text_in(&document)
}

fn links_in(document: &Html, base_url: &str) -> Vec<String> {
    let mut links = Vec::new();

    for element in document.select(&LINK_SELECTOR) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let cleaned_href = href.trim();

        // Skip empty links, in-page anchors, javascript links, mailto, tel, etc.
        if cleaned_href.is_empty()
            || cleaned_href.starts_with('#')
            || cleaned_href.starts_with("javascript:")
            || cleaned_href.starts_with("mailto:")
            || cleaned_href.starts_with("tel:")
            || cleaned_href.starts_with("data:")
            || cleaned_href.starts_with("file:")
        {
            continue;
        }

        match url_utils::convert_to_absolute_url(cleaned_href, base_url) {
            Ok(absolute) => links.push(url_utils::defragment(&absolute).to_string()),
            Err(e) => tracing::trace!(href = cleaned_href, "unresolvable link: {}", e),
        }
    }

    links
}

fn text_in(document: &Html) -> String {
    let mut text = String::new();

    for node in document.root_element().descendants() {
        let Some(chunk) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|e| HIDDEN_ELEMENTS.contains(&e.name()))
                .unwrap_or(false)
        });
        if hidden {
            continue;
        }
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(chunk);
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.ics.uci.edu/dept/index.html";

    #[test]
    fn test_extract_absolute_links() {
        let html = "<html><body><a href=\"https://www.ics.uci.edu/page1\">Link 1</a><a href=\"https://other-site.com/about\">External Link</a></body></html>";

        let links = extract_links(html, BASE);
        assert_eq!(
            links,
            vec![
                "https://www.ics.uci.edu/page1".to_string(),
                "https://other-site.com/about".to_string(),
            ]
        );
    }

    #[test]
    fn test_relative_links_are_resolved() {
        let html = "<html><body><a href=\"/about\">About</a><a href=\"../parent\">Parent</a><a href=\"relative/path\">Relative Path</a><a href=\"#section\">Anchor</a></body></html>";

        let links = extract_links(html, BASE);
        assert_eq!(
            links,
            vec![
                "https://www.ics.uci.edu/about".to_string(),
                "https://www.ics.uci.edu/parent".to_string(),
                "https://www.ics.uci.edu/dept/relative/path".to_string(),
            ]
        );
    }

    #[test]
    fn test_fragments_are_stripped() {
        let html = "<a href=\"/faq#q1\">Q1</a><a href=\"/faq#q2\">Q2</a>";
        let links = extract_links(html, BASE);
        assert_eq!(
            links,
            vec![
                "https://www.ics.uci.edu/faq".to_string(),
                "https://www.ics.uci.edu/faq".to_string(),
            ]
        );
    }

    #[test]
    fn test_non_http_schemes_skipped() {
        let html = "<a href=\"mailto:a@uci.edu\">m</a><a href=\"javascript:void(0)\">j</a><a href=\"tel:123\">t</a><a href=\"  \">blank</a>";
        assert!(extract_links(html, BASE).is_empty());
    }

    #[test]
    fn test_malformed_html() {
        let html = "<html><body><a href=\"https://example.com\">Valid Link</a><a href=\"https://broken.com\">Broken Link<div>Unclosed div<p>Some text without closing tag</body></html>";

        let links = extract_links(html, BASE);
        assert_eq!(
            links,
            vec![
                "https://example.com/".to_string(),
                "https://broken.com/".to_string(),
            ]
        );
    }

    #[test]
    fn test_empty_html() {
        assert!(extract_links("", BASE).is_empty());
        assert_eq!(extract_text(""), "");
    }

    #[test]
    fn test_extract_text_skips_script_and_style() {
        let html = "<html><head><style>body { color: red }</style><script>var x = 1;</script></head><body><h1>Research</h1><p>Machine <b>learning</b> group</p></body></html>";
        assert_eq!(extract_text(html), "Research Machine learning group");
    }

    #[test]
    fn test_parse_page_rejects_non_html() {
        let err = parse_page(b"%PDF-1.4", Some("application/pdf"), BASE).unwrap_err();
        assert!(matches!(err, ParseError::NotHtml { .. }));
    }

    #[test]
    fn test_parse_page_decodes_latin1_body() {
        let body = b"<p>Caf\xE9 research</p><a href=\"/next\">n</a>";
        let page = parse_page(body, Some("text/html; charset=iso-8859-1"), BASE).unwrap();
        assert_eq!(page.links, vec!["https://www.ics.uci.edu/next".to_string()]);
        assert!(page.text.contains("Caf\u{e9} research"));
    }

    #[test]
    fn test_parse_page_tolerates_invalid_utf8() {
        let body = b"<p>bad \xFF\xFE byte</p><a href=\"/after\">n</a>";
        let page = parse_page(body, Some("text/html"), BASE).unwrap();
        assert_eq!(page.links, vec!["https://www.ics.uci.edu/after".to_string()]);
        assert!(page.text.contains("byte"));
    }

    #[test]
    fn test_charset_of() {
        assert_eq!(charset_of("text/html; charset=ISO-8859-1").as_deref(), Some("iso-8859-1"));
        assert_eq!(charset_of("text/html;charset=\"utf-8\"").as_deref(), Some("utf-8"));
        assert_eq!(charset_of("text/html"), None);
    }

    #[test]
    fn test_parse_page() {
        let body = b"<html><body><p>Hello crawler</p><a href=\"/next\">n</a></body></html>";
        let page = parse_page(body, Some("text/html; charset=utf-8"), BASE).unwrap();
        assert_eq!(page.links, vec!["https://www.ics.uci.edu/next".to_string()]);
        assert_eq!(page.text, "Hello crawler n");
    }
}
