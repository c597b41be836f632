//! Remote file listing
//!
//! The candidate files come from an HTML index page: every anchor `href` is
//! taken as a filename relative to the page URL. Duplicates are returned as-is;
//! the caller deduplicates on registration.
//!
//! Commented-out markup is ignored and character references in attribute
//! values (`&amp;`, `&#39;`, ...) are decoded.

use std::borrow::Cow;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use reqwest::Client;
use tracing::debug;

static COMMENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("hardcoded pattern is valid"));

/// An `<a ...>` tag; group 1 is its attribute text. Quoted values may hold `>`.
static ANCHOR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a(\s(?:[^>"']|"[^"]*"|'[^']*')*)>"#).expect("hardcoded pattern is valid")
});

/// One attribute: name, then an optional double-quoted, single-quoted or bare value
static ATTRIBUTE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
        .expect("hardcoded pattern is valid")
});

static ENTITY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:#[xX]([0-9a-fA-F]+)|#([0-9]+)|(amp|lt|gt|quot|apos));")
        .expect("hardcoded pattern is valid")
});

/// Listing errors
#[derive(Debug, thiserror::Error)]
pub enum ListError {
    /// Request failed
    #[error("network error: {0}")]
    NetworkError(String),

    /// Index page returned a non-success status
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),
}

/// Source of candidate filenames
#[async_trait]
pub trait FileLister: Send + Sync {
    /// Filenames available under `url`, in listing order
    async fn list(&self, url: &str) -> Result<Vec<String>, ListError>;
}

/// Lists files by scraping links from an HTML directory index
#[derive(Debug, Clone)]
pub struct HtmlIndexLister {
    client: Client,
}

impl HtmlIndexLister {
    /// Create a lister using `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FileLister for HtmlIndexLister {
    async fn list(&self, url: &str) -> Result<Vec<String>, ListError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ListError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ListError::HttpStatus(response.status().as_u16()));
        }

        let page = response
            .text()
            .await
            .map_err(|e| ListError::NetworkError(e.to_string()))?;
        let links = extract_links(&page);
        debug!(url = %url, links = links.len(), "Index page parsed");
        Ok(links)
    }
}

/// Fixed list of filenames, for callers that already know what to fetch
#[derive(Debug, Clone, Default)]
pub struct StaticLister {
    filenames: Vec<String>,
}

impl StaticLister {
    /// Lister always returning `filenames`
    pub fn new<I, S>(filenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filenames: filenames.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl FileLister for StaticLister {
    async fn list(&self, _url: &str) -> Result<Vec<String>, ListError> {
        Ok(self.filenames.clone())
    }
}

/// Extract every anchor `href` value from an HTML document
///
/// An anchor carrying several `href` attributes contributes each of them, in
/// order. Empty values are skipped.
pub fn extract_links(html: &str) -> Vec<String> {
    let html = COMMENT_PATTERN.replace_all(html, "");

    let mut links = Vec::new();
    for anchor in ANCHOR_PATTERN.captures_iter(&html) {
        let Some(attributes) = anchor.get(1) else {
            continue;
        };
        for attr in ATTRIBUTE_PATTERN.captures_iter(attributes.as_str()) {
            if !attr[1].eq_ignore_ascii_case("href") {
                continue;
            }
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .or_else(|| attr.get(4))
                .map_or("", |m| m.as_str());
            if !value.is_empty() {
                links.push(unescape(value).into_owned());
            }
        }
    }
    links
}

/// Decode the basic named and numeric character references
fn unescape(value: &str) -> Cow<'_, str> {
    ENTITY_PATTERN.replace_all(value, |caps: &Captures| {
        let decoded = if let Some(hex) = caps.get(1) {
            u32::from_str_radix(hex.as_str(), 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = caps.get(2) {
            dec.as_str().parse().ok().and_then(char::from_u32)
        } else {
            match caps.get(3).map(|m| m.as_str()) {
                Some("amp") => Some('&'),
                Some("lt") => Some('<'),
                Some("gt") => Some('>'),
                Some("quot") => Some('"'),
                Some("apos") => Some('\''),
                _ => None,
            }
        };
        // Malformed references are kept verbatim
        decoded.map_or_else(|| caps[0].to_string(), String::from)
    })
}
