//! Extraction of candidate records from raw HTML
//!
//! Each source variant implements [`Extractor`]. The variant for a target is
//! chosen once, from configuration, through [`ExtractorKind`]; there is no
//! runtime lookup by name.
//!
//! Extraction never fails. Markup that does not match a variant's selectors,
//! including outright malformed HTML, degrades to a single fallback record
//! built from the page `<title>` (or the source name when there is none).

mod aggregator;
mod document;
mod listing;

pub use aggregator::AggregatorExtractor;
pub use document::DocumentExtractor;
pub use listing::ListingExtractor;

use crate::record::CandidateRecord;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use url::Url;

/// Longest title kept from markup, in characters
const MAX_TITLE_CHARS: usize = 512;

/// Longest URL accepted from markup, in bytes
const MAX_URL_LEN: usize = 2048;

/// Turns one fetched page into zero or more candidate records
pub trait Extractor {
    /// Extracts records in document order
    ///
    /// Implementations must fall back to [`fallback_record`] rather than
    /// return an empty list.
    fn extract(&self, source: &str, page_url: &Url, html: &str) -> Vec<CandidateRecord>;
}

/// Source variant selected in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    /// Paper-listing pages: `dl > dt` entries with an `/abs/` link and a `dd` title
    Listing,
    /// Link aggregators: `span.titleline > a` story links
    Aggregator,
    /// A single document, recorded by its page title
    Document,
}

impl ExtractorKind {
    /// Stable lowercase name, also the default tag for the variant
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Aggregator => "aggregator",
            Self::Document => "document",
        }
    }

    /// Builds the extractor for this variant
    ///
    /// `tags` are attached to every record; the variant name is used when
    /// the target configures none.
    pub fn build(&self, tags: Option<Vec<String>>) -> SourceExtractor {
        let tags = tags.unwrap_or_else(|| vec![self.as_str().to_string()]);
        match self {
            Self::Listing => SourceExtractor::Listing(ListingExtractor::new(tags)),
            Self::Aggregator => SourceExtractor::Aggregator(AggregatorExtractor::new(tags)),
            Self::Document => SourceExtractor::Document(DocumentExtractor::new(tags)),
        }
    }
}

impl std::fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured extractor, one variant per source kind
#[derive(Debug, Clone)]
pub enum SourceExtractor {
    Listing(ListingExtractor),
    Aggregator(AggregatorExtractor),
    Document(DocumentExtractor),
}

impl Extractor for SourceExtractor {
    fn extract(&self, source: &str, page_url: &Url, html: &str) -> Vec<CandidateRecord> {
        match self {
            Self::Listing(e) => e.extract(source, page_url, html),
            Self::Aggregator(e) => e.extract(source, page_url, html),
            Self::Document(e) => e.extract(source, page_url, html),
        }
    }
}

/// Builds the single record used when a page yields nothing else
///
/// Title is the page `<title>`, or `source` when the page has none.
pub fn fallback_record(
    source: &str,
    page_url: &Url,
    document: &Html,
    tags: &[String],
) -> CandidateRecord {
    let title = page_title(document).unwrap_or_else(|| source.to_string());
    CandidateRecord::new(
        source,
        truncate_title(&title),
        page_url.as_str(),
        tags.to_vec(),
    )
}

/// Extracts the page title from the HTML document
pub(crate) fn page_title(document: &Html) -> Option<String> {
    let title_selector = selector("title")?;

    document
        .select(&title_selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

/// Parses a CSS selector; `None` sends the caller down its fallback path
pub(crate) fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!("Invalid selector '{}': {:?}", css, e);
            None
        }
    }
}

/// Text content of an element, whitespace collapsed
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates to the record title limit on a character boundary
pub(crate) fn truncate_title(title: &str) -> String {
    title.chars().take(MAX_TITLE_CHARS).collect()
}

/// Resolves a link href to an absolute http(s) URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs and fragment-only anchors
/// - Invalid URLs or URLs too long to store
/// - Non-HTTP(S) URLs after resolution
pub(crate) fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }

    let absolute = absolute.to_string();
    if absolute.len() > MAX_URL_LEN {
        tracing::debug!("Skipping link longer than {} bytes", MAX_URL_LEN);
        return None;
    }

    Some(absolute)
}
