//! Link aggregator front pages
//!
//! Stories are `span.titleline > a`. Relative links (discussion pages such
//! as `item?id=...`) are resolved against the page URL.

use crate::extract::{element_text, fallback_record, resolve_link, selector, truncate_title, Extractor};
use crate::record::CandidateRecord;
use scraper::Html;
use url::Url;

#[derive(Debug, Clone)]
pub struct AggregatorExtractor {
    tags: Vec<String>,
}

impl AggregatorExtractor {
    pub fn new(tags: Vec<String>) -> Self {
        Self { tags }
    }

    fn stories(&self, source: &str, page_url: &Url, document: &Html) -> Vec<CandidateRecord> {
        let Some(story_selector) = selector("span.titleline > a") else {
            return Vec::new();
        };

        document
            .select(&story_selector)
            .filter_map(|a| {
                let href = resolve_link(a.value().attr("href")?, page_url)?;
                let text = element_text(&a);
                let title = if text.is_empty() {
                    "Untitled".to_string()
                } else {
                    truncate_title(&text)
                };
                Some(CandidateRecord::new(source, title, href, self.tags.clone()))
            })
            .collect()
    }
}

impl Extractor for AggregatorExtractor {
    fn extract(&self, source: &str, page_url: &Url, html: &str) -> Vec<CandidateRecord> {
        let document = Html::parse_document(html);
        let items = self.stories(source, page_url, &document);

        if items.is_empty() {
            tracing::debug!("No stories on {}, using page title", page_url);
            return vec![fallback_record(source, page_url, &document, &self.tags)];
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_url() -> Url {
        Url::parse("https://news.ycombinator.com/").unwrap()
    }

    fn extractor() -> AggregatorExtractor {
        AggregatorExtractor::new(vec!["hackernews".to_string(), "tech".to_string()])
    }

    #[test]
    fn test_extracts_stories() {
        let html = r#"
            <table>
              <tr class="athing"><td class="title">
                <span class="titleline"><a href="https://example.com/post">A Post</a>
                <span class="sitebit comhead"> (<a href="from?site=example.com">example.com</a>)</span></span>
              </td></tr>
              <tr class="athing"><td class="title">
                <span class="titleline"><a href="item?id=42">Ask HN: Something?</a></span>
              </td></tr>
            </table>"#;

        let records = extractor().extract("hackernews", &page_url(), html);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "A Post");
        assert_eq!(records[0].url, "https://example.com/post");
        assert_eq!(records[1].title, "Ask HN: Something?");
        assert_eq!(records[1].url, "https://news.ycombinator.com/item?id=42");
        assert!(records.iter().all(|r| r.validate().is_ok()));
    }

    #[test]
    fn test_skips_non_http_links() {
        let html = r#"
            <span class="titleline"><a href="javascript:void(0)">Bad</a></span>
            <span class="titleline"><a href="https://ok.example/">Good</a></span>"#;
        let records = extractor().extract("hackernews", &page_url(), html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Good");
    }

    #[test]
    fn test_empty_anchor_text_is_untitled() {
        let html = r#"<span class="titleline"><a href="https://ok.example/"> </a></span>"#;
        let records = extractor().extract("hackernews", &page_url(), html);
        assert_eq!(records[0].title, "Untitled");
    }

    #[test]
    fn test_falls_back_when_markup_drifts() {
        let html = r#"<html><head><title>Hacker News</title></head>
            <body><div class="story"><a href="https://x.io/">renamed markup</a></div></body></html>"#;
        let records = extractor().extract("hackernews", &page_url(), html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Hacker News");
        assert_eq!(records[0].url, "https://news.ycombinator.com/");
    }
}
