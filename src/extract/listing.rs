//! Paper-listing pages
//!
//! Entries are `dl > dt` elements holding an `/abs/` link; the title lives in
//! the `dd` that follows each `dt`.

use crate::extract::{
    element_text, fallback_record, resolve_link, selector, truncate_title, Extractor,
};
use crate::record::CandidateRecord;
use scraper::{ElementRef, Html};
use url::Url;

#[derive(Debug, Clone)]
pub struct ListingExtractor {
    tags: Vec<String>,
}

impl ListingExtractor {
    pub fn new(tags: Vec<String>) -> Self {
        Self { tags }
    }

    fn entries(&self, source: &str, page_url: &Url, document: &Html) -> Vec<CandidateRecord> {
        let (Some(dt_selector), Some(link_selector)) =
            (selector("dl > dt"), selector(r#"a[href^="/abs/"]"#))
        else {
            return Vec::new();
        };

        let mut items = Vec::new();
        for dt in document.select(&dt_selector) {
            let Some(href) = dt
                .select(&link_selector)
                .next()
                .and_then(|a| a.value().attr("href"))
            else {
                continue;
            };

            let Some(abs_url) = resolve_link(href, page_url) else {
                continue;
            };

            let title = following_dd(&dt)
                .map(|dd| truncate_title(&element_text(&dd)))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| truncate_title(&abs_url));

            items.push(CandidateRecord::new(
                source,
                title,
                abs_url,
                self.tags.clone(),
            ));
        }
        items
    }
}

/// The `dd` sibling describing a `dt`, stopping at the next `dt`
fn following_dd<'a>(dt: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    dt.next_siblings()
        .filter_map(ElementRef::wrap)
        .take_while(|el| el.value().name() != "dt")
        .find(|el| el.value().name() == "dd")
}

impl Extractor for ListingExtractor {
    fn extract(&self, source: &str, page_url: &Url, html: &str) -> Vec<CandidateRecord> {
        let document = Html::parse_document(html);
        let items = self.entries(source, page_url, &document);

        if items.is_empty() {
            tracing::debug!("No listing entries on {}, using page title", page_url);
            return vec![fallback_record(source, page_url, &document, &self.tags)];
        }
        items
    }
}
