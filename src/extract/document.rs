//! Single-document sources: one record per page, titled by `<title>`

use crate::extract::{fallback_record, Extractor};
use crate::record::CandidateRecord;
use scraper::Html;
use url::Url;

#[derive(Debug, Clone)]
pub struct DocumentExtractor {
    tags: Vec<String>,
}

impl DocumentExtractor {
    pub fn new(tags: Vec<String>) -> Self {
        Self { tags }
    }
}

impl Extractor for DocumentExtractor {
    fn extract(&self, source: &str, page_url: &Url, html: &str) -> Vec<CandidateRecord> {
        let document = Html::parse_document(html);
        vec![fallback_record(source, page_url, &document, &self.tags)]
    }
}
