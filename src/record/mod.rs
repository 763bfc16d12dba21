//! Candidate records produced by extractors
//!
//! A [`CandidateRecord`] is transient: it lives from extraction until it is
//! upserted. It must pass [`CandidateRecord::validate`] before it reaches the
//! repository; invalid candidates are rejected, never coerced.

mod fingerprint;
mod validate;

pub use fingerprint::fingerprint;
pub use validate::{validate_source, validate_tag, ValidationError};

use chrono::{DateTime, Utc};

/// A record extracted from a page, not yet stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    pub source: String,
    pub title: String,
    pub url: String,
    pub tags: Vec<String>,
    pub observed_at: DateTime<Utc>,
}

impl CandidateRecord {
    /// Creates a candidate observed now
    pub fn new(
        source: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            url: url.into(),
            tags,
            observed_at: Utc::now(),
        }
    }

    /// Checks every field against the record rules
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate::validate_source(&self.source)?;
        validate::validate_title(&self.title)?;
        validate::validate_url(&self.url)?;
        for tag in &self.tags {
            validate_tag(tag)?;
        }
        Ok(())
    }

    /// Content identity of this record
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.source, &self.title, &self.url)
    }

    /// Tags in their persisted, comma-delimited form
    pub fn tags_csv(&self) -> String {
        self.tags.join(",")
    }
}

/// Splits a persisted tag string, dropping empty segments
pub fn split_tags(csv: &str) -> Vec<String> {
    csv.split(',')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
