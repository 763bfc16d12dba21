//! Export shapes handed to presentation layers
//!
//! Tags are kept as a comma-delimited string in storage and become a list
//! here; empty segments are dropped.

use crate::record::split_tags;
use crate::storage::{JobRunRecord, StoredRecord};
use serde::Serialize;

/// A stored record as exported
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordExport {
    pub id: i64,
    pub source: String,
    pub title: String,
    pub url: String,
    pub tags: Vec<String>,
    pub fetched_at: String,
    pub content_hash: String,
}

impl From<&StoredRecord> for RecordExport {
    fn from(record: &StoredRecord) -> Self {
        Self {
            id: record.id,
            source: record.source.clone(),
            title: record.title.clone(),
            url: record.url.clone(),
            tags: split_tags(&record.tags),
            fetched_at: record.fetched_at.clone(),
            content_hash: record.content_hash.clone(),
        }
    }
}

/// A job run as exported
///
/// `created_at` and `started_at` coincide: a run row is created when it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatusExport {
    pub id: i64,
    pub name: String,
    pub run_id: String,
    pub status: String,
    pub message: String,
    pub created_at: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

impl From<&JobRunRecord> for JobStatusExport {
    fn from(run: &JobRunRecord) -> Self {
        Self {
            id: run.id,
            name: run.job_id.clone(),
            run_id: run.run_id.clone(),
            status: run.status.to_db_string().to_string(),
            message: run.message.clone(),
            created_at: Some(run.started_at.clone()),
            started_at: Some(run.started_at.clone()),
            finished_at: run.finished_at.clone(),
        }
    }
}

/// Converts stored records for export
pub fn export_records(records: &[StoredRecord]) -> Vec<RecordExport> {
    records.iter().map(RecordExport::from).collect()
}

/// Converts job runs for export
pub fn export_job_runs(runs: &[JobRunRecord]) -> Vec<JobStatusExport> {
    runs.iter().map(JobStatusExport::from).collect()
}
