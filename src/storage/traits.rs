//! Storage traits and error types
//!
//! This module defines the trait interface for repository backends and
//! associated error types.

use crate::record::CandidateRecord;
use crate::storage::{AuditEntry, JobRunRecord, JobStatus, StoredAuditEntry, StoredRecord};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Job run not found: {job_id}/{run_id}")]
    RunNotFound { job_id: String, run_id: String },

    #[error("Job run already finished: {job_id}/{run_id}")]
    RunAlreadyFinished { job_id: String, run_id: String },

    #[error("Job run cannot be finished with non-terminal status {0:?}")]
    NonTerminalStatus(JobStatus),

    #[error("Unknown job status '{0}'")]
    UnknownStatus(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for repository backend implementations
///
/// Each method is one atomic logical write or read; no operation spans
/// more than one target.
pub trait Repository {
    // ===== Records =====

    /// Inserts a record, or updates the row that already has `content_hash`
    ///
    /// On update, title, url, tags, and fetched-at are replaced; the id and
    /// created-at of the first sighting are kept.
    fn upsert_record(
        &mut self,
        record: &CandidateRecord,
        content_hash: &str,
    ) -> StorageResult<StoredRecord>;

    /// Newest records first; `limit` is clamped to 1..=500
    fn list_records(&self, limit: u32) -> StorageResult<Vec<StoredRecord>>;

    /// Total number of stored records
    fn count_records(&self) -> StorageResult<u64>;

    // ===== Request audit =====

    /// Appends one audit entry, returning its id
    fn insert_audit_entry(&mut self, entry: &AuditEntry) -> StorageResult<i64>;

    /// Audit entries of a run, in insertion order
    fn list_audit_entries(&self, run_id: &str) -> StorageResult<Vec<StoredAuditEntry>>;

    // ===== Job runs =====

    /// Creates the run row with status `started`
    fn start_job_run(
        &mut self,
        job_id: &str,
        run_id: &str,
        started_at: DateTime<Utc>,
    ) -> StorageResult<i64>;

    /// Applies the single terminal update of a started run
    ///
    /// Fails with `RunAlreadyFinished` if the run already has a terminal
    /// status, and with `RunNotFound` if it was never started.
    fn finish_job_run(
        &mut self,
        job_id: &str,
        run_id: &str,
        status: JobStatus,
        finished_at: DateTime<Utc>,
        message: &str,
    ) -> StorageResult<()>;

    /// Gets one run row
    fn get_job_run(&self, job_id: &str, run_id: &str) -> StorageResult<Option<JobRunRecord>>;

    /// Newest runs first; `limit` is clamped to 1..=100
    fn list_job_runs(&self, limit: u32) -> StorageResult<Vec<JobRunRecord>>;
}
