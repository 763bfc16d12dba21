//! Storage module for persisting harvest data
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Fingerprint-keyed record upserts
//! - Append-only request audit entries
//! - Job run bookkeeping (one start, one terminal update)

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteRepository;
pub use traits::{Repository, StorageError, StorageResult};

use crate::HarvestError;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Initializes or opens a repository database
pub fn open_repository(path: &Path) -> Result<SqliteRepository, HarvestError> {
    Ok(SqliteRepository::new(path)?)
}

/// A deduplicated record as persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: i64,
    pub source: String,
    pub title: String,
    pub url: String,
    /// Comma-delimited tags
    pub tags: String,
    pub fetched_at: String,
    pub content_hash: String,
    pub created_at: String,
}

/// One fetch attempt, success or not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub job_id: String,
    pub run_id: String,
    pub method: String,
    pub url: String,
    pub host: String,
    pub robots_allowed: bool,
    /// 0 when no HTTP response was received
    pub status_code: u16,
    pub duration_ms: u64,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An audit entry as persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAuditEntry {
    pub id: i64,
    pub entry: AuditEntry,
}

/// One target's bookkeeping row within a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRunRecord {
    pub id: i64,
    pub job_id: String,
    pub run_id: String,
    pub status: JobStatus,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub message: String,
}

/// Status of a job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Started,
    Success,
    Failed,
}

impl JobStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "started" => Some(Self::Started),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }
}
