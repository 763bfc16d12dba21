//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Repository trait.

use crate::record::CandidateRecord;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Repository, StorageError, StorageResult};
use crate::storage::{AuditEntry, JobRunRecord, JobStatus, StoredAuditEntry, StoredRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

pub const MAX_RECORDS_LIMIT: u32 = 500;
pub const MAX_JOB_RUNS_LIMIT: u32 = 100;

const RECORD_COLUMNS: &str =
    "id, source, title, url, tags, fetched_at, content_hash, created_at";
const JOB_RUN_COLUMNS: &str = "id, job_id, run_id, status, started_at, finished_at, message";

/// SQLite repository backend
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    /// Creates a new SqliteRepository instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteRepository)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn get_record_by_hash(&self, content_hash: &str) -> StorageResult<Option<StoredRecord>> {
        let sql = format!(
            "SELECT {} FROM crawl_records WHERE content_hash = ?1",
            RECORD_COLUMNS
        );
        let record = self
            .conn
            .query_row(&sql, params![content_hash], record_from_row)
            .optional()?;
        Ok(record)
    }

    fn job_run_exists(&self, job_id: &str, run_id: &str) -> StorageResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM job_runs WHERE job_id = ?1 AND run_id = ?2",
                params![job_id, run_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

/// Formats a timestamp so that lexical order matches chronological order
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        id: row.get(0)?,
        source: row.get(1)?,
        title: row.get(2)?,
        url: row.get(3)?,
        tags: row.get(4)?,
        fetched_at: row.get(5)?,
        content_hash: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn parse_status(idx: usize, raw: &str) -> rusqlite::Result<JobStatus> {
    JobStatus::from_db_string(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(StorageError::UnknownStatus(raw.to_string())),
        )
    })
}

fn job_run_from_row(row: &Row<'_>) -> rusqlite::Result<JobRunRecord> {
    let status: String = row.get(3)?;
    Ok(JobRunRecord {
        id: row.get(0)?,
        job_id: row.get(1)?,
        run_id: row.get(2)?,
        status: parse_status(3, &status)?,
        started_at: row.get(4)?,
        finished_at: row.get(5)?,
        message: row.get(6)?,
    })
}

impl Repository for SqliteRepository {
    // ===== Records =====

    fn upsert_record(
        &mut self,
        record: &CandidateRecord,
        content_hash: &str,
    ) -> StorageResult<StoredRecord> {
        let now = timestamp(Utc::now());
        self.conn.execute(
            "INSERT INTO crawl_records (source, title, url, tags, content_hash, fetched_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(content_hash) DO UPDATE SET
                title = excluded.title,
                url = excluded.url,
                tags = excluded.tags,
                fetched_at = excluded.fetched_at",
            params![
                record.source,
                record.title,
                record.url,
                record.tags_csv(),
                content_hash,
                timestamp(record.observed_at),
                now,
            ],
        )?;

        self.get_record_by_hash(content_hash)?.ok_or_else(|| {
            StorageError::Database(format!("record {} missing after upsert", content_hash))
        })
    }

    fn list_records(&self, limit: u32) -> StorageResult<Vec<StoredRecord>> {
        let limit = limit.clamp(1, MAX_RECORDS_LIMIT);
        let sql = format!(
            "SELECT {} FROM crawl_records ORDER BY fetched_at DESC, id DESC LIMIT ?1",
            RECORD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![limit], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM crawl_records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Request audit =====

    fn insert_audit_entry(&mut self, entry: &AuditEntry) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO crawl_requests
                (job_id, run_id, method, url, host, robots_allowed, status_code, duration_ms,
                 error_type, error_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                entry.job_id,
                entry.run_id,
                entry.method,
                entry.url,
                entry.host,
                entry.robots_allowed,
                entry.status_code,
                entry.duration_ms as i64,
                entry.error_kind,
                entry.error_message,
                timestamp(entry.created_at),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_audit_entries(&self, run_id: &str) -> StorageResult<Vec<StoredAuditEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job_id, run_id, method, url, host, robots_allowed, status_code,
                    duration_ms, error_type, error_message, created_at
             FROM crawl_requests WHERE run_id = ?1 ORDER BY id",
        )?;

        let entries = stmt
            .query_map(params![run_id], |row| {
                let created_at: String = row.get(11)?;
                Ok(StoredAuditEntry {
                    id: row.get(0)?,
                    entry: AuditEntry {
                        job_id: row.get(1)?,
                        run_id: row.get(2)?,
                        method: row.get(3)?,
                        url: row.get(4)?,
                        host: row.get(5)?,
                        robots_allowed: row.get(6)?,
                        status_code: row.get(7)?,
                        duration_ms: row.get::<_, i64>(8)? as u64,
                        error_kind: row.get(9)?,
                        error_message: row.get(10)?,
                        created_at: parse_timestamp(11, &created_at)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    // ===== Job runs =====

    fn start_job_run(
        &mut self,
        job_id: &str,
        run_id: &str,
        started_at: DateTime<Utc>,
    ) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO job_runs (job_id, run_id, status, started_at, message)
             VALUES (?1, ?2, ?3, ?4, '')",
            params![
                job_id,
                run_id,
                JobStatus::Started.to_db_string(),
                timestamp(started_at)
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_job_run(
        &mut self,
        job_id: &str,
        run_id: &str,
        status: JobStatus,
        finished_at: DateTime<Utc>,
        message: &str,
    ) -> StorageResult<()> {
        if !status.is_terminal() {
            return Err(StorageError::NonTerminalStatus(status));
        }

        let updated = self.conn.execute(
            "UPDATE job_runs SET status = ?1, finished_at = ?2, message = ?3
             WHERE job_id = ?4 AND run_id = ?5 AND status = ?6",
            params![
                status.to_db_string(),
                timestamp(finished_at),
                message,
                job_id,
                run_id,
                JobStatus::Started.to_db_string(),
            ],
        )?;

        if updated == 0 {
            let job_id = job_id.to_string();
            let run_id = run_id.to_string();
            return if self.job_run_exists(&job_id, &run_id)? {
                Err(StorageError::RunAlreadyFinished { job_id, run_id })
            } else {
                Err(StorageError::RunNotFound { job_id, run_id })
            };
        }

        Ok(())
    }

    fn get_job_run(&self, job_id: &str, run_id: &str) -> StorageResult<Option<JobRunRecord>> {
        let sql = format!(
            "SELECT {} FROM job_runs WHERE job_id = ?1 AND run_id = ?2",
            JOB_RUN_COLUMNS
        );
        let run = self
            .conn
            .query_row(&sql, params![job_id, run_id], job_run_from_row)
            .optional()?;
        Ok(run)
    }

    fn list_job_runs(&self, limit: u32) -> StorageResult<Vec<JobRunRecord>> {
        let limit = limit.clamp(1, MAX_JOB_RUNS_LIMIT);
        let sql = format!(
            "SELECT {} FROM job_runs ORDER BY started_at DESC, id DESC LIMIT ?1",
            JOB_RUN_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![limit], job_run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }
}
