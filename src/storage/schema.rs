//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Harvester database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Deduplicated harvested records
CREATE TABLE IF NOT EXISTS crawl_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '',
    content_hash TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    CONSTRAINT uq_crawl_records_content_hash UNIQUE (content_hash)
);

CREATE INDEX IF NOT EXISTS idx_crawl_records_source ON crawl_records(source);

-- One row per fetch attempt, append-only
CREATE TABLE IF NOT EXISTS crawl_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL,
    run_id TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    host TEXT NOT NULL,
    robots_allowed INTEGER NOT NULL,
    status_code INTEGER NOT NULL DEFAULT 0,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    error_type TEXT,
    error_message TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_requests_run ON crawl_requests(run_id);
CREATE INDEX IF NOT EXISTS idx_crawl_requests_host ON crawl_requests(host);

-- One row per (job, run), started once and finished once
CREATE TABLE IF NOT EXISTS job_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL,
    run_id TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    message TEXT NOT NULL DEFAULT '',
    UNIQUE(job_id, run_id)
);

CREATE INDEX IF NOT EXISTS idx_job_runs_run ON job_runs(run_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
