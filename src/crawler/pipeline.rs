//! Per-target pipeline
//!
//! One target moves through
//! `Pending -> Authorizing -> Fetching -> Extracting -> Storing` and ends in
//! exactly one of `Succeeded`, `Blocked`, or `Failed`. Every stage returns an
//! explicit result; the first error decides the terminal state.
//!
//! Bookkeeping guarantees for a target that got its job-run row:
//! - at most one request audit entry, written before the terminal update
//!   (always one once authorization has been attempted)
//! - exactly one terminal job-run update

use crate::config::TargetConfig;
use crate::crawler::fetcher::{FetchOutcome, Fetcher, TransportError};
use crate::extract::{Extractor, ExtractorKind, SourceExtractor};
use crate::politeness::PolitenessGuard;
use crate::record::{CandidateRecord, ValidationError};
use crate::storage::{AuditEntry, JobStatus, Repository, StorageError, StorageResult};
use crate::url::host_key_lossy;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

/// One configured (source, seed URL, extractor) tuple
#[derive(Debug, Clone)]
pub struct Target {
    pub source: String,
    pub url: Url,
    pub extractor: SourceExtractor,
}

impl Target {
    pub fn new(
        source: impl Into<String>,
        url: Url,
        kind: ExtractorKind,
        tags: Option<Vec<String>>,
    ) -> Self {
        Self {
            source: source.into(),
            url,
            extractor: kind.build(tags),
        }
    }

    /// Builds a target from its configuration entry
    pub fn from_config(config: &TargetConfig) -> Result<Self, url::ParseError> {
        Ok(Self::new(
            &config.source,
            Url::parse(&config.url)?,
            config.extractor,
            config.tags.clone(),
        ))
    }
}

/// Identifies the run a target belongs to
#[derive(Debug, Clone)]
pub struct RunContext {
    pub job_name: String,
    pub run_id: String,
    /// In-flight network work past this instant is cancelled
    pub deadline: Option<Instant>,
}

impl RunContext {
    /// Job id of one target within this run
    pub fn job_id(&self, source: &str) -> String {
        format!("{}:{}", self.job_name, source)
    }

    /// Job ids for a target list, one per target
    ///
    /// A source seen for the n-th time (n > 1) gets a `#n` suffix, so targets
    /// sharing a source still own separate job-run rows.
    pub fn job_ids(&self, targets: &[Target]) -> Vec<String> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        targets
            .iter()
            .map(|target| {
                let n = seen.entry(target.source.as_str()).or_insert(0);
                *n += 1;
                match *n {
                    1 => self.job_id(&target.source),
                    n => format!("{}#{}", self.job_id(&target.source), n),
                }
            })
            .collect()
    }
}

/// Pipeline state of one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    Pending,
    Authorizing,
    Fetching,
    Extracting,
    Storing,
    Succeeded,
    Blocked,
    Failed,
}

impl TargetState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Blocked | Self::Failed)
    }
}

/// Why a target did not succeed
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("Blocked by robots.txt: {url}")]
    RobotsBlocked { url: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Invalid record: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("Cancelled: run deadline passed while processing {url}")]
    Cancelled { url: String },

    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl TargetError {
    /// Error kind written to the request audit
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RobotsBlocked { .. } => "robots_blocked",
            Self::Transport(e) => e.kind(),
            Self::Validation(_) => "validation",
            Self::Storage(_) => "storage",
            Self::Cancelled { .. } => "cancelled",
            Self::Unexpected(_) => "unexpected",
        }
    }

    /// Error tag reported in the per-target result
    pub fn reason_tag(&self) -> &'static str {
        match self {
            Self::RobotsBlocked { .. } => "robots_blocked",
            Self::Cancelled { .. } => "cancelled",
            _ => "exception",
        }
    }

    fn terminal_state(&self) -> TargetState {
        match self {
            Self::RobotsBlocked { .. } => TargetState::Blocked,
            _ => TargetState::Failed,
        }
    }
}

/// Outcome of one target, as handed back to the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetResult {
    pub source: String,
    pub url: String,
    pub ok: bool,
    pub state: TargetState,
    pub saved: u32,
    pub seen: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

impl TargetResult {
    fn succeeded(target: &Target, saved: u32, seen: u32) -> Self {
        Self {
            source: target.source.clone(),
            url: target.url.to_string(),
            ok: true,
            state: TargetState::Succeeded,
            saved,
            seen,
            error: None,
        }
    }

    fn failed(target: &Target, state: TargetState, error: &'static str) -> Self {
        Self {
            source: target.source.clone(),
            url: target.url.to_string(),
            ok: false,
            state,
            saved: 0,
            seen: 0,
            error: Some(error),
        }
    }
}

/// Record counts of a successful storing phase
#[derive(Debug, Clone, Copy, Default)]
struct Stored {
    saved: u32,
    seen: u32,
}

/// Sequences guard, fetcher, extractor, and repository for one target
pub struct Pipeline<F, R> {
    guard: Arc<PolitenessGuard>,
    fetcher: F,
    repo: Arc<Mutex<R>>,
}

impl<F: Fetcher, R: Repository> Pipeline<F, R> {
    pub fn new(guard: Arc<PolitenessGuard>, fetcher: F, repo: Arc<Mutex<R>>) -> Self {
        Self {
            guard,
            fetcher,
            repo,
        }
    }

    pub fn guard(&self) -> &PolitenessGuard {
        &self.guard
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn repository(&self) -> &Arc<Mutex<R>> {
        &self.repo
    }

    /// Runs one target to a terminal state
    ///
    /// Never fails: every error is folded into the returned result and the
    /// target's job-run row.
    pub async fn run_target(&self, run: &RunContext, target: &Target) -> TargetResult {
        self.run_target_as(run, &run.job_id(&target.source), target).await
    }

    /// Like [`Pipeline::run_target`], under an explicit job id
    pub async fn run_target_as(
        &self,
        run: &RunContext,
        job_id: &str,
        target: &Target,
    ) -> TargetResult {
        if let Err(e) = self.with_repo(|r| r.start_job_run(job_id, &run.run_id, Utc::now())) {
            tracing::error!(
                job_id = %job_id,
                run_id = %run.run_id,
                error_kind = "storage",
                "Could not start job run for {}: {}",
                target.source,
                e
            );
            return TargetResult::failed(target, TargetState::Failed, "exception");
        }

        let mut state = TargetState::Pending;
        let outcome = self.process(run, job_id, target, &mut state).await;
        self.finish(run, job_id, target, outcome)
    }

    /// Closes the job-run row of a target whose task died mid-flight
    ///
    /// Rows that already reached a terminal status are left alone.
    pub fn abandon(
        &self,
        run: &RunContext,
        job_id: &str,
        target: &Target,
        reason: &str,
    ) -> TargetResult {
        let now = Utc::now();
        let closed = self.with_repo(|r| {
            r.finish_job_run(job_id, &run.run_id, JobStatus::Failed, now, reason)
        });
        match closed {
            Ok(()) | Err(StorageError::RunAlreadyFinished { .. }) => {}
            Err(e) => tracing::error!(
                job_id = %job_id,
                run_id = %run.run_id,
                error_kind = "storage",
                "Could not close job run for {}: {}",
                target.source,
                e
            ),
        }
        TargetResult::failed(target, TargetState::Failed, "exception")
    }

    async fn process(
        &self,
        run: &RunContext,
        job_id: &str,
        target: &Target,
        state: &mut TargetState,
    ) -> Result<Stored, TargetError> {
        let url = &target.url;

        enter(state, TargetState::Authorizing, &target.source);
        let authorization = match self.until_deadline(run, url, self.guard.authorize(url)).await {
            Ok(authorization) => authorization,
            Err(e) => {
                self.audit_failure(run, job_id, url, &host_key_lossy(url.as_str()), false, &e)?;
                return Err(e);
            }
        };
        if !authorization.allowed {
            let e = TargetError::RobotsBlocked {
                url: url.to_string(),
            };
            self.audit_failure(run, job_id, url, &authorization.host, false, &e)?;
            return Err(e);
        }

        enter(state, TargetState::Fetching, &target.source);
        let fetched = self
            .until_deadline(run, url, async {
                self.guard.wait_turn(url).await;
                self.fetcher.fetch(url).await
            })
            .await
            .and_then(|result| result.map_err(TargetError::from));
        let outcome = match fetched {
            Ok(outcome) => outcome,
            Err(e) => {
                self.audit_failure(run, job_id, url, &authorization.host, true, &e)?;
                return Err(e);
            }
        };
        self.audit_success(run, job_id, &outcome)?;

        enter(state, TargetState::Extracting, &target.source);
        let body = outcome.body.unwrap_or_default();
        let records = panic::catch_unwind(AssertUnwindSafe(|| {
            target.extractor.extract(&target.source, url, &body)
        }))
        .map_err(|payload| TargetError::Unexpected(panic_message(payload.as_ref())))?;

        enter(state, TargetState::Storing, &target.source);
        self.store(&records)
    }

    fn store(&self, records: &[CandidateRecord]) -> Result<Stored, TargetError> {
        let mut counts = Stored {
            saved: 0,
            seen: records.len() as u32,
        };

        // Rows written before a failure stay written
        for record in records {
            record.validate()?;
            let content_hash = record.fingerprint();
            self.with_repo(|r| r.upsert_record(record, &content_hash))?;
            counts.saved += 1;
        }

        Ok(counts)
    }

    fn finish(
        &self,
        run: &RunContext,
        job_id: &str,
        target: &Target,
        outcome: Result<Stored, TargetError>,
    ) -> TargetResult {
        let now = Utc::now();

        match outcome {
            Ok(stored) => {
                let message = format!("saved {} of {} records", stored.saved, stored.seen);
                if let Err(e) = self.with_repo(|r| {
                    r.finish_job_run(job_id, &run.run_id, JobStatus::Success, now, &message)
                }) {
                    tracing::error!(
                        job_id = %job_id,
                        run_id = %run.run_id,
                        error_kind = "storage",
                        "Could not finish job run for {}: {}",
                        target.source,
                        e
                    );
                    return TargetResult::failed(target, TargetState::Failed, "exception");
                }

                tracing::info!(
                    job_id = %job_id,
                    run_id = %run.run_id,
                    source = %target.source,
                    url = %target.url,
                    saved = stored.saved,
                    seen = stored.seen,
                    "Target succeeded"
                );
                TargetResult::succeeded(target, stored.saved, stored.seen)
            }
            Err(e) => {
                let state = e.terminal_state();
                if let Err(finish_err) = self.with_repo(|r| {
                    r.finish_job_run(job_id, &run.run_id, JobStatus::Failed, now, &e.to_string())
                }) {
                    tracing::error!(
                        job_id = %job_id,
                        run_id = %run.run_id,
                        "Could not finish job run for {}: {}",
                        target.source,
                        finish_err
                    );
                }

                match &e {
                    TargetError::RobotsBlocked { .. } => tracing::warn!(
                        job_id = %job_id,
                        run_id = %run.run_id,
                        source = %target.source,
                        error_kind = e.kind(),
                        "Target blocked: {}",
                        e
                    ),
                    TargetError::Unexpected(_) => tracing::error!(
                        job_id = %job_id,
                        run_id = %run.run_id,
                        source = %target.source,
                        error_kind = e.kind(),
                        "Target failed: {}",
                        e
                    ),
                    _ => tracing::warn!(
                        job_id = %job_id,
                        run_id = %run.run_id,
                        source = %target.source,
                        error_kind = e.kind(),
                        "Target failed: {}",
                        e
                    ),
                }

                TargetResult::failed(target, state, e.reason_tag())
            }
        }
    }

    fn audit_success(
        &self,
        run: &RunContext,
        job_id: &str,
        outcome: &FetchOutcome,
    ) -> StorageResult<()> {
        let entry = AuditEntry {
            job_id: job_id.to_string(),
            run_id: run.run_id.clone(),
            method: "GET".to_string(),
            url: outcome.url.clone(),
            host: outcome.host.clone(),
            robots_allowed: outcome.robots_allowed,
            status_code: outcome.status_code,
            duration_ms: duration_ms(outcome.duration),
            error_kind: None,
            error_message: None,
            created_at: Utc::now(),
        };
        self.with_repo(|r| r.insert_audit_entry(&entry)).map(|_| ())
    }

    fn audit_failure(
        &self,
        run: &RunContext,
        job_id: &str,
        url: &Url,
        host: &str,
        robots_allowed: bool,
        error: &TargetError,
    ) -> StorageResult<()> {
        let entry = AuditEntry {
            job_id: job_id.to_string(),
            run_id: run.run_id.clone(),
            method: "GET".to_string(),
            url: url.to_string(),
            host: host.to_string(),
            robots_allowed,
            status_code: 0,
            duration_ms: 0,
            error_kind: Some(error.kind().to_string()),
            error_message: Some(error.to_string()),
            created_at: Utc::now(),
        };
        self.with_repo(|r| r.insert_audit_entry(&entry)).map(|_| ())
    }

    async fn until_deadline<T>(
        &self,
        run: &RunContext,
        url: &Url,
        fut: impl Future<Output = T>,
    ) -> Result<T, TargetError> {
        match run.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| TargetError::Cancelled {
                    url: url.to_string(),
                }),
            None => Ok(fut.await),
        }
    }

    fn with_repo<T>(&self, op: impl FnOnce(&mut R) -> StorageResult<T>) -> StorageResult<T> {
        let mut repo = self
            .repo
            .lock()
            .map_err(|_| StorageError::Database("repository lock poisoned".to_string()))?;
        op(&mut repo)
    }
}

fn enter(state: &mut TargetState, next: TargetState, source: &str) {
    tracing::trace!("{}: {:?} -> {:?}", source, state, next);
    *state = next;
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "extractor panicked".to_string()
    }
}
