//! Job driver
//!
//! Runs the pipeline over every configured target under one shared run id.
//! A target's failure is recorded in its result and never stops the others.

use crate::config::Config;
use crate::crawler::fetcher::{build_http_client, Fetcher, HttpFetcher};
use crate::crawler::pipeline::{Pipeline, RunContext, Target, TargetResult, TargetState};
use crate::politeness::PolitenessGuard;
use crate::storage::Repository;
use crate::HarvestError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a run identifier
///
/// 32 hex chars derived from the start time, the process id, and a
/// process-local counter, so two runs started in the same instant differ.
pub fn new_run_id(started_at: DateTime<Utc>) -> String {
    let counter = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut hasher = Sha256::new();
    hasher.update(started_at.to_rfc3339().as_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(counter.to_le_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(32);
    id
}

/// Everything one run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub job_name: String,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per target, in target order
    pub results: Vec<TargetResult>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.ok).count()
    }

    pub fn blocked(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.state == TargetState::Blocked)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded() - self.blocked()
    }

    pub fn total_saved(&self) -> u64 {
        self.results.iter().map(|r| u64::from(r.saved)).sum()
    }

    pub fn total_seen(&self) -> u64 {
        self.results.iter().map(|r| u64::from(r.seen)).sum()
    }
}

/// Runs the pipeline over a list of targets
pub struct JobDriver<F, R> {
    pipeline: Arc<Pipeline<F, R>>,
    job_name: String,
    concurrency: usize,
    run_timeout: Option<Duration>,
}

impl<F, R> JobDriver<F, R>
where
    F: Fetcher + Send + Sync + 'static,
    R: Repository + Send + 'static,
{
    /// Creates a sequential driver without a run deadline
    pub fn new(pipeline: Pipeline<F, R>, job_name: impl Into<String>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            job_name: job_name.into(),
            concurrency: 1,
            run_timeout: None,
        }
    }

    /// Processes up to `concurrency` targets at a time
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Cancels in-flight fetches once `timeout` has passed since run start
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    pub fn pipeline(&self) -> &Pipeline<F, R> {
        &self.pipeline
    }

    /// Runs every target once under a fresh run id
    ///
    /// Always yields one result per target, whatever happens to the others.
    pub async fn run_job(&self, targets: &[Target]) -> RunSummary {
        let started_at = Utc::now();
        let run = RunContext {
            job_name: self.job_name.clone(),
            run_id: new_run_id(started_at),
            deadline: self.run_timeout.map(|t| Instant::now() + t),
        };

        tracing::info!(
            job_id = %self.job_name,
            run_id = %run.run_id,
            targets = targets.len(),
            concurrency = self.concurrency,
            "Job started"
        );

        let job_ids = run.job_ids(targets);
        let results = if self.concurrency <= 1 || targets.len() <= 1 {
            self.run_sequential(&run, targets, &job_ids).await
        } else {
            self.run_pooled(&run, targets, &job_ids).await
        };

        let summary = RunSummary {
            job_name: self.job_name.clone(),
            run_id: run.run_id,
            started_at,
            finished_at: Utc::now(),
            results,
        };

        tracing::info!(
            job_id = %summary.job_name,
            run_id = %summary.run_id,
            succeeded = summary.succeeded(),
            blocked = summary.blocked(),
            failed = summary.failed(),
            saved = summary.total_saved(),
            "Job finished"
        );

        summary
    }

    async fn run_sequential(
        &self,
        run: &RunContext,
        targets: &[Target],
        job_ids: &[String],
    ) -> Vec<TargetResult> {
        let mut results = Vec::with_capacity(targets.len());
        for (target, job_id) in targets.iter().zip(job_ids) {
            let joined = self.spawn_target(run, job_id, target, None).await;
            results.push(self.settle(run, job_id, target, joined));
        }
        results
    }

    async fn run_pooled(
        &self,
        run: &RunContext,
        targets: &[Target],
        job_ids: &[String],
    ) -> Vec<TargetResult> {
        let permits = Arc::new(Semaphore::new(self.concurrency));

        let handles: Vec<_> = targets
            .iter()
            .zip(job_ids)
            .map(|(target, job_id)| {
                self.spawn_target(run, job_id, target, Some(Arc::clone(&permits)))
            })
            .collect();

        let mut results = Vec::with_capacity(targets.len());
        for ((handle, target), job_id) in handles.into_iter().zip(targets).zip(job_ids) {
            let joined = handle.await;
            results.push(self.settle(run, job_id, target, joined));
        }
        results
    }

    /// Runs one target on its own task, so a panic stays with that target
    fn spawn_target(
        &self,
        run: &RunContext,
        job_id: &str,
        target: &Target,
        permits: Option<Arc<Semaphore>>,
    ) -> JoinHandle<TargetResult> {
        let pipeline = Arc::clone(&self.pipeline);
        let run = run.clone();
        let job_id = job_id.to_string();
        let target = target.clone();
        tokio::spawn(async move {
            // The semaphore is never closed
            let _permit = match permits {
                Some(permits) => permits.acquire_owned().await.ok(),
                None => None,
            };
            pipeline.run_target_as(&run, &job_id, &target).await
        })
    }

    fn settle(
        &self,
        run: &RunContext,
        job_id: &str,
        target: &Target,
        joined: Result<TargetResult, JoinError>,
    ) -> TargetResult {
        let result = match joined {
            Ok(result) => result,
            Err(e) => {
                let reason = if e.is_panic() {
                    "target task panicked"
                } else {
                    "target task cancelled"
                };
                tracing::error!(
                    job_id = %job_id,
                    run_id = %run.run_id,
                    source = %target.source,
                    error_kind = "unexpected",
                    "Target task aborted: {}",
                    e
                );
                self.pipeline.abandon(run, job_id, target, reason)
            }
        };
        log_target_result(run, &result);
        result
    }
}

impl<R> JobDriver<HttpFetcher, R>
where
    R: Repository + Send + 'static,
{
    /// Builds the HTTP-backed driver described by `config`
    pub fn from_config(config: &Config, repo: Arc<Mutex<R>>) -> Result<Self, HarvestError> {
        let client = build_http_client(config)?;
        let guard = Arc::new(PolitenessGuard::from_config(client.clone(), config));
        let pipeline = Pipeline::new(guard, HttpFetcher::new(client), repo);

        Ok(Self::new(pipeline, &config.harvester.job_name)
            .with_concurrency(config.harvester.concurrency as usize)
            .with_run_timeout(Duration::from_secs(config.harvester.run_timeout_secs)))
    }
}

/// Resolves the configured targets
pub fn targets_from_config(config: &Config) -> Result<Vec<Target>, HarvestError> {
    config
        .targets
        .iter()
        .map(|t| Target::from_config(t).map_err(HarvestError::from))
        .collect()
}

/// Runs every configured target once against `repo`
pub async fn run_job<R>(config: &Config, repo: Arc<Mutex<R>>) -> Result<RunSummary, HarvestError>
where
    R: Repository + Send + 'static,
{
    let targets = targets_from_config(config)?;
    let driver = JobDriver::from_config(config, repo)?;
    Ok(driver.run_job(&targets).await)
}

fn log_target_result(run: &RunContext, result: &TargetResult) {
    tracing::info!(
        run_id = %run.run_id,
        source = %result.source,
        ok = result.ok,
        saved = result.saved,
        seen = result.seen,
        error_kind = result.error.unwrap_or(""),
        "Target result"
    );
}
