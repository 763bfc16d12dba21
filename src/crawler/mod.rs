//! Crawler module for the harvest run
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching
//! - The per-target pipeline (authorize, fetch, extract, store)
//! - The job driver running the pipeline over all targets

mod driver;
mod fetcher;
mod pipeline;

pub use driver::{new_run_id, run_job, targets_from_config, JobDriver, RunSummary};
pub use fetcher::{build_http_client, FetchOutcome, Fetcher, HttpFetcher, TransportError, MAX_REDIRECTS};
pub use pipeline::{Pipeline, RunContext, Target, TargetError, TargetResult, TargetState};
