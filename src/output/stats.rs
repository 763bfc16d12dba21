//! Statistics and run summaries
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the repository.

use crate::crawler::RunSummary;
use crate::storage::{JobStatus, Repository, StorageResult};
use std::collections::HashMap;
use std::fmt::Write;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Total number of stored records
    pub total_records: u64,

    /// Count of recent job runs by status
    pub runs_by_status: HashMap<JobStatus, u64>,

    /// Number of recent job runs inspected
    pub recent_runs: u64,
}

/// Loads statistics from the repository
///
/// Job-run counts cover the most recent runs the repository will list.
pub fn load_statistics(repo: &dyn Repository) -> StorageResult<HarvestStatistics> {
    let total_records = repo.count_records()?;
    let runs = repo.list_job_runs(u32::MAX)?;

    let mut runs_by_status = HashMap::new();
    for run in &runs {
        *runs_by_status.entry(run.status).or_insert(0) += 1;
    }

    Ok(HarvestStatistics {
        total_records,
        runs_by_status,
        recent_runs: runs.len() as u64,
    })
}

/// Prints repository statistics to stdout
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");
    println!("  Stored records: {}", stats.total_records);
    println!("  Recent job runs: {}", stats.recent_runs);
    for status in [JobStatus::Success, JobStatus::Failed, JobStatus::Started] {
        let count = stats.runs_by_status.get(&status).copied().unwrap_or(0);
        println!("    {}: {}", status.to_db_string(), count);
    }
}

/// Renders a run summary as human-readable text
pub fn format_run_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let elapsed = summary.finished_at - summary.started_at;

    let _ = writeln!(out, "=== Run {} ({}) ===\n", summary.run_id, summary.job_name);
    for result in &summary.results {
        if result.ok {
            let _ = writeln!(
                out,
                "  [ok]   {}: saved {} of {} ({})",
                result.source, result.saved, result.seen, result.url
            );
        } else {
            let _ = writeln!(
                out,
                "  [fail] {}: {} ({})",
                result.source,
                result.error.unwrap_or("exception"),
                result.url
            );
        }
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Targets: {} succeeded, {} blocked, {} failed",
        summary.succeeded(),
        summary.blocked(),
        summary.failed()
    );
    let _ = writeln!(
        out,
        "Records: {} saved of {} seen in {:.1}s",
        summary.total_saved(),
        summary.total_seen(),
        elapsed.num_milliseconds() as f64 / 1000.0
    );
    out
}

/// Prints a run summary to stdout
pub fn print_run_summary(summary: &RunSummary) {
    print!("{}", format_run_summary(summary));
}
