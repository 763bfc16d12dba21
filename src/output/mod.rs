//! Output module for run summaries and exports
//!
//! This module handles:
//! - Record and job-run export shapes (JSON via serde)
//! - Printing run summaries and repository statistics

mod export;
pub mod stats;

pub use export::{export_job_runs, export_records, JobStatusExport, RecordExport};
pub use stats::{
    format_run_summary, load_statistics, print_run_summary, print_statistics, HarvestStatistics,
};
