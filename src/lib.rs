//! Harvester: a polite, idempotent web content harvester
//!
//! This crate fetches pages from a fixed set of configured targets while
//! respecting robots.txt and per-host request spacing, extracts structured
//! records from the HTML, deduplicates them by content fingerprint, and keeps
//! an auditable history of every run and every request.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod politeness;
pub mod record;
pub mod robots;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Harvester operations
///
/// Target-scoped failures never surface here; they are folded into a
/// [`crawler::TargetResult`] by the pipeline.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_job, JobDriver, Pipeline, RunSummary, TargetResult};
pub use extract::ExtractorKind;
pub use politeness::PolitenessGuard;
pub use record::{fingerprint, CandidateRecord};
pub use storage::{Repository, SqliteRepository};
