use crate::extract::ExtractorKind;
use serde::Deserialize;

/// Main configuration structure for Harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub harvester: HarvesterConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub politeness: PolitenessConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetConfig>,
}

/// Job-level behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HarvesterConfig {
    /// Prefix of the per-target job ids
    #[serde(rename = "job-name", default = "default_job_name")]
    pub job_name: String,

    /// Number of targets processed at once (1 = sequential)
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Deadline for a whole run, in seconds
    #[serde(rename = "run-timeout-secs", default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    /// Interval between runs when watching, in seconds
    #[serde(rename = "interval-secs", default = "default_interval")]
    pub interval_secs: u64,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

impl UserAgentConfig {
    /// Formats the identifying user agent string: `Name/Version (+ContactURL)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{})",
            self.crawler_name, self.crawler_version, self.contact_url
        )
    }
}

/// What to do when a host's robots.txt cannot be retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotsFailurePolicy {
    /// Treat the host as allowing everything
    #[default]
    Allow,
    /// Treat the host as disallowing everything
    Deny,
}

/// Robots and throttle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PolitenessConfig {
    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "min-delay-ms", default = "default_min_delay")]
    pub min_delay_ms: u64,

    /// How long a fetched robots.txt stays valid (seconds)
    #[serde(rename = "robots-ttl-secs", default = "default_robots_ttl")]
    pub robots_ttl_secs: u64,

    #[serde(rename = "robots-failure", default)]
    pub robots_failure: RobotsFailurePolicy,

    /// Timeout for a single HTTP request (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay(),
            robots_ttl_secs: default_robots_ttl(),
            robots_failure: RobotsFailurePolicy::default(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// One configured harvest target
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TargetConfig {
    /// Source identifier stored with every record
    pub source: String,

    /// Seed URL fetched once per run
    pub url: String,

    /// Extractor variant used for the page
    pub extractor: ExtractorKind,

    /// Tags attached to extracted records; the extractor's defaults when absent
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

fn default_job_name() -> String {
    "crawl_sampler".to_string()
}

fn default_concurrency() -> u32 {
    1
}

fn default_run_timeout() -> u64 {
    300
}

fn default_interval() -> u64 {
    900
}

fn default_min_delay() -> u64 {
    1000
}

fn default_robots_ttl() -> u64 {
    3600
}

fn default_request_timeout() -> u64 {
    15
}
