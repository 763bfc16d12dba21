use crate::config::types::{
    Config, HarvesterConfig, OutputConfig, PolitenessConfig, TargetConfig, UserAgentConfig,
};
use crate::record::{validate_source, validate_tag};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_harvester_config(&config.harvester)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_politeness_config(&config.politeness)?;
    validate_output_config(&config.output)?;
    validate_targets(&config.targets)?;
    Ok(())
}

fn validate_harvester_config(config: &HarvesterConfig) -> Result<(), ConfigError> {
    if config.job_name.is_empty() {
        return Err(ConfigError::Validation(
            "job_name cannot be empty".to_string(),
        ));
    }

    if config.concurrency < 1 || config.concurrency > 32 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 32, got {}",
            config.concurrency
        )));
    }

    if config.run_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "run_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.interval_secs < 1 {
        return Err(ConfigError::Validation(
            "interval_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_version cannot be empty".to_string(),
        ));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}

fn validate_politeness_config(config: &PolitenessConfig) -> Result<(), ConfigError> {
    if config.robots_ttl_secs < 1 {
        return Err(ConfigError::Validation(
            "robots_ttl_secs must be >= 1".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 || config.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_secs must be between 1 and 300, got {}",
            config.request_timeout_secs
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the target list
fn validate_targets(targets: &[TargetConfig]) -> Result<(), ConfigError> {
    if targets.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[target]] is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for target in targets {
        validate_source(&target.source).map_err(|e| {
            ConfigError::Validation(format!("target source {:?}: {}", target.source, e))
        })?;

        let url = Url::parse(&target.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid target URL '{}': {}", target.url, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "Target URL '{}' must use http or https",
                target.url
            )));
        }

        if let Some(tags) = &target.tags {
            for tag in tags {
                validate_tag(tag).map_err(|e| {
                    ConfigError::Validation(format!("target '{}': {}", target.source, e))
                })?;
            }
        }

        if !seen.insert((target.source.as_str(), target.url.as_str())) {
            return Err(ConfigError::Validation(format!(
                "duplicate target '{}' -> {}",
                target.source, target.url
            )));
        }
    }

    Ok(())
}
