//! Harvester main entry point
//!
//! This is the command-line interface for the Harvester content harvester.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use harvester::config::{load_config_with_hash, Config};
use harvester::crawler::{targets_from_config, JobDriver};
use harvester::output::{
    export_job_runs, export_records, load_statistics, print_run_summary, print_statistics,
};
use harvester::storage::{open_repository, Repository, SqliteRepository};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Harvester: a polite, idempotent web content harvester
///
/// Harvester fetches a fixed list of pages while respecting robots.txt and
/// per-host request spacing, extracts records, deduplicates them by content
/// fingerprint, and keeps an audit of every run and request.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(version)]
#[command(about = "A polite, idempotent web content harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every target once
    Run,

    /// Run every target on a fixed interval until Ctrl-C
    Watch {
        /// Override the configured interval, in seconds
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Print the newest stored records as JSON
    Records {
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },

    /// Print the newest job runs as JSON
    Jobs {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Show statistics from the database
    Stats,

    /// Validate the configuration and list targets without fetching
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet, cli.json);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    match cli.command {
        Command::Run => handle_run(&config).await,
        Command::Watch { interval } => handle_watch(&config, interval).await,
        Command::Records { limit } => handle_records(&config, limit),
        Command::Jobs { limit } => handle_jobs(&config, limit),
        Command::Stats => handle_stats(&config),
        Command::Check => handle_check(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool, json: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("harvester=info,warn"),
            1 => EnvFilter::new("harvester=debug,info"),
            2 => EnvFilter::new("harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_shared(config: &Config) -> Result<Arc<Mutex<SqliteRepository>>> {
    let path = Path::new(&config.output.database_path);
    let repo = open_repository(path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    Ok(Arc::new(Mutex::new(repo)))
}

/// Handles `run`: one pass over every target
async fn handle_run(config: &Config) -> Result<()> {
    let targets = targets_from_config(config)?;
    let driver = JobDriver::from_config(config, open_shared(config)?)?;

    let summary = driver.run_job(&targets).await;
    print_run_summary(&summary);

    Ok(())
}

/// Handles `watch`: one pass per interval tick, stopping on Ctrl-C
///
/// The driver, and with it the robots cache and throttle state, lives across
/// ticks.
async fn handle_watch(config: &Config, interval: Option<u64>) -> Result<()> {
    let targets = targets_from_config(config)?;
    let driver = JobDriver::from_config(config, open_shared(config)?)?;

    let period = Duration::from_secs(interval.unwrap_or(config.harvester.interval_secs).max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!("Watching {} targets every {:?}", targets.len(), period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let summary = driver.run_job(&targets).await;
                print_run_summary(&summary);
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                tracing::info!("Interrupted, stopping");
                break;
            }
        }
    }

    Ok(())
}

/// Handles `records`: newest stored records as JSON
fn handle_records(config: &Config, limit: u32) -> Result<()> {
    let repo = open_repository(Path::new(&config.output.database_path))?;
    let records = repo.list_records(limit)?;
    println!("{}", serde_json::to_string_pretty(&export_records(&records))?);
    Ok(())
}

/// Handles `jobs`: newest job runs as JSON
fn handle_jobs(config: &Config, limit: u32) -> Result<()> {
    let repo = open_repository(Path::new(&config.output.database_path))?;
    let runs = repo.list_job_runs(limit)?;
    println!("{}", serde_json::to_string_pretty(&export_job_runs(&runs))?);
    Ok(())
}

/// Handles `stats`: repository statistics
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.output.database_path);
    let repo = open_repository(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&repo)?;
    print_statistics(&stats);
    Ok(())
}

/// Handles `check`: validates config and shows what would be fetched
fn handle_check(config: &Config) -> Result<()> {
    println!("=== Harvester Check ===\n");

    println!("Job:");
    println!("  Name: {}", config.harvester.job_name);
    println!("  Concurrency: {}", config.harvester.concurrency);
    println!("  Run timeout: {}s", config.harvester.run_timeout_secs);
    println!("  Watch interval: {}s", config.harvester.interval_secs);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nPoliteness:");
    println!("  Minimum delay: {}ms", config.politeness.min_delay_ms);
    println!("  Robots TTL: {}s", config.politeness.robots_ttl_secs);
    println!("  Robots failure policy: {:?}", config.politeness.robots_failure);
    println!("  Request timeout: {}s", config.politeness.request_timeout_secs);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    let targets = targets_from_config(config)?;
    println!("\nTargets ({}):", targets.len());
    for (target, entry) in targets.iter().zip(&config.targets) {
        let tags = entry
            .tags
            .clone()
            .unwrap_or_else(|| vec![entry.extractor.as_str().to_string()]);
        println!(
            "  - {} [{}] {} (tags: {})",
            target.source,
            entry.extractor,
            target.url,
            tags.join(",")
        );
    }

    println!("\nConfiguration is valid");
    Ok(())
}
