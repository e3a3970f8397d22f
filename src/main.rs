//! Linkwatch main entry point
//!
//! This is the command-line interface for the linkwatch link checker.

use anyhow::Context;
use clap::Parser;
use linkwatch::config::{load_config_with_hash, Config};
use linkwatch::output::{
    generate_markdown_summary, generate_summary, load_statistics, print_statistics,
};
use linkwatch::storage::SqliteStorage;
use linkwatch::{run_batch, BatchMode};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Linkwatch: a polite link checker for catalog records
///
/// Linkwatch samples records from each published dataset, stores their
/// links as a run, and checks every unchecked link while keeping at most
/// one request in flight per host.
#[derive(Parser, Debug)]
#[command(name = "linkwatch")]
#[command(version = "1.0.0")]
#[command(about = "A polite link checker for catalog records", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Create runs without checking links
    #[arg(long, conflicts_with = "check_only")]
    create_only: bool,

    /// Check links left unchecked by earlier batches without creating runs
    #[arg(long, conflicts_with = "create_only")]
    check_only: bool,

    /// Validate config and show what would be done without touching the network
    #[arg(long, conflicts_with_all = ["stats", "export_summary", "create_only", "check_only"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary", "create_only", "check_only"])]
    stats: bool,

    /// Regenerate the report for the latest batch and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "create_only", "check_only"])]
    export_summary: bool,
}

impl Cli {
    fn batch_mode(&self) -> BatchMode {
        if self.create_only {
            BatchMode::CreateOnly
        } else if self.check_only {
            BatchMode::CheckOnly
        } else {
            BatchMode::Full
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))
        .inspect_err(|e| tracing::error!("{:#}", e))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let result = if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.export_summary {
        handle_export_summary(&config)
    } else {
        handle_batch(&config, &config_hash, cli.batch_mode()).await
    };

    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("linkwatch=info,warn"),
            1 => EnvFilter::new("linkwatch=debug,info"),
            2 => EnvFilter::new("linkwatch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what a batch would use
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Linkwatch Dry Run ===\n");

    println!("Run Creation:");
    println!("  Workers: {}", config.creation.worker_count);
    println!("  Sample size: {} records per dataset", config.creation.sample_size);

    println!("\nLink Checking:");
    println!("  Workers: {}", config.checker.worker_count);
    println!("  Host cooldown: {}ms", config.checker.host_cooldown_ms);
    println!("  Connect timeout: {}ms", config.checker.connect_timeout_ms);
    println!("  Response timeout: {}ms", config.checker.response_timeout_ms);
    println!("  Download timeout: {}ms", config.checker.download_timeout_ms);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nCatalog: {}", config.catalog.path);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Report: {}", config.output.report_path);

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let stats = load_statistics(&storage).context("Failed to load statistics")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-summary mode: rewrites the report for the latest batch
fn handle_export_summary(config: &Config) -> anyhow::Result<()> {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;

    let summary = generate_summary(&storage, None, None).context("Failed to load batch data")?;
    generate_markdown_summary(&summary, Path::new(&config.output.report_path))
        .context("Failed to write report")?;

    println!("✓ Report exported to: {}", config.output.report_path);

    Ok(())
}

/// Handles the batch operation; Ctrl-C interrupts it
async fn handle_batch(config: &Config, config_hash: &str, mode: BatchMode) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl-C, stopping batch");
            signal_token.cancel();
        }
    });

    let outcome = run_batch(config, config_hash, mode, shutdown)
        .await
        .context("Batch failed")?;

    if let Some(creation) = &outcome.creation {
        println!(
            "Batch {}: {} runs created with {} links",
            creation.batch_id, creation.counts.runs_created, creation.counts.links_created
        );
    }
    if let Some(check) = &outcome.check {
        println!("Checked {} links, {} unreachable", check.checked, check.failed);
    }
    println!("✓ Report written to: {}", outcome.report_path.display());

    Ok(())
}
