//! Batch sequencing
//!
//! A batch creates runs from the catalog, checks every unchecked link, and
//! writes a report. Either phase can be skipped.

use crate::catalog::JsonCatalog;
use crate::checker::link_check::{CheckSummary, LinkCheckOrchestrator};
use crate::checker::prober::HttpProber;
use crate::checker::run_creation::{CreationSummary, RunCreationOrchestrator};
use crate::config::Config;
use crate::engine::{AdmissionGate, ParallelRunner, ReleaseScheduler};
use crate::output::{generate_markdown_summary, generate_summary};
use crate::storage::open_storage;
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Which phases of a batch to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchMode {
    /// Create runs, then check links
    #[default]
    Full,
    /// Create runs only
    CreateOnly,
    /// Check links left unchecked by earlier batches only
    CheckOnly,
}

impl BatchMode {
    pub fn creates_runs(&self) -> bool {
        !matches!(self, BatchMode::CheckOnly)
    }

    pub fn checks_links(&self) -> bool {
        !matches!(self, BatchMode::CreateOnly)
    }
}

/// What a batch invocation did
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub creation: Option<CreationSummary>,
    pub check: Option<CheckSummary>,
    pub report_path: PathBuf,
}

/// Runs a batch against the configured catalog and database
///
/// # Arguments
///
/// * `config` - Validated configuration
/// * `config_hash` - Fingerprint of the configuration file, stored on the batch
/// * `mode` - Phases to run
/// * `shutdown` - Cancelling this token interrupts whichever phase is running
///
/// # Returns
///
/// * `Ok(BatchOutcome)` - Both requested phases finished and the report was written
/// * `Err(LinkwatchError)` - A phase failed or was interrupted; committed
///   runs and outcomes are kept
pub async fn run_batch(
    config: &Config,
    config_hash: &str,
    mode: BatchMode,
    shutdown: CancellationToken,
) -> Result<BatchOutcome> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    tracing::info!(?mode, database = %config.output.database_path, "Starting batch");

    let creation = if mode.creates_runs() {
        let catalog = JsonCatalog::load(Path::new(&config.catalog.path))?;
        let orchestrator = RunCreationOrchestrator::new(
            ParallelRunner::new(config.creation.worker_count, shutdown.clone()),
            Arc::new(catalog),
            Arc::new(storage.clone()),
            config.creation.sample_size,
        );
        Some(orchestrator.run(config_hash).await?)
    } else {
        None
    };

    let check = if mode.checks_links() {
        let prober = HttpProber::new(&config.user_agent, &config.checker)?;
        let gate = AdmissionGate::new(config.checker.host_cooldown(), ReleaseScheduler::new());
        let orchestrator = LinkCheckOrchestrator::new(
            ParallelRunner::new(config.checker.worker_count, shutdown.clone()),
            gate.clone(),
            Arc::new(prober),
            Arc::new(storage.clone()),
        );

        let result = orchestrator.run().await;
        drop(orchestrator);
        gate.quiesce().await;
        Some(result?)
    } else {
        None
    };

    let batch_id = creation.as_ref().map(|summary| summary.batch_id);
    let summary = generate_summary(&storage, batch_id, check)?;
    let report_path = PathBuf::from(&config.output.report_path);
    generate_markdown_summary(&summary, &report_path)?;

    tracing::info!(
        batch_id = ?summary.batch.as_ref().map(|b| b.id),
        report = %report_path.display(),
        "Batch complete"
    );

    Ok(BatchOutcome {
        creation,
        check,
        report_path,
    })
}
