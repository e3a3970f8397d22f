//! Run creation phase
//!
//! Opens a batch, then walks every catalog dataset in parallel. A dataset
//! gets a new run of unchecked links unless it already has an active run,
//! has no indexed snapshot, or yields no links in its sample.

use crate::catalog::{Catalog, Record};
use crate::engine::ParallelRunner;
use crate::state::LinkType;
use crate::storage::{BatchCounts, NewLink, RunStore};
use crate::url::extract_host;
use crate::{LinkwatchError, Result};
use futures::{future, TryStreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Result of a creation phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreationSummary {
    pub batch_id: i64,
    pub counts: BatchCounts,
}

#[derive(Debug, Default)]
struct CreationCounters {
    datasets_seen: AtomicU64,
    already_running: AtomicU64,
    not_indexed: AtomicU64,
    no_links: AtomicU64,
    runs_created: AtomicU64,
    links_created: AtomicU64,
}

impl CreationCounters {
    fn snapshot(&self) -> BatchCounts {
        BatchCounts {
            datasets_seen: self.datasets_seen.load(Ordering::Relaxed),
            already_running: self.already_running.load(Ordering::Relaxed),
            not_indexed: self.not_indexed.load(Ordering::Relaxed),
            no_links: self.no_links.load(Ordering::Relaxed),
            runs_created: self.runs_created.load(Ordering::Relaxed),
            links_created: self.links_created.load(Ordering::Relaxed),
        }
    }
}

/// Drives the creation phase
pub struct RunCreationOrchestrator {
    runner: ParallelRunner,
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn RunStore>,
    sample_size: usize,
}

impl RunCreationOrchestrator {
    pub fn new(
        runner: ParallelRunner,
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn RunStore>,
        sample_size: usize,
    ) -> Self {
        Self {
            runner,
            catalog,
            store,
            sample_size,
        }
    }

    /// Creates runs for every eligible dataset and closes the batch
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Stored on the batch for traceability
    ///
    /// # Returns
    ///
    /// * `Ok(CreationSummary)` - The batch and its final counters
    /// * `Err(LinkwatchError)` - A catalog or store failure stopped the phase;
    ///   runs created before the failure are kept, and the batch stays open
    pub async fn run(&self, config_hash: &str) -> Result<CreationSummary> {
        let watermark = self.catalog.index_watermark().await?;
        let batch_id = self.store.create_batch(watermark, config_hash).await?;
        tracing::info!(
            batch_id,
            watermark = ?watermark,
            workers = self.runner.workers(),
            "Creating runs"
        );

        let counters = Arc::new(CreationCounters::default());
        // The active-run check is not atomic with run creation, so a dataset
        // must reach at most one worker per batch.
        let mut seen = HashSet::new();
        let dataset_ids = self
            .catalog
            .list_dataset_ids()
            .map_err(LinkwatchError::from)
            .try_filter(move |id| {
                let first = seen.insert(id.clone());
                if !first {
                    tracing::warn!(dataset = %id, "Skipping repeated dataset id");
                }
                future::ready(first)
            });

        let catalog = Arc::clone(&self.catalog);
        let store = Arc::clone(&self.store);
        let tally = Arc::clone(&counters);
        let sample_size = self.sample_size;

        self.runner
            .run(dataset_ids, move |dataset_id: String| {
                let catalog = Arc::clone(&catalog);
                let store = Arc::clone(&store);
                let tally = Arc::clone(&tally);
                async move {
                    create_run(
                        catalog.as_ref(),
                        store.as_ref(),
                        &tally,
                        batch_id,
                        sample_size,
                        &dataset_id,
                    )
                    .await
                }
            })
            .await?;

        let counts = counters.snapshot();
        self.store.finish_batch(batch_id, &counts).await?;

        tracing::info!(
            batch_id,
            datasets = counts.datasets_seen,
            already_running = counts.already_running,
            not_indexed = counts.not_indexed,
            no_links = counts.no_links,
            runs = counts.runs_created,
            links = counts.links_created,
            "Run creation complete"
        );

        Ok(CreationSummary { batch_id, counts })
    }
}

async fn create_run(
    catalog: &dyn Catalog,
    store: &dyn RunStore,
    counters: &CreationCounters,
    batch_id: i64,
    sample_size: usize,
    dataset_id: &str,
) -> Result<()> {
    counters.datasets_seen.fetch_add(1, Ordering::Relaxed);

    if store.has_active_run(dataset_id).await? {
        tracing::debug!(dataset = dataset_id, "Skipping dataset with an active run");
        counters.already_running.fetch_add(1, Ordering::Relaxed);
        return Ok(());
    }

    let dataset = match catalog.get_dataset(dataset_id).await? {
        Some(dataset) => dataset,
        None => {
            tracing::debug!(dataset = dataset_id, "Skipping dataset without an index");
            counters.not_indexed.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
    };

    let records = catalog
        .sample_records_with_links(dataset_id, sample_size)
        .await?;
    let links = links_from_records(&records);
    if links.is_empty() {
        tracing::debug!(dataset = dataset_id, "Skipping dataset without links");
        counters.no_links.fetch_add(1, Ordering::Relaxed);
        return Ok(());
    }

    store.upsert_dataset(&dataset).await?;
    let run_id = store.create_run(dataset_id, batch_id).await?;
    let created = store.create_links(run_id, &links).await?;

    counters.runs_created.fetch_add(1, Ordering::Relaxed);
    counters.links_created.fetch_add(created, Ordering::Relaxed);
    tracing::debug!(dataset = dataset_id, run_id, links = created, "Created run");
    Ok(())
}

/// Expands sampled records into one unchecked link per referenced URL
fn links_from_records(records: &[Record]) -> Vec<NewLink> {
    let mut links = Vec::new();
    for record in records {
        for link_type in LinkType::all_types() {
            for url in record.urls(link_type) {
                links.push(NewLink {
                    record_id: record.id.clone(),
                    link_type,
                    url: url.clone(),
                    host: extract_host(url),
                });
            }
        }
    }
    links
}
