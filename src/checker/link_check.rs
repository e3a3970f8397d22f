//! Link checking phase
//!
//! Streams unchecked links from the store and probes them in parallel. Each
//! check holds its host's admission token only for the duration of the probe;
//! the outcome is recorded after the token is handed back.

use crate::checker::flatten_error_chain;
use crate::checker::prober::Prober;
use crate::engine::{AdmissionGate, ParallelRunner};
use crate::storage::{LinkRecord, LinkStore};
use crate::url::host_key;
use crate::{LinkwatchError, Result};
use futures::TryStreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome counts of a checking phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    /// URLs probed
    pub checked: u64,
    /// URLs found unreachable
    pub failed: u64,
}

#[derive(Debug, Default)]
struct CheckCounters {
    checked: AtomicU64,
    failed: AtomicU64,
}

/// Drives the checking phase
pub struct LinkCheckOrchestrator {
    runner: ParallelRunner,
    gate: AdmissionGate,
    prober: Arc<dyn Prober>,
    store: Arc<dyn LinkStore>,
}

impl LinkCheckOrchestrator {
    /// Creates an orchestrator
    ///
    /// # Arguments
    ///
    /// * `runner` - Worker pool; its shutdown token also interrupts gate waits
    /// * `gate` - Per-host admission control shared by all workers
    /// * `prober` - Network probe
    /// * `store` - Source of unchecked links and sink for outcomes
    pub fn new(
        runner: ParallelRunner,
        gate: AdmissionGate,
        prober: Arc<dyn Prober>,
        store: Arc<dyn LinkStore>,
    ) -> Self {
        Self {
            runner,
            gate,
            prober,
            store,
        }
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Checks every unchecked link
    ///
    /// Probe failures are recorded as outcomes and never fail the phase.
    /// Store, stream, and interruption errors stop the phase and are returned.
    pub async fn run(&self) -> Result<CheckSummary> {
        let counters = Arc::new(CheckCounters::default());
        let links = self.store.stream_unchecked().map_err(LinkwatchError::from);

        tracing::info!(
            workers = self.runner.workers(),
            cooldown_ms = self.gate.cooldown().as_millis() as u64,
            "Checking links"
        );

        let gate = self.gate.clone();
        let prober = Arc::clone(&self.prober);
        let store = Arc::clone(&self.store);
        let cancel = self.runner.shutdown_token().clone();
        let tally = Arc::clone(&counters);

        self.runner
            .run(links, move |link: LinkRecord| {
                let gate = gate.clone();
                let prober = Arc::clone(&prober);
                let store = Arc::clone(&store);
                let cancel = cancel.clone();
                let tally = Arc::clone(&tally);
                async move {
                    check_link(&gate, prober.as_ref(), store.as_ref(), &cancel, &tally, link).await
                }
            })
            .await?;

        let summary = CheckSummary {
            checked: counters.checked.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        };
        tracing::info!(
            checked = summary.checked,
            failed = summary.failed,
            "Link checking complete"
        );
        Ok(summary)
    }
}

async fn check_link(
    gate: &AdmissionGate,
    prober: &dyn Prober,
    store: &dyn LinkStore,
    cancel: &CancellationToken,
    counters: &CheckCounters,
    link: LinkRecord,
) -> Result<()> {
    let key = host_key(&link.url);
    let token = gate.acquire(key.as_deref(), cancel).await?;

    let outcome = prober.probe(&link.url).await;
    gate.release(token);

    let error = outcome.err().map(|e| flatten_error_chain(&e));
    match &error {
        Some(message) => {
            tracing::debug!(url = %link.url, error = %message, "Link unreachable");
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        None => tracing::trace!(url = %link.url, "Link reachable"),
    }

    let updated = store.record_result(&link.url, error.as_deref()).await?;
    counters.checked.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(url = %link.url, updated, "Recorded outcome");
    Ok(())
}
