//! Per-host admission gate
//!
//! At most one check per host key is in flight, and a released host stays
//! closed for a cooldown before the next check may start. Each host gets a
//! binary semaphore that lives in a `DashMap`; records are created on demand
//! and retired once the host goes idle, so the map does not grow with the
//! number of hosts seen over a run.

use crate::engine::release::ReleaseScheduler;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Number of checks allowed in flight against one host
pub const PERMITS_PER_HOST: usize = 1;

/// Errors that can occur while waiting for admission
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("Interrupted while waiting for admission to {host}")]
    Interrupted { host: String },
}

/// Throttling record for a single host
#[derive(Debug)]
struct HostThrottle {
    permits: Semaphore,
    waiting: AtomicUsize,
}

impl HostThrottle {
    /// A record whose only permit already belongs to its creator
    fn held() -> Self {
        Self {
            permits: Semaphore::new(PERMITS_PER_HOST - 1),
            waiting: AtomicUsize::new(0),
        }
    }

    /// Nobody holds, waits on, or is about to wait on this record
    fn is_idle(&self) -> bool {
        self.waiting.load(Ordering::Acquire) == 0
            && self.permits.available_permits() == PERMITS_PER_HOST
    }
}

/// Decrements the waiter count however the wait ends
struct WaitingGuard<'a>(&'a HostThrottle);

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.waiting.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug)]
struct GateInner {
    hosts: DashMap<String, Arc<HostThrottle>>,
    cooldown: Duration,
    scheduler: ReleaseScheduler,
}

impl GateInner {
    fn release_now(&self, host: &str, throttle: &Arc<HostThrottle>) {
        throttle.permits.add_permits(1);
        self.try_retire(host, throttle);
    }

    /// Best-effort removal of an idle record
    ///
    /// Only removes the exact record that was released, and only while it is
    /// idle. A record that is in use or was replaced stays where it is.
    fn try_retire(&self, host: &str, throttle: &Arc<HostThrottle>) -> bool {
        let retired = self
            .hosts
            .remove_if(host, |_, current| {
                Arc::ptr_eq(current, throttle) && current.is_idle()
            })
            .is_some();

        if retired {
            tracing::trace!(host, "Retired admission record");
        }
        retired
    }
}

/// Admission control partitioned by host key
///
/// Cloning is cheap; clones share the same host map and scheduler.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    inner: Arc<GateInner>,
}

impl AdmissionGate {
    /// Creates a gate that keeps each host closed for `cooldown` after a check
    ///
    /// # Arguments
    ///
    /// * `cooldown` - Minimum time between the end of one check and the start
    ///   of the next against the same host
    /// * `scheduler` - Timer service that performs the delayed releases
    pub fn new(cooldown: Duration, scheduler: ReleaseScheduler) -> Self {
        Self {
            inner: Arc::new(GateInner {
                hosts: DashMap::new(),
                cooldown,
                scheduler,
            }),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.inner.cooldown
    }

    /// Number of hosts that currently have a throttling record
    pub fn tracked_hosts(&self) -> usize {
        self.inner.hosts.len()
    }

    /// Waits until the calling task is the sole holder for `host_key`
    ///
    /// An absent or empty host key is not throttled and yields an empty token
    /// immediately.
    ///
    /// # Arguments
    ///
    /// * `host_key` - Partition key from [`crate::url::host_key`]
    /// * `cancel` - Abandons the wait when cancelled
    ///
    /// # Returns
    ///
    /// * `Ok(AdmissionToken)` - The caller may check the link; the token must
    ///   be handed back through [`AdmissionGate::release`] (or dropped)
    /// * `Err(AdmissionError::Interrupted)` - `cancel` fired while waiting; no
    ///   permit was taken and there is nothing to release
    pub async fn acquire(
        &self,
        host_key: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<AdmissionToken, AdmissionError> {
        let host = match host_key {
            Some(host) if !host.is_empty() => host,
            _ => return Ok(AdmissionToken::unthrottled()),
        };

        loop {
            let throttle = match self.inner.hosts.entry(host.to_string()) {
                Entry::Vacant(slot) => {
                    let throttle = Arc::new(HostThrottle::held());
                    slot.insert(Arc::clone(&throttle));
                    tracing::trace!(host, "Created admission record");
                    return Ok(self.lease(host, throttle));
                }
                Entry::Occupied(slot) => {
                    let throttle = Arc::clone(slot.get());
                    throttle.waiting.fetch_add(1, Ordering::AcqRel);
                    throttle
                }
            };

            let waiting = WaitingGuard(&throttle);
            let acquired = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                permit = throttle.permits.acquire() => {
                    // Semaphores in the map are never closed
                    permit.map(|permit| permit.forget()).is_ok()
                }
            };
            drop(waiting);

            if !acquired {
                tracing::debug!(host, "Admission wait interrupted");
                return Err(AdmissionError::Interrupted {
                    host: host.to_string(),
                });
            }

            // Fallback: a counted waiter keeps its record from being retired,
            // so this only fails closed if that ever stops holding.
            let current = self
                .inner
                .hosts
                .get(host)
                .map(|entry| Arc::ptr_eq(entry.value(), &throttle))
                .unwrap_or(false);

            if current {
                return Ok(self.lease(host, throttle));
            }

            tracing::trace!(host, "Admission record was replaced, retrying");
            throttle.permits.add_permits(1);
        }
    }

    /// Hands a token back; the host reopens after the cooldown
    ///
    /// The cooldown is measured from this call, so call it as soon as the
    /// check completes.
    pub fn release(&self, token: AdmissionToken) {
        token.release();
    }

    /// Waits for every scheduled release to run
    pub async fn quiesce(&self) {
        self.inner.scheduler.drain().await;
    }

    fn lease(&self, host: &str, throttle: Arc<HostThrottle>) -> AdmissionToken {
        AdmissionToken {
            lease: Some(Lease {
                host: host.to_string(),
                throttle,
                gate: Arc::clone(&self.inner),
            }),
        }
    }
}

/// Proof of admission for one check
///
/// Dropping a token that was not released schedules the same delayed
/// release, so a cancelled check cannot leave its host closed forever.
#[must_use = "a token keeps its host closed until it is released"]
pub struct AdmissionToken {
    lease: Option<Lease>,
}

struct Lease {
    host: String,
    throttle: Arc<HostThrottle>,
    gate: Arc<GateInner>,
}

impl Lease {
    fn schedule_release(self) {
        let scheduler = self.gate.scheduler.clone();
        let cooldown = self.gate.cooldown;
        scheduler.schedule(cooldown, move || {
            self.gate.release_now(&self.host, &self.throttle);
        });
    }
}

impl AdmissionToken {
    fn unthrottled() -> Self {
        Self { lease: None }
    }

    /// The host key this token admits, or None for an unthrottled token
    pub fn host_key(&self) -> Option<&str> {
        self.lease.as_ref().map(|lease| lease.host.as_str())
    }

    pub fn is_throttled(&self) -> bool {
        self.lease.is_some()
    }

    fn release(mut self) {
        if let Some(lease) = self.lease.take() {
            lease.schedule_release();
        }
    }
}

impl Drop for AdmissionToken {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            tracing::debug!(host = %lease.host, "Admission token dropped without release");
            lease.schedule_release();
        }
    }
}

impl std::fmt::Debug for AdmissionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionToken")
            .field("host", &self.host_key())
            .finish()
    }
}
