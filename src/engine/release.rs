//! Delayed release service for admission tokens
//!
//! Releases run as lightweight timer tasks tracked by a `TaskTracker`, so a
//! cooling host never occupies a check worker.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;

/// Schedules closures to run after a delay
#[derive(Debug, Clone, Default)]
pub struct ReleaseScheduler {
    tracker: TaskTracker,
}

impl ReleaseScheduler {
    /// Creates a scheduler with no pending releases
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `release` once `delay` has elapsed, measured from this call
    ///
    /// A zero delay runs the release inline. Outside of a tokio runtime
    /// (e.g. a token dropped during teardown) the release also runs inline,
    /// since no timer is available to wait on.
    pub fn schedule<F>(&self, delay: Duration, release: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if delay.is_zero() {
            release();
            return;
        }

        match Handle::try_current() {
            Ok(handle) => {
                let deadline = Instant::now() + delay;
                self.tracker.spawn_on(
                    async move {
                        tokio::time::sleep_until(deadline).await;
                        release();
                    },
                    &handle,
                );
            }
            Err(_) => {
                tracing::debug!("No runtime available, releasing immediately");
                release();
            }
        }
    }

    /// Number of releases still waiting on their timer
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Waits until every release scheduled so far has run
    ///
    /// The scheduler stays usable afterwards.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
