//! Bounded-concurrency executor over a lazily produced sequence
//!
//! A fixed number of workers share one cursor into the input stream. Each
//! worker pulls the next item, runs the operation on it, and loops. The first
//! failure stops further dispatch; items already handed to a worker are
//! allowed to finish before the failure is reported.

use futures::{Stream, StreamExt};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Errors raised by the runner itself rather than by the operation
#[derive(Debug, Error)]
pub enum ParallelError {
    #[error("Execution interrupted")]
    Interrupted,

    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),
}

/// Runs an async operation over every item of a stream with `workers`
/// tasks in parallel
#[derive(Debug, Clone)]
pub struct ParallelRunner {
    workers: usize,
    shutdown: CancellationToken,
}

type FailureSlot<E> = Arc<Mutex<Option<E>>>;

impl ParallelRunner {
    /// Creates a runner
    ///
    /// A worker count of zero is treated as one. Cancelling `shutdown` aborts
    /// a run in progress.
    pub fn new(workers: usize, shutdown: CancellationToken) -> Self {
        Self {
            workers: workers.max(1),
            shutdown,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Applies `op` to every item of `items`, at most `workers` at a time
    ///
    /// Items are pulled one at a time, only when a worker is free, so the
    /// source is never read further ahead than the worker count.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Every item was processed successfully
    /// * `Err(e)` - The first error from either the source or `op`, unchanged;
    ///   [`ParallelError::Interrupted`] if the shutdown token fired, or
    ///   [`ParallelError::WorkerPanicked`] if a worker panicked
    pub async fn run<T, S, F, Fut, E>(&self, items: S, op: F) -> Result<(), E>
    where
        T: Send + 'static,
        S: Stream<Item = Result<T, E>> + Send + Unpin + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: From<ParallelError> + Send + 'static,
    {
        // Fused so workers that reach the end after the first one see None
        // again instead of polling a finished source.
        let cursor = Arc::new(Mutex::new(items.fuse()));
        let op = Arc::new(op);
        let stop = self.shutdown.child_token();
        let failure: FailureSlot<E> = Arc::new(Mutex::new(None));

        let mut workers = JoinSet::new();
        for worker_id in 0..self.workers {
            workers.spawn(worker_loop(
                worker_id,
                Arc::clone(&cursor),
                Arc::clone(&op),
                stop.clone(),
                Arc::clone(&failure),
            ));
        }
        tracing::trace!(workers = self.workers, "Started workers");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    workers.abort_all();
                    while workers.join_next().await.is_some() {}
                    tracing::warn!("Parallel run interrupted");
                    return Err(ParallelError::Interrupted.into());
                }
                joined = workers.join_next() => match joined {
                    None => break,
                    Some(Ok(())) => {}
                    Some(Err(join_error)) => {
                        if join_error.is_panic() {
                            let message = panic_message(join_error);
                            tracing::error!(%message, "Worker panicked");
                            record_failure(
                                &failure,
                                &stop,
                                ParallelError::WorkerPanicked(message).into(),
                            )
                            .await;
                        }
                    }
                }
            }
        }

        let first = failure.lock().await.take();
        match first {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

async fn worker_loop<T, S, F, Fut, E>(
    worker_id: usize,
    cursor: Arc<Mutex<S>>,
    op: Arc<F>,
    stop: CancellationToken,
    failure: FailureSlot<E>,
) where
    S: Stream<Item = Result<T, E>> + Unpin,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let mut processed = 0usize;

    loop {
        let next = {
            let mut items = cursor.lock().await;
            if stop.is_cancelled() {
                break;
            }
            items.next().await
        };

        let item = match next {
            Some(Ok(item)) => item,
            Some(Err(error)) => {
                record_failure(&failure, &stop, error).await;
                break;
            }
            None => break,
        };

        if let Err(error) = (*op)(item).await {
            record_failure(&failure, &stop, error).await;
            break;
        }
        processed += 1;
    }

    tracing::trace!(worker_id, processed, "Worker finished");
}

/// Keeps the first failure and stops further dispatch
async fn record_failure<E>(slot: &Mutex<Option<E>>, stop: &CancellationToken, error: E) {
    let mut first = slot.lock().await;
    if first.is_none() {
        *first = Some(error);
    } else {
        tracing::debug!("Discarding failure after the first");
    }
    stop.cancel();
}

fn panic_message(join_error: JoinError) -> String {
    let payload: Box<dyn Any + Send> = join_error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::{self, BoxStream};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Op(u32),
        Source,
        Parallel(String),
    }

    impl From<ParallelError> for TestError {
        fn from(err: ParallelError) -> Self {
            TestError::Parallel(err.to_string())
        }
    }

    fn items(
        range: std::ops::Range<u32>,
    ) -> impl Stream<Item = Result<u32, TestError>> + Send + Unpin {
        stream::iter(range.map(Ok))
    }

    /// A source that panics if polled again after it has ended
    fn unfold_items(limit: u32) -> BoxStream<'static, Result<u32, TestError>> {
        stream::unfold(0, move |n| async move {
            if n < limit {
                Some((Ok(n), n + 1))
            } else {
                None
            }
        })
        .boxed()
    }

    #[tokio::test]
    async fn test_processes_every_item_once() {
        let runner = ParallelRunner::new(4, CancellationToken::new());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let result = runner
            .run(items(0..50), move |n| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().unwrap().push(n);
                    Ok::<(), TestError>(())
                }
            })
            .await;

        assert_eq!(result, Ok(()));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 50);
        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(unique.len(), 50);
    }

    #[tokio::test]
    async fn test_more_workers_than_items_on_unfold_source() {
        let runner = ParallelRunner::new(8, CancellationToken::new());
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        let result = runner
            .run(unfold_items(3), move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), TestError>(())
                }
            })
            .await;

        assert_eq!(result, Ok(()));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unfold_source_drained_by_many_workers() {
        let runner = ParallelRunner::new(4, CancellationToken::new());
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        let result = runner
            .run(unfold_items(200), move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    tokio::task::yield_now().await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), TestError>(())
                }
            })
            .await;

        assert_eq!(result, Ok(()));
        assert_eq!(count.load(Ordering::SeqCst), 200);
    }

    #[tokio::test]
    async fn test_empty_unfold_source_completes() {
        let runner = ParallelRunner::new(3, CancellationToken::new());
        let result = runner
            .run(unfold_items(0), |_| async { Ok::<(), TestError>(()) })
            .await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_empty_source_completes() {
        let runner = ParallelRunner::new(3, CancellationToken::new());
        let result = runner
            .run(items(0..0), |_| async { Ok::<(), TestError>(()) })
            .await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_zero_workers_treated_as_one() {
        let runner = ParallelRunner::new(0, CancellationToken::new());
        assert_eq!(runner.workers(), 1);

        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let result = runner
            .run(items(0..5), move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), TestError>(())
                }
            })
            .await;

        assert_eq!(result, Ok(()));
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bounded_by_worker_count() {
        let runner = ParallelRunner::new(3, CancellationToken::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (current, max) = (Arc::clone(&in_flight), Arc::clone(&peak));
        let result = runner
            .run(items(0..20), move |_| {
                let (current, max) = (Arc::clone(&current), Arc::clone(&max));
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    max.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), TestError>(())
                }
            })
            .await;

        assert_eq!(result, Ok(()));
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_failure_stops_dispatch() {
        let runner = ParallelRunner::new(2, CancellationToken::new());
        let started = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&started);
        let result = runner
            .run(items(0..100), move |n| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    if n == 3 {
                        return Err(TestError::Op(n));
                    }
                    Ok(())
                }
            })
            .await;

        assert_eq!(result, Err(TestError::Op(3)));
        // Items 0..=3 plus at most one in flight on the other worker
        assert!(started.load(Ordering::SeqCst) <= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_items_finish_after_failure() {
        let runner = ParallelRunner::new(2, CancellationToken::new());
        let finished = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&finished);
        let result = runner
            .run(items(0..2), move |n| {
                let counter = Arc::clone(&counter);
                async move {
                    if n == 0 {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        return Err(TestError::Op(0));
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert_eq!(result, Err(TestError::Op(0)));
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_source_error_propagates() {
        let runner = ParallelRunner::new(2, CancellationToken::new());
        let source = stream::iter(vec![Ok(1), Ok(2), Err(TestError::Source), Ok(4)]);

        let result = runner
            .run(source, |_| async { Ok::<(), TestError>(()) })
            .await;

        assert_eq!(result, Err(TestError::Source));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_run() {
        let shutdown = CancellationToken::new();
        let runner = ParallelRunner::new(2, shutdown.clone());

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            trigger.cancel();
        });

        let result = runner
            .run(items(0..1000), |_| async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<(), TestError>(())
            })
            .await;

        assert_eq!(
            result,
            Err(TestError::Parallel(ParallelError::Interrupted.to_string()))
        );
    }

    #[tokio::test]
    async fn test_worker_panic_reported() {
        let runner = ParallelRunner::new(1, CancellationToken::new());
        let result = runner
            .run(items(0..3), |n| async move {
                if n == 1 {
                    panic!("boom");
                }
                Ok::<(), TestError>(())
            })
            .await;

        assert_eq!(
            result,
            Err(TestError::Parallel("Worker panicked: boom".to_string()))
        );
    }
}
