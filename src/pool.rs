//! Bounded worker pool with per-item failure isolation.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;
use crate::observe::{self, FlowObserver};

/// Runs `worker` over every item of `inputs` with at most `concurrency`
/// invocations in flight, returning a channel of per-item results.
///
/// Semantics:
/// - exactly `inputs.len()` results are produced unless `signal` fires, in
///   which case no further inputs are dispatched and fewer results arrive;
/// - admission is a counting semaphore: a permit is acquired before each
///   dispatch and released when the item's task completes;
/// - completion order is unspecified; consumers must not assume input
///   order;
/// - a per-item `Err` is delivered as that item's result and never aborts
///   the rest of the batch;
/// - the output closes only after the dispatch loop has ended and every
///   dispatched task has completed.
///
/// The worker receives a clone of `signal` so long-running items can observe
/// cancellation cooperatively.
///
/// # Panics
///
/// Panics if `concurrency` is zero.
pub fn run_pool<T, R, F, Fut>(
    signal: &CancellationToken,
    inputs: Vec<T>,
    worker: F,
    concurrency: usize,
) -> mpsc::Receiver<Result<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(CancellationToken, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    run_pool_with(signal, inputs, worker, concurrency, observe::noop())
}

/// [`run_pool`] with an injected observer.
///
/// # Panics
///
/// Panics if `concurrency` is zero.
pub fn run_pool_with<T, R, F, Fut>(
    signal: &CancellationToken,
    inputs: Vec<T>,
    worker: F,
    concurrency: usize,
    observer: Arc<dyn FlowObserver>,
) -> mpsc::Receiver<Result<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(CancellationToken, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    assert!(concurrency > 0, "worker pool requires at least one worker");

    // Buffer all results so item tasks never block on a slow consumer.
    let (tx, rx) = mpsc::channel(inputs.len().max(1));
    let signal = signal.clone();
    let permits = Arc::new(Semaphore::new(concurrency));
    let worker = Arc::new(worker);

    tokio::spawn(async move {
        observer.stage_started("worker_pool");
        let mut running = JoinSet::new();

        for item in inputs {
            // Checked before every dispatch attempt; the select below covers
            // a signal that fires while waiting for admission.
            if signal.is_cancelled() {
                debug!(stage = "worker_pool", "dispatch stopped by cancellation");
                break;
            }

            let permit = tokio::select! {
                _ = signal.cancelled() => {
                    debug!(stage = "worker_pool", "dispatch stopped by cancellation");
                    break;
                }
                acquired = Arc::clone(&permits).acquire_owned() => match acquired {
                    Ok(permit) => permit,
                    // The semaphore is never closed while the pool holds it.
                    Err(_) => break,
                },
            };

            let tx = tx.clone();
            let worker = Arc::clone(&worker);
            let scoped = signal.clone();
            let observer = Arc::clone(&observer);
            running.spawn(async move {
                let _admission = permit;
                let outcome = worker(scoped, item).await;
                if let Err(err) = &outcome {
                    observer.error_recorded("worker_pool", err);
                }
                observer.item_processed("worker_pool");
                let _ = tx.send(outcome).await;
            });
        }

        drop(tx);
        while let Some(joined) = running.join_next().await {
            if let Err(err) = joined {
                warn!(stage = "worker_pool", error = %err, "pool task failed to join");
            }
        }
        observer.stage_finished("worker_pool");
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn collect<R>(mut rx: mpsc::Receiver<Result<R>>) -> Vec<Result<R>> {
        let mut out = Vec::new();
        while let Some(res) = rx.recv().await {
            out.push(res);
        }
        out
    }

    #[tokio::test]
    async fn produces_one_result_per_input() {
        let signal = CancellationToken::new();
        let results = run_pool(
            &signal,
            vec![1, 2, 3, 4, 5],
            |_signal, n: i32| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(n * n)
            },
            2,
        );

        let mut squares: Vec<i32> = collect(results)
            .await
            .into_iter()
            .map(|res| res.unwrap())
            .collect();
        squares.sort_unstable();
        assert_eq!(squares, vec![1, 4, 9, 16, 25]);
    }

    #[tokio::test]
    async fn per_item_failures_do_not_abort_the_batch() {
        let signal = CancellationToken::new();
        let results = run_pool(
            &signal,
            (1..=6).collect(),
            |_signal, n: i32| async move {
                if n % 3 == 0 {
                    Err(FlowError::task(anyhow::anyhow!("item {n} rejected")))
                } else {
                    Ok(n)
                }
            },
            3,
        );

        let outcomes = collect(results).await;
        assert_eq!(outcomes.len(), 6);
        let failures = outcomes.iter().filter(|res| res.is_err()).count();
        assert_eq!(failures, 2);
        let successes = outcomes.iter().filter(|res| res.is_ok()).count();
        assert_eq!(successes, 4);
    }

    #[tokio::test]
    async fn never_exceeds_the_concurrency_bound() {
        let signal = CancellationToken::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            run_pool(
                &signal,
                (0..16).collect(),
                move |_signal, n: u32| {
                    let in_flight = Arc::clone(&in_flight);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(n)
                    }
                },
                3,
            )
        };

        assert_eq!(collect(results).await.len(), 16);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn cancellation_stops_dispatch() {
        let signal = CancellationToken::new();
        signal.cancel();

        let results = run_pool(
            &signal,
            (0..100).collect(),
            |_signal, n: u32| async move { Ok(n) },
            4,
        );

        // With the signal already fired, no input is dispatched.
        assert!(collect(results).await.is_empty());
    }

    #[tokio::test]
    async fn empty_input_closes_immediately() {
        let signal = CancellationToken::new();
        let results = run_pool(
            &signal,
            Vec::<u32>::new(),
            |_signal, n| async move { Ok(n) },
            1,
        );
        assert!(collect(results).await.is_empty());
    }

    #[tokio::test]
    #[should_panic(expected = "at least one worker")]
    async fn zero_concurrency_fails_fast() {
        let signal = CancellationToken::new();
        let _ = run_pool(
            &signal,
            vec![1u32],
            |_signal, n| async move { Ok(n) },
            0,
        );
    }
}
