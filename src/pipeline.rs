//! Composable pipeline stages over cancellation-aware channels.
//!
//! Each stage spawns one producing task that reads its input, applies a
//! single operation, and sends downstream. Backpressure is intrinsic: stage
//! channels have capacity 1, so a producer blocks on `send` until the
//! consumer is ready or the signal fires. A stage's output closes exactly
//! once, on every exit path, when its sender drops.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::observe::{self, FlowObserver};

/// Per-stage channel capacity: at most one in-flight item.
const STAGE_CAPACITY: usize = 1;

/// Emits `items` in order on the returned channel, stopping early if
/// `signal` fires before all items are sent.
pub fn generate<T>(signal: &CancellationToken, items: Vec<T>) -> mpsc::Receiver<T>
where
    T: Send + 'static,
{
    generate_with(signal, items, observe::noop())
}

/// [`generate`] with an injected observer.
pub fn generate_with<T>(
    signal: &CancellationToken,
    items: Vec<T>,
    observer: Arc<dyn FlowObserver>,
) -> mpsc::Receiver<T>
where
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel(STAGE_CAPACITY);
    let signal = signal.clone();

    tokio::spawn(async move {
        observer.stage_started("generate");
        for item in items {
            tokio::select! {
                _ = signal.cancelled() => {
                    debug!(stage = "generate", "stopping on cancellation");
                    break;
                }
                sent = tx.send(item) => {
                    if sent.is_err() {
                        // Consumer went away; nothing left to produce for.
                        break;
                    }
                    observer.item_processed("generate");
                }
            }
        }
        observer.stage_finished("generate");
    });

    rx
}

/// Forwards the items of `input` that satisfy `predicate`, preserving their
/// relative order, until the input closes or `signal` fires.
pub fn filter<T, P>(
    signal: &CancellationToken,
    input: mpsc::Receiver<T>,
    predicate: P,
) -> mpsc::Receiver<T>
where
    T: Send + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
{
    filter_with(signal, input, predicate, observe::noop())
}

/// [`filter`] with an injected observer.
pub fn filter_with<T, P>(
    signal: &CancellationToken,
    mut input: mpsc::Receiver<T>,
    mut predicate: P,
    observer: Arc<dyn FlowObserver>,
) -> mpsc::Receiver<T>
where
    T: Send + 'static,
    P: FnMut(&T) -> bool + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STAGE_CAPACITY);
    let signal = signal.clone();

    tokio::spawn(async move {
        observer.stage_started("filter");
        loop {
            let item = tokio::select! {
                _ = signal.cancelled() => {
                    debug!(stage = "filter", "stopping on cancellation");
                    break;
                }
                received = input.recv() => match received {
                    Some(item) => item,
                    None => break,
                },
            };

            if !predicate(&item) {
                continue;
            }

            tokio::select! {
                _ = signal.cancelled() => {
                    debug!(stage = "filter", "stopping on cancellation");
                    break;
                }
                sent = tx.send(item) => {
                    if sent.is_err() {
                        break;
                    }
                    observer.item_processed("filter");
                }
            }
        }
        observer.stage_finished("filter");
    });

    rx
}

/// Applies `f` to every item of `input`, preserving order, until the input
/// closes or `signal` fires.
pub fn transform<T, R, F>(
    signal: &CancellationToken,
    input: mpsc::Receiver<T>,
    f: F,
) -> mpsc::Receiver<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: FnMut(T) -> R + Send + 'static,
{
    transform_with(signal, input, f, observe::noop())
}

/// [`transform`] with an injected observer.
pub fn transform_with<T, R, F>(
    signal: &CancellationToken,
    mut input: mpsc::Receiver<T>,
    mut f: F,
    observer: Arc<dyn FlowObserver>,
) -> mpsc::Receiver<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: FnMut(T) -> R + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STAGE_CAPACITY);
    let signal = signal.clone();

    tokio::spawn(async move {
        observer.stage_started("transform");
        loop {
            let item = tokio::select! {
                _ = signal.cancelled() => {
                    debug!(stage = "transform", "stopping on cancellation");
                    break;
                }
                received = input.recv() => match received {
                    Some(item) => item,
                    None => break,
                },
            };

            let mapped = f(item);

            tokio::select! {
                _ = signal.cancelled() => {
                    debug!(stage = "transform", "stopping on cancellation");
                    break;
                }
                sent = tx.send(mapped) => {
                    if sent.is_err() {
                        break;
                    }
                    observer.item_processed("transform");
                }
            }
        }
        observer.stage_finished("transform");
    });

    rx
}

/// Wraps a stage output so it can be consumed with `futures`/`tokio-stream`
/// combinators.
pub fn into_stream<T>(receiver: mpsc::Receiver<T>) -> ReceiverStream<T> {
    ReceiverStream::new(receiver)
}
