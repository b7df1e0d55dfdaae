//! Fan-in merger: combines N input channels into one output channel.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::observe::{self, FlowObserver};

/// Merges `inputs` into a single channel.
///
/// One forwarding task per input copies items to the shared output until its
/// input closes or `signal` fires; a coordinating task joins all forwarders,
/// after which the output closes. Interleaving across inputs is
/// nondeterministic by design; ordering within a single input is preserved.
/// The merged channel always closes once every input has closed or the
/// signal has fired; no forwarder is left blocking on a closed output.
pub fn fan_in<T>(signal: &CancellationToken, inputs: Vec<mpsc::Receiver<T>>) -> mpsc::Receiver<T>
where
    T: Send + 'static,
{
    fan_in_with(signal, inputs, observe::noop())
}

/// [`fan_in`] with an injected observer.
pub fn fan_in_with<T>(
    signal: &CancellationToken,
    inputs: Vec<mpsc::Receiver<T>>,
    observer: Arc<dyn FlowObserver>,
) -> mpsc::Receiver<T>
where
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    observer.stage_started("fan_in");

    let mut forwarders = Vec::with_capacity(inputs.len());
    for mut input in inputs {
        let tx = tx.clone();
        let signal = signal.clone();
        let observer = Arc::clone(&observer);
        forwarders.push(tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    _ = signal.cancelled() => {
                        debug!(stage = "fan_in", "forwarder stopping on cancellation");
                        break;
                    }
                    received = input.recv() => match received {
                        Some(item) => item,
                        None => break,
                    },
                };

                tokio::select! {
                    _ = signal.cancelled() => {
                        debug!(stage = "fan_in", "forwarder stopping on cancellation");
                        break;
                    }
                    sent = tx.send(item) => {
                        if sent.is_err() {
                            break;
                        }
                        observer.item_processed("fan_in");
                    }
                }
            }
        }));
    }

    // The forwarders hold the only remaining senders; once the coordinator
    // has joined them all the output is closed.
    drop(tx);

    tokio::spawn(async move {
        for joined in join_all(forwarders).await {
            if let Err(err) = joined {
                warn!(stage = "fan_in", error = %err, "forwarder task failed to join");
            }
        }
        observer.stage_finished("fan_in");
    });

    rx
}
