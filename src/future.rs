//! Write-once async future with a blocking-with-cancellation reader.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{FlowError, Result};

/// Handle to a computation running in the background.
///
/// The result is stored exactly once, when the computation returns, and can
/// be read any number of times afterwards (hence `T: Clone` on
/// [`FlowFuture::result`]).
pub struct FlowFuture<T> {
    slot: Arc<OnceLock<Result<T>>>,
    ready: watch::Receiver<bool>,
}

impl<T> fmt::Debug for FlowFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowFuture")
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl<T> FlowFuture<T> {
    /// True once the background computation has finished, success or
    /// failure.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }
}

impl<T: Clone> FlowFuture<T> {
    /// Waits for the stored result, racing against the caller's own signal.
    ///
    /// Returns [`FlowError::Cancelled`] if `signal` fires first. The
    /// background computation is not interrupted in that case; it keeps
    /// running to completion and its result remains readable later. Once
    /// ready, `result` is idempotent and repeatable.
    pub async fn result(&self, signal: &CancellationToken) -> Result<T> {
        let mut ready = self.ready.clone();
        tokio::select! {
            _ = signal.cancelled() => {
                debug!("future read abandoned by caller cancellation");
                Err(FlowError::cancelled("future result"))
            }
            changed = ready.wait_for(|done| *done) => {
                match changed {
                    Ok(_) => self.stored(),
                    // The producing task dropped its sender without storing a
                    // result, which only happens on panic.
                    Err(_) => self.stored(),
                }
            }
        }
    }

    fn stored(&self) -> Result<T> {
        match self.slot.get() {
            Some(outcome) => outcome.clone(),
            None => Err(FlowError::task(anyhow::anyhow!(
                "background task ended without producing a result"
            ))),
        }
    }
}

/// Runs `f` in a background task immediately and returns its future.
///
/// `f` receives a child of `signal` scoped to this computation; it is
/// expected to observe it cooperatively. The future becomes ready when `f`
/// returns, regardless of success. At most one background task exists per
/// future.
pub fn spawn<T, F, Fut>(signal: &CancellationToken, f: F) -> FlowFuture<T>
where
    T: Send + Sync + 'static,
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let (ready_tx, ready_rx) = watch::channel(false);
    let slot = Arc::new(OnceLock::new());
    let scoped = signal.child_token();

    let write_slot = Arc::clone(&slot);
    tokio::spawn(async move {
        let outcome = f(scoped).await;
        // First write wins; the slot is only ever written here.
        let _ = write_slot.set(outcome);
        let _ = ready_tx.send(true);
    });

    FlowFuture {
        slot,
        ready: ready_rx,
    }
}
