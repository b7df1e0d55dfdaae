//! Helpers for deriving cancellation signals.
//!
//! Timeouts are layered on cancellation rather than being a separate
//! mechanism: a deadline is just a derived token that fires on its own after
//! a duration, or earlier if its parent fires first.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Returns a child of `parent` that cancels itself after `after` elapses.
///
/// Components accept the result anywhere a plain signal is expected, so a
/// deadline needs no special handling downstream.
pub fn timeout(parent: &CancellationToken, after: Duration) -> CancellationToken {
    let token = parent.child_token();
    let armed = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = armed.cancelled() => {}
            _ = tokio::time::sleep(after) => {
                trace!(?after, "deadline elapsed, firing derived signal");
                armed.cancel();
            }
        }
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_the_duration() {
        let parent = CancellationToken::new();
        let deadline = timeout(&parent, Duration::from_millis(50));
        assert!(!deadline.is_cancelled());

        deadline.cancelled().await;
        assert!(deadline.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn parent_cancellation_propagates_early() {
        let parent = CancellationToken::new();
        let deadline = timeout(&parent, Duration::from_secs(60));
        parent.cancel();
        deadline.cancelled().await;
    }
}
