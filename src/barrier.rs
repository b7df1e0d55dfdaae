//! Reusable rendezvous point for a fixed number of parties.

use std::fmt;

use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{FlowError, Result};

#[derive(Debug)]
struct BarrierState {
    arrived: usize,
    generation: u64,
}

/// Cyclic barrier: blocks callers of [`Barrier::wait`] until `parties` of
/// them have arrived, then releases all of them atomically and resets for
/// the next round.
///
/// A generation counter guards each round: waiters blocked against
/// generation G are released only by the completion of generation G, so a
/// late arrival of a previous round can never spuriously release a new one.
///
/// Cancellation policy: a waiter whose signal fires while blocked withdraws
/// its arrival (the counter is decremented if its generation is still in
/// progress) and returns [`FlowError::Cancelled`]. The barrier stays usable
/// and still requires a full complement of arrivals to release.
pub struct Barrier {
    parties: usize,
    state: Mutex<BarrierState>,
    release: watch::Sender<u64>,
}

impl fmt::Debug for Barrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Barrier")
            .field("parties", &self.parties)
            .finish()
    }
}

/// Outcome of a completed [`Barrier::wait`].
#[derive(Debug, Clone, Copy)]
pub struct BarrierWaitResult {
    leader: bool,
}

impl BarrierWaitResult {
    /// True for exactly one waiter per round: the arrival that tripped the
    /// barrier.
    pub fn is_leader(&self) -> bool {
        self.leader
    }
}

impl Barrier {
    /// Creates a barrier for `parties` participants.
    ///
    /// Fails fast with [`FlowError::ZeroParties`] when `parties` is zero.
    pub fn new(parties: usize) -> Result<Self> {
        if parties == 0 {
            return Err(FlowError::ZeroParties);
        }
        let (release, _) = watch::channel(0);
        Ok(Self {
            parties,
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
            }),
            release,
        })
    }

    /// Number of parties the barrier synchronizes.
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Arrives at the barrier and blocks until all parties of this
    /// generation have arrived or `signal` fires.
    pub async fn wait(&self, signal: &CancellationToken) -> Result<BarrierWaitResult> {
        let generation = {
            let mut state = self.state.lock().await;
            state.arrived += 1;
            trace!(
                arrived = state.arrived,
                parties = self.parties,
                generation = state.generation,
                "barrier arrival"
            );
            if state.arrived == self.parties {
                state.arrived = 0;
                state.generation += 1;
                // Receivers subscribed against the old generation observe
                // the bump; the send only fails with no receivers, which is
                // fine for a single-party barrier.
                let _ = self.release.send(state.generation);
                return Ok(BarrierWaitResult { leader: true });
            }
            state.generation
        };

        let mut release = self.release.subscribe();
        tokio::select! {
            _ = signal.cancelled() => {
                let mut state = self.state.lock().await;
                if state.generation == generation && state.arrived > 0 {
                    state.arrived -= 1;
                    debug!(generation, "barrier waiter withdrew on cancellation");
                }
                Err(FlowError::cancelled("barrier wait"))
            }
            // Map the watch `Ref` guard to `()` before it crosses the
            // `select!` boundary so the future stays `Send`.
            released = async {
                release.wait_for(|current| *current > generation).await.map(|_| ())
            } => {
                match released {
                    Ok(_) => Ok(BarrierWaitResult { leader: false }),
                    // Unreachable while the barrier owns the sender.
                    Err(_) => Err(FlowError::cancelled("barrier wait")),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn zero_parties_fails_fast() {
        assert!(matches!(Barrier::new(0), Err(FlowError::ZeroParties)));
    }

    #[tokio::test]
    async fn single_party_releases_immediately() {
        let barrier = Barrier::new(1).unwrap();
        let signal = CancellationToken::new();
        assert!(barrier.wait(&signal).await.unwrap().is_leader());
    }

    #[tokio::test]
    async fn releases_all_parties_with_one_leader() {
        let barrier = Arc::new(Barrier::new(3).unwrap());
        let signal = CancellationToken::new();

        let mut waiters = Vec::new();
        for _ in 0..3 {
            let barrier = Arc::clone(&barrier);
            let signal = signal.clone();
            waiters.push(tokio::spawn(
                async move { barrier.wait(&signal).await },
            ));
        }

        let mut leaders = 0usize;
        for waiter in waiters {
            let outcome = waiter.await.unwrap().unwrap();
            if outcome.is_leader() {
                leaders += 1;
            }
        }
        assert_eq!(leaders, 1);
    }

    #[tokio::test]
    async fn does_not_release_before_the_last_arrival() {
        let barrier = Arc::new(Barrier::new(2).unwrap());
        let signal = CancellationToken::new();
        let released = Arc::new(AtomicUsize::new(0));

        let early = {
            let barrier = Arc::clone(&barrier);
            let signal = signal.clone();
            let released = Arc::clone(&released);
            tokio::spawn(async move {
                barrier.wait(&signal).await.unwrap();
                released.fetch_add(1, Ordering::SeqCst);
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(released.load(Ordering::SeqCst), 0);

        barrier.wait(&signal).await.unwrap();
        early.await.unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reusable_across_generations() {
        let barrier = Arc::new(Barrier::new(2).unwrap());
        let signal = CancellationToken::new();

        for _round in 0..3 {
            let other = {
                let barrier = Arc::clone(&barrier);
                let signal = signal.clone();
                tokio::spawn(async move { barrier.wait(&signal).await })
            };
            barrier.wait(&signal).await.unwrap();
            other.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn cancelled_waiter_withdraws_its_arrival() {
        let barrier = Arc::new(Barrier::new(2).unwrap());
        let steady = CancellationToken::new();
        let flaky = CancellationToken::new();

        let cancelled = {
            let barrier = Arc::clone(&barrier);
            let flaky = flaky.clone();
            tokio::spawn(async move { barrier.wait(&flaky).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        flaky.cancel();
        let err = cancelled.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());

        // The withdrawn arrival must not count towards the next release:
        // two fresh arrivals are still required.
        let first = {
            let barrier = Arc::clone(&barrier);
            let steady = steady.clone();
            tokio::spawn(async move { barrier.wait(&steady).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!first.is_finished());

        barrier.wait(&steady).await.unwrap();
        first.await.unwrap().unwrap();
    }
}
