//! Token-bucket rate limiter layered on the shared cancellation model.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{FlowError, Result};

/// Controls the frequency of events: up to `burst` tokens are held at any
/// time and one token is restored every `1 / per_second` seconds by a
/// background refill task.
///
/// Dropping the limiter stops the refill task.
pub struct RateLimiter {
    tokens: Arc<Semaphore>,
    refill: JoinHandle<()>,
    burst: usize,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("burst", &self.burst)
            .field("available", &self.tokens.available_permits())
            .finish()
    }
}

impl RateLimiter {
    /// Creates a limiter granting `per_second` tokens per second with a
    /// bucket of `burst` tokens, initially full.
    ///
    /// Fails fast with [`FlowError::ZeroRate`] when either argument is zero.
    pub fn new(per_second: u32, burst: usize) -> Result<Self> {
        if per_second == 0 || burst == 0 {
            return Err(FlowError::ZeroRate);
        }

        let tokens = Arc::new(Semaphore::new(burst));
        let interval = Duration::from_secs(1) / per_second;

        let bucket = Arc::clone(&tokens);
        let refill = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The bucket starts full; the first tick fires immediately and
            // must not overfill it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if bucket.available_permits() < burst {
                    bucket.add_permits(1);
                }
            }
        });

        Ok(Self {
            tokens,
            refill,
            burst,
        })
    }

    /// Takes one token, blocking until one is available or `signal` fires.
    pub async fn acquire(&self, signal: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = signal.cancelled() => {
                debug!("rate limiter wait abandoned by cancellation");
                Err(FlowError::cancelled("rate limiter wait"))
            }
            acquired = self.tokens.acquire() => {
                match acquired {
                    Ok(permit) => {
                        // Consume the token instead of returning it on drop.
                        permit.forget();
                        Ok(())
                    }
                    // The semaphore is never closed while the limiter lives.
                    Err(_) => Err(FlowError::cancelled("rate limiter wait")),
                }
            }
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.refill.abort();
    }
}
