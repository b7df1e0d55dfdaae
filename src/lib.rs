//! # Conflux
//!
//! A small generic concurrency toolkit for the tokio runtime: composable
//! pipeline stages, a fan-in merger, a bounded worker pool, an async future,
//! a cyclic barrier, a rate limiter, and a supervising task group with
//! cancellation propagation.
//!
//! Everything is single-process and in-memory: typed data flows through
//! channels under a shared cancellation signal
//! ([`tokio_util::sync::CancellationToken`]). Cancellation is cooperative:
//! in-flight work is never forcibly aborted; suspension points (channel
//! sends and receives, admission waits, barrier waits, future reads) observe
//! the signal and unwind.
//!
//! ## Overview
//!
//! - [`pipeline`]: `generate` / `filter` / `transform` stages chained over
//!   capacity-1 channels with intrinsic backpressure.
//! - [`fan_in`]: merges N input channels into one, closing exactly once.
//! - [`future`]: runs one computation in the background and exposes a
//!   blocking-with-cancellation reader for its result.
//! - [`pool`]: runs a worker over a batch with bounded parallelism,
//!   delivering per-item results so partial failures never abort the batch.
//! - [`barrier`]: reusable rendezvous releasing all parties once a fixed
//!   arrival count is reached.
//! - [`group`]: supervises concurrently launched tasks, captures the first
//!   failure, and cancels siblings through a derived signal.
//! - [`limit`]: token-bucket rate limiter sharing the cancellation model.
//! - [`signal`]: helpers for derived signals, such as deadline tokens.
//! - [`observe`]: optional injected observer for stage lifecycle hooks.
//!
//! ## Example
//!
//! ```
//! use conflux::{fan_in, filter, generate, transform};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let signal = CancellationToken::new();
//! let numbers = generate(&signal, (1..=6).collect());
//! let evens = filter(&signal, numbers, |n| n % 2 == 0);
//! let mut doubled = transform(&signal, evens, |n| n * 2);
//!
//! let mut out = Vec::new();
//! while let Some(n) = doubled.recv().await {
//!     out.push(n);
//! }
//! out.sort_unstable();
//! assert_eq!(out, vec![4, 8, 12]);
//! # let _ = fan_in::<i32>(&signal, Vec::new());
//! # }
//! ```

pub mod barrier;
pub mod error;
pub mod fan_in;
pub mod future;
pub mod group;
pub mod limit;
pub mod observe;
pub mod pipeline;
pub mod pool;
pub mod signal;

pub use barrier::{Barrier, BarrierWaitResult};
pub use error::{FlowError, Result};
pub use fan_in::fan_in;
pub use future::FlowFuture;
pub use group::TaskGroup;
pub use limit::RateLimiter;
pub use observe::{FlowObserver, NoopObserver};
pub use pipeline::{filter, generate, into_stream, transform};
pub use pool::run_pool;
