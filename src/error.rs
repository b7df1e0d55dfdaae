use std::sync::Arc;

use thiserror::Error;

/// Error type shared by every component in the toolkit.
///
/// The enum is `Clone` so that a stored outcome (for example the resolved
/// value of a [`FlowFuture`](crate::future::FlowFuture)) can be handed out to
/// repeated readers. Arbitrary caller errors travel inside
/// [`FlowError::Task`] behind an `Arc`.
#[derive(Error, Debug, Clone)]
pub enum FlowError {
    /// The operation was abandoned because its cancellation signal fired
    /// before completion. Distinct from a functional failure.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// A barrier must synchronize at least one party.
    #[error("barrier requires at least one party")]
    ZeroParties,

    /// A rate limiter needs a positive rate and a positive burst size.
    #[error("rate limiter requires a positive rate and burst")]
    ZeroRate,

    /// A unit of user work failed.
    #[error("task failed: {0}")]
    Task(Arc<anyhow::Error>),
}

impl FlowError {
    /// Wraps an arbitrary error as a task failure.
    pub fn task(err: impl Into<anyhow::Error>) -> Self {
        Self::Task(Arc::new(err.into()))
    }

    /// Builds the cancellation error for the named operation.
    pub(crate) fn cancelled(operation: &str) -> Self {
        Self::Cancelled(operation.to_string())
    }

    /// True when the error reports cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

impl From<anyhow::Error> for FlowError {
    fn from(err: anyhow::Error) -> Self {
        Self::Task(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_errors_preserve_the_message() {
        let err = FlowError::task(anyhow::anyhow!("disk on fire"));
        assert!(err.to_string().contains("disk on fire"));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn cancellation_is_distinguishable() {
        let err = FlowError::cancelled("worker pool dispatch");
        assert!(err.is_cancelled());
        assert!(err.to_string().contains("worker pool dispatch"));
    }

    #[test]
    fn errors_clone_for_repeated_reads() {
        let err = FlowError::task(anyhow::anyhow!("once"));
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
