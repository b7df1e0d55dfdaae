use std::sync::Arc;

use crate::error::FlowError;

/// Hooks invoked by stage-like components at well-defined points.
///
/// Observability is optional: the plain entry points (`generate`, `fan_in`,
/// `run_pool`, ...) run with [`NoopObserver`], while the `*_with` variants
/// accept a caller-supplied implementation. Components never depend on an
/// observer for correctness.
pub trait FlowObserver: Send + Sync {
    /// A stage's producing task has started.
    fn stage_started(&self, _stage: &str) {}

    /// One item passed through the stage.
    fn item_processed(&self, _stage: &str) {}

    /// A per-item failure was recorded (the item's result still flows
    /// downstream).
    fn error_recorded(&self, _stage: &str, _error: &FlowError) {}

    /// The stage's output has closed.
    fn stage_finished(&self, _stage: &str) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl FlowObserver for NoopObserver {}

pub(crate) fn noop() -> Arc<dyn FlowObserver> {
    Arc::new(NoopObserver)
}
