//! Supervising task group with first-error capture and sibling
//! cancellation.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{FlowError, Result};

/// Supervises a set of concurrently launched tasks that are part of one
/// overall operation.
///
/// The first task to return an error wins the group's error slot and cancels
/// the derived signal handed out by [`TaskGroup::with_signal`]; siblings are
/// expected to observe that signal cooperatively; the group never forcibly
/// stops a task. Subsequent errors are discarded from the joined outcome and
/// logged at debug level.
///
/// [`TaskGroup::wait`] consumes the group, so launching a task after the
/// join is unrepresentable rather than undefined behaviour.
pub struct TaskGroup {
    derived: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    first_err: Arc<Mutex<Option<FlowError>>>,
}

impl fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGroup")
            .field("outstanding", &self.handles.len())
            .field("cancelled", &self.derived.is_cancelled())
            .finish()
    }
}

impl TaskGroup {
    /// Creates a group whose derived signal is a child of `parent`.
    ///
    /// The returned token fires when any group task fails, when the group is
    /// joined, or when `parent` itself is cancelled.
    pub fn with_signal(parent: &CancellationToken) -> (Self, CancellationToken) {
        let derived = parent.child_token();
        let group = Self {
            derived: derived.clone(),
            handles: Vec::new(),
            first_err: Arc::new(Mutex::new(None)),
        };
        (group, derived)
    }

    /// Launches `task` and tracks it until [`TaskGroup::wait`].
    pub fn go<F>(&mut self, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let derived = self.derived.clone();
        let first_err = Arc::clone(&self.first_err);
        self.handles.push(tokio::spawn(async move {
            if let Err(err) = task.await {
                let mut slot = first_err.lock().await;
                if slot.is_none() {
                    *slot = Some(err);
                    // First failure wins and tears down the siblings.
                    derived.cancel();
                } else {
                    debug!(error = %err, "task group discarding subsequent error");
                }
            }
        }));
    }

    /// Blocks until every launched task has returned, then yields the first
    /// captured error, if any.
    ///
    /// The derived signal is cancelled on the way out so that helpers scoped
    /// to the group stop as well. A panicked task is logged and treated as
    /// finished; it does not poison the join.
    pub async fn wait(mut self) -> Result<()> {
        for handle in self.handles.drain(..) {
            if let Err(err) = handle.await {
                warn!(error = %err, "task group task panicked or was aborted");
            }
        }
        self.derived.cancel();

        let captured = self.first_err.lock().await.take();
        match captured {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
