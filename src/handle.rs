//! Completion handles bridging dispatcher execution back to callers.
//!
//! A handle settles exactly once; later settle attempts are no-ops.
//! Every caller that compacted into the same dedup key waits on the
//! same handle, so a single execution can resolve many submissions.

use tokio::sync::watch;

use crate::error::{FloodgateError, Result};

/// Write side of a task outcome. Held by the compaction queue until
/// the dispatcher executes the task and settles it.
#[derive(Debug)]
pub struct CompletionHandle<T> {
    tx: watch::Sender<Option<Result<T>>>,
}

/// Read side of a task outcome. Each submission gets one; [`wait`]
/// suspends until the shared handle settles.
///
/// [`wait`]: Settlement::wait
#[derive(Debug)]
pub struct Settlement<T> {
    rx: watch::Receiver<Option<Result<T>>>,
}

impl<T: Clone> CompletionHandle<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Attach a new waiter to this handle.
    pub fn subscribe(&self) -> Settlement<T> {
        Settlement {
            rx: self.tx.subscribe(),
        }
    }

    /// Settle the handle with a final outcome.
    ///
    /// The first settlement wins; returns false if the handle was
    /// already settled.
    pub fn settle(&self, outcome: Result<T>) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

impl<T: Clone> Default for CompletionHandle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Settlement<T> {
    /// Wait for the task outcome.
    ///
    /// Resolves to `Shutdown` if the handle was dropped without being
    /// settled, so a caller can never hang on a dead dispatcher.
    pub async fn wait(mut self) -> Result<T> {
        match self.rx.wait_for(|slot| slot.is_some()).await {
            Ok(settled) => settled.clone().unwrap_or(Err(FloodgateError::Shutdown)),
            Err(_) => Err(FloodgateError::Shutdown),
        }
    }
}
