//! Compaction queue: the ordered registry of pending tasks.
//!
//! Tasks are keyed by dedup key. Admitting a key that is already
//! pending replaces the stored action in place and keeps the original
//! completion handle, so a burst of updates to one logical resource
//! collapses to a single execution whose outcome every caller observes.
//! Distinct keys never interact and run in submission order, except
//! flood-recovery retries which jump to the front.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use futures::future::BoxFuture;
use tokio::sync::Notify;

use crate::error::Result;
use crate::handle::{CompletionHandle, Settlement};

/// A queued zero-argument operation. Invoked by the dispatcher; may be
/// invoked again if the task is re-admitted after a flood wait.
pub type TaskFn<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T>> + Send>;

/// Where an admitted task lands in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Append in submission order.
    Normal,
    /// Jump ahead of everything else (flood-recovery retries).
    Front,
}

/// A pending unit of work: the latest installed action for a dedup key
/// plus the completion handles of every caller waiting on it.
pub struct QueuedTask<T> {
    pub action: TaskFn<T>,
    handles: Vec<CompletionHandle<T>>,
}

impl<T: Clone> QueuedTask<T> {
    fn new(action: TaskFn<T>) -> Self {
        Self {
            action,
            handles: vec![CompletionHandle::new()],
        }
    }

    /// Settle every handle attached to this task.
    pub fn settle(&self, outcome: Result<T>) {
        for handle in &self.handles {
            handle.settle(outcome.clone());
        }
    }

    fn subscribe(&self) -> Settlement<T> {
        // Tasks are created with one handle and only ever gain more,
        // so the first handle always exists.
        self.handles[0].subscribe()
    }
}

struct QueueState<T> {
    /// Dedup keys in dispatch order. No duplicates.
    order: VecDeque<String>,
    /// Pending task per key. Always holds the same key set as `order`.
    pending: HashMap<String, QueuedTask<T>>,
}

/// Ordered, deduplicating registry of pending tasks.
pub struct CompactionQueue<T> {
    state: Mutex<QueueState<T>>,
    /// Wakes the dispatcher when work arrives on an empty queue.
    available: Notify,
}

impl<T: Clone> CompactionQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                order: VecDeque::new(),
                pending: HashMap::new(),
            }),
            available: Notify::new(),
        }
    }

    /// Admit a task under `key` and return a settlement to wait on.
    ///
    /// If the key is already pending, the stored action is replaced and
    /// the existing handle is reused (compaction): the new caller waits
    /// on the same outcome as everyone else under that key, and the
    /// key's position in the queue is unchanged.
    pub fn admit(&self, key: &str, action: TaskFn<T>, priority: Priority) -> Settlement<T> {
        let mut state = self.state.lock().unwrap();

        if let Some(task) = state.pending.get_mut(key) {
            task.action = action;
            tracing::debug!(key = %key, "Compacted task");
            return task.subscribe();
        }

        let task = QueuedTask::new(action);
        let settlement = task.subscribe();
        state.pending.insert(key.to_string(), task);
        match priority {
            Priority::Normal => state.order.push_back(key.to_string()),
            Priority::Front => state.order.push_front(key.to_string()),
        }
        drop(state);

        self.available.notify_one();
        settlement
    }

    /// Re-admit a popped task at the front of the queue, keeping its
    /// handles so the original callers still observe the outcome.
    ///
    /// If the key was resubmitted while this task was in flight, the
    /// resubmitted (newer) action wins and this task's handles are
    /// folded into it.
    pub fn readmit(&self, key: &str, task: QueuedTask<T>) {
        let mut state = self.state.lock().unwrap();

        if let Some(existing) = state.pending.get_mut(key) {
            existing.handles.extend(task.handles);
            tracing::debug!(key = %key, "Merged re-admitted task into newer submission");
        } else {
            state.pending.insert(key.to_string(), task);
            state.order.push_front(key.to_string());
        }
        drop(state);

        self.available.notify_one();
    }

    /// Pop the next task, suspending while the queue is empty.
    pub async fn pop(&self) -> (String, QueuedTask<T>) {
        loop {
            // Register for a wakeup before checking, so an admit that
            // lands between the check and the await is not lost
            let notified = self.available.notified();
            if let Some(popped) = self.try_pop() {
                return popped;
            }
            notified.await;
        }
    }

    /// Pop the next task if one is queued.
    pub fn try_pop(&self) -> Option<(String, QueuedTask<T>)> {
        let mut state = self.state.lock().unwrap();
        while let Some(key) = state.order.pop_front() {
            match state.pending.remove(&key) {
                Some(task) => return Some((key, task)),
                None => {
                    // order and pending must always agree
                    debug_assert!(false, "key in order but not pending: {key}");
                    tracing::error!(key = %key, "Queue invariant violated, dropping key");
                }
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for CompactionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
