//! The serial dispatcher: one worker draining the compaction queue.
//!
//! A single execution stream pops one task at a time, honors the flood
//! pause deadline and the admission token bucket, runs the task, and
//! settles its handle. Seriality is load-bearing: a flood wait
//! discovered by one call pauses everything before the next call can
//! race ahead.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::RateLimiter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ThrottleConfig;
use crate::error::{FloodgateError, Result};
use crate::handle::Settlement;
use crate::id::generate_task_key;
use crate::pause::PauseState;
use crate::queue::{CompactionQueue, Priority, TaskFn};

/// Token bucket gating how often the worker may invoke tasks.
type AdmissionLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Backoff after an unexpected worker error before resuming the loop.
const WORKER_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Rate-limited dispatch queue for outgoing messaging API calls.
///
/// Construct one per process and inject it wherever sends happen; the
/// worker starts immediately and runs until [`shutdown`].
///
/// [`shutdown`]: Dispatcher::shutdown
pub struct Dispatcher<T> {
    queue: Arc<CompactionQueue<T>>,
    pause: Arc<Mutex<PauseState>>,
    config: ThrottleConfig,
    shutdown_tx: mpsc::Sender<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T> std::fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> Dispatcher<T> {
    /// Create a dispatcher and start its worker.
    ///
    /// Must be called from within a tokio runtime. Fails if the
    /// throttle configuration does not describe a valid quota.
    pub fn new(config: ThrottleConfig) -> Result<Self> {
        let quota = config.quota()?;

        let queue = Arc::new(CompactionQueue::new());
        let pause = Arc::new(Mutex::new(PauseState::new()));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = tokio::spawn(worker_loop(
            queue.clone(),
            pause.clone(),
            RateLimiter::direct(quota),
            config.flood_cooldown,
            shutdown_rx,
        ));

        tracing::info!(
            calls = config.calls,
            window_ms = config.window.as_millis() as u64,
            "Dispatcher started"
        );

        Ok(Self {
            queue,
            pause,
            config,
            shutdown_tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Submit a task and wait for its outcome.
    ///
    /// With a dedup key, a later submission under the same key replaces
    /// this task's action while it is still queued; every caller
    /// sharing the key observes the outcome of whichever action ran.
    /// Without a key the task gets a generated key that never collides,
    /// so it always executes.
    ///
    /// Rate violations reported by the task are absorbed: the
    /// dispatcher pauses and retries until the task either succeeds or
    /// fails with a different error.
    pub async fn submit<F, Fut>(&self, dedup_key: Option<&str>, task: F) -> Result<T>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.admit(dedup_key, task).wait().await
    }

    /// Submit a task without waiting for the outcome.
    ///
    /// Failures are only observable through logs.
    pub fn submit_detached<F, Fut>(&self, dedup_key: Option<&str>, task: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        drop(self.admit(dedup_key, task));
    }

    fn admit<F, Fut>(&self, dedup_key: Option<&str>, task: F) -> Settlement<T>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let key = match dedup_key {
            Some(key) => key.to_string(),
            None => generate_task_key(),
        };
        let action: TaskFn<T> = Box::new(move || task().boxed());
        self.queue.admit(&key, action, Priority::Normal)
    }

    /// Number of tasks waiting in the queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Get a reference to the shared pause state.
    pub fn pause(&self) -> Arc<Mutex<PauseState>> {
        self.pause.clone()
    }

    /// The throttle configuration this dispatcher runs under.
    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Stop the worker and fail every still-queued task with
    /// [`FloodgateError::Shutdown`].
    ///
    /// A task already executing runs to completion and settles
    /// normally; seriality means there is at most one.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;

        let worker = self.worker.lock().unwrap().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Dispatcher worker ended abnormally");
            }
        }

        while let Some((key, task)) = self.queue.try_pop() {
            tracing::debug!(key = %key, "Failing queued task on shutdown");
            task.settle(Err(FloodgateError::Shutdown));
        }

        tracing::info!("Dispatcher shut down");
    }
}

/// The single execution stream behind a [`Dispatcher`].
async fn worker_loop<T: Clone + Send + Sync + 'static>(
    queue: Arc<CompactionQueue<T>>,
    pause: Arc<Mutex<PauseState>>,
    limiter: AdmissionLimiter,
    flood_cooldown: Duration,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    tracing::info!("Dispatcher worker started");

    loop {
        // Biased so a pending shutdown wins over a non-empty queue
        let (key, task) = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            popped = queue.pop() => popped,
        };

        // Honor the flood pause. Re-check after sleeping: another
        // violation may have pushed the deadline further out.
        loop {
            let wait = pause.lock().unwrap().remaining();
            let Some(wait) = wait else { break };

            tracing::warn!(wait_ms = wait.as_millis() as u64, "Dispatch paused, waiting");
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    task.settle(Err(FloodgateError::Shutdown));
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        // One admission token per outgoing call.
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                task.settle(Err(FloodgateError::Shutdown));
                return;
            }
            _ = limiter.until_ready() => {}
        }

        let outcome = match std::panic::AssertUnwindSafe((task.action)()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(key = %key, "Task panicked");
                // Settle before backing off so the caller is not kept
                // waiting through the recovery sleep
                task.settle(Err(FloodgateError::Task("task panicked".to_string())));
                tokio::time::sleep(WORKER_ERROR_BACKOFF).await;
                continue;
            }
        };

        match outcome {
            Ok(value) => {
                pause.lock().unwrap().record_success();
                task.settle(Ok(value));
            }
            Err(e) if e.is_rate_violation() => {
                let cooldown = e.retry_after().unwrap_or(flood_cooldown);
                pause.lock().unwrap().record_violation(cooldown);
                // The handle stays unsettled; the front-of-queue retry
                // carries it until the flood clears
                queue.readmit(&key, task);
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Task failed");
                task.settle(Err(e));
            }
        }
    }

    tracing::info!("Dispatcher worker stopped");
}
