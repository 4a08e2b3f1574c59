//! Keyed background work queue.
//!
//! Requests sharing a [`TaskKey`] run one after another in arrival order;
//! requests with different keys run in parallel, bounded by a global
//! semaphore. Each active key owns one worker task fed by an unbounded
//! channel. A worker retires under the same lock that `submit` uses, so a
//! request is never handed to a worker that is about to exit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, warn};

use crate::task::{TaskKey, TaskRequest};

/// Executes one dequeued request.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Runs the request to completion. Failures are handled internally.
    async fn handle(&self, request: TaskRequest);
}

type Workers = HashMap<TaskKey, mpsc::UnboundedSender<TaskRequest>>;

struct Inner {
    handler: Arc<dyn TaskHandler>,
    workers: Mutex<Workers>,
    permits: Semaphore,
}

impl Inner {
    fn workers(&self) -> MutexGuard<'_, Workers> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Background queue dispatching requests to a [`TaskHandler`].
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("active_keys", &self.active_keys())
            .field("available_permits", &self.inner.permits.available_permits())
            .finish()
    }
}

impl TaskQueue {
    /// Creates a queue allowing `max_concurrent` rounds at once (at least one).
    #[must_use]
    pub fn new(handler: Arc<dyn TaskHandler>, max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                handler,
                workers: Mutex::new(HashMap::new()),
                permits: Semaphore::new(max_concurrent.max(1)),
            }),
        }
    }

    /// Enqueues a request and returns immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, request: TaskRequest) {
        let key = request.key();
        let mut workers = self.inner.workers();

        let request = match workers.get(&key) {
            Some(sender) => match sender.send(request) {
                Ok(()) => {
                    debug!(key = %key, "Queued behind running work for the same key");
                    return;
                }
                Err(mpsc::error::SendError(request)) => request,
            },
            None => request,
        };

        let (sender, receiver) = mpsc::unbounded_channel();
        // The receiver is alive until the worker below starts, so this cannot fail.
        if sender.send(request).is_err() {
            warn!(key = %key, "Dropping request: worker channel closed");
            return;
        }
        workers.insert(key.clone(), sender);
        drop(workers);

        debug!(key = %key, "Starting worker");
        tokio::spawn(run_worker(Arc::clone(&self.inner), key, receiver));
    }

    /// Number of keys that currently have a worker.
    #[must_use]
    pub fn active_keys(&self) -> usize {
        self.inner.workers().len()
    }
}

async fn run_worker(
    inner: Arc<Inner>,
    key: TaskKey,
    mut receiver: mpsc::UnboundedReceiver<TaskRequest>,
) {
    loop {
        let request = match receiver.try_recv() {
            Ok(request) => request,
            Err(_) => {
                let mut workers = inner.workers();
                match receiver.try_recv() {
                    Ok(request) => request,
                    Err(_) => {
                        workers.remove(&key);
                        debug!(key = %key, "Worker idle, retiring");
                        return;
                    }
                }
            }
        };

        let Ok(_permit) = inner.permits.acquire().await else {
            warn!(key = %key, "Concurrency limiter closed, dropping request");
            inner.workers().remove(&key);
            return;
        };

        let handler = Arc::clone(&inner.handler);
        let round = request.round;
        let outcome = tokio::spawn(async move { handler.handle(request).await }).await;
        if let Err(e) = outcome {
            error!(key = %key, round = %round, error = %e, "Task handler panicked");
        }
    }
}
