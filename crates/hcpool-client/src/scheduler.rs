//! Delayed-task scheduler shared by the pool and its clients.
//!
//! Reconnect backoff and request timeouts are both expressed as "run this
//! closure after a delay". Every task is a tokio task raced against a shared
//! shutdown signal, so [`Scheduler::shutdown`] drops all pending work at
//! once and later calls to [`Scheduler::schedule`] are ignored.

use hcpool_common::{PoolError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to a task created by [`Scheduler::schedule`].
#[derive(Debug)]
pub struct ScheduledTask {
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Cancels the task if it has not run yet.
    pub fn cancel(&self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }

    /// `true` once the task has run, been cancelled, or was never armed.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }
}

/// Delayed-task scheduler bound to a tokio runtime.
///
/// Cloning yields another handle to the same scheduler; shutting down any
/// handle shuts down all of them.
#[derive(Debug, Clone)]
pub struct Scheduler {
    runtime: Handle,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Scheduler {
    pub fn new(runtime: Handle) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            runtime,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Creates a scheduler on the runtime of the calling context.
    pub fn current() -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            PoolError::InvalidState(format!("a tokio runtime is required: {}", e))
        })?;
        Ok(Self::new(runtime))
    }

    /// Runs `task` after `delay` unless the scheduler shuts down first.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> ScheduledTask
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = self.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        ScheduledTask { handle }
    }

    /// Spawns `future` on the scheduler's runtime; it is dropped at shutdown.
    ///
    /// Returns `None` if the scheduler is already shut down.
    pub fn spawn<F>(&self, future: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutdown() {
            return None;
        }
        let shutdown = self.shutdown.subscribe();
        Some(self.runtime.spawn(async move {
            tokio::select! {
                _ = future => {}
                _ = wait_for_shutdown(shutdown) => {}
            }
        }))
    }

    /// Drops every pending task. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    loop {
        let stopped = *shutdown.borrow_and_update();
        if stopped {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
