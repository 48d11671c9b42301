//! Fixed-size pool of persistent connections to one host.
//!
//! The pool owns its clients and a [`ReadyRegistry`] of those currently idle.
//! [`ClientPool::request`] pops idle clients in round-robin order until one
//! accepts the request, and fails fast with [`PoolError::PoolExhausted`] when
//! none is ready. Reconnect backoff and request timeouts run on the pool's
//! [`Scheduler`], which is shut down together with the pool.

use hcpool_common::transport::{Connector, HttpConnector};
use hcpool_common::{PoolError, Request, ResponseFuture, Result};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::config::PoolConfig;
use crate::registry::ReadyRegistry;
use crate::scheduler::{ScheduledTask, Scheduler};
use crate::state::ClientStatus;
use crate::stats::{PoolStats, PoolStatsSnapshot};

/// Stand-in deadline for waits too long to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

pub(crate) struct PoolInner {
    host: String,
    pub(crate) config: PoolConfig,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) stats: PoolStats,
    clients: Mutex<Vec<Arc<Client>>>,
    registry: Mutex<ReadyRegistry<Client>>,
    scheduler: Mutex<Option<Scheduler>>,
    lifecycle: Mutex<Lifecycle>,
    ready_notify: Notify,
}

impl PoolInner {
    /// Registers a client that just became ready. Duplicates are ignored.
    pub(crate) fn add_client(&self, client: &Arc<Client>) {
        if lock(&self.registry).add(client.clone()) {
            self.ready_notify.notify_waiters();
        }
    }

    pub(crate) fn remove_client(&self, client: &Arc<Client>) {
        lock(&self.registry).remove(client);
    }

    /// Forgets a stopped client for good.
    pub(crate) fn client_exit(&self, client: &Arc<Client>) {
        lock(&self.registry).remove(client);
        let remaining = {
            let mut clients = lock(&self.clients);
            clients.retain(|c| !Arc::ptr_eq(c, client));
            clients.len()
        };
        if remaining == 0 && self.is_running() {
            warn!(host = %self.host, "Every client has stopped, pool cannot serve requests");
            self.ready_notify.notify_waiters();
        }
    }

    pub(crate) fn spawn<F>(&self, future: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let scheduler = lock(&self.scheduler).clone()?;
        scheduler.spawn(future)
    }

    pub(crate) fn schedule<F>(&self, delay: Duration, task: F) -> Option<ScheduledTask>
    where
        F: FnOnce() + Send + 'static,
    {
        let scheduler = lock(&self.scheduler).clone()?;
        if scheduler.is_shutdown() {
            return None;
        }
        Some(scheduler.schedule(delay, task))
    }

    pub(crate) fn stop(&self) {
        {
            let mut lifecycle = lock(&self.lifecycle);
            if *lifecycle == Lifecycle::Stopped {
                return;
            }
            *lifecycle = Lifecycle::Stopped;
        }
        self.stats.record_pool_stop();
        info!(host = %self.host, "Stopping client pool");

        if let Some(scheduler) = lock(&self.scheduler).take() {
            scheduler.shutdown();
        }
        let clients = lock(&self.clients).clone();
        for client in clients {
            client.stop();
        }
        lock(&self.registry).clear();
        self.ready_notify.notify_waiters();
    }

    fn cancel_serving(&self, future: &ResponseFuture) {
        let clients = lock(&self.clients).clone();
        for client in clients {
            if client.cancel_if_serving(future) {
                return;
            }
        }
    }

    fn lifecycle(&self) -> Lifecycle {
        *lock(&self.lifecycle)
    }

    fn is_running(&self) -> bool {
        self.lifecycle() == Lifecycle::Running
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        if let Some(scheduler) = lock(&self.scheduler).take() {
            scheduler.shutdown();
        }
    }
}

/// Pool of persistent connections to a single host.
///
/// # Example
///
/// ```no_run
/// use hcpool_client::{ClientPool, PoolConfig};
/// use hcpool_common::Request;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = ClientPool::new("127.0.0.1:8080", PoolConfig::default())?;
/// pool.start()?;
/// pool.wait_ready(Duration::from_secs(5)).await?;
///
/// let response = pool.request_with_timeout(Request::get("/health"), 1000).await?;
/// println!("{}", response.status());
///
/// pool.stop();
/// # Ok(())
/// # }
/// ```
pub struct ClientPool {
    inner: Arc<PoolInner>,
}

impl ClientPool {
    /// Creates an idle HTTP/1.1 pool for `host` (`name` or `name:port`).
    pub fn new(host: impl Into<String>, config: PoolConfig) -> Result<Self> {
        Self::with_connector(host, config, HttpConnector::new())
    }

    /// Creates an idle pool that opens its connections through `connector`.
    pub fn with_connector<C: Connector>(
        host: impl Into<String>,
        config: PoolConfig,
        connector: C,
    ) -> Result<Self> {
        config.validate()?;
        let host = host.into();
        if host.is_empty() {
            return Err(PoolError::InvalidConfig("host must not be empty".into()));
        }

        Ok(Self {
            inner: Arc::new(PoolInner {
                host,
                config,
                connector: Arc::new(connector),
                stats: PoolStats::new(),
                clients: Mutex::new(Vec::new()),
                registry: Mutex::new(ReadyRegistry::new()),
                scheduler: Mutex::new(None),
                lifecycle: Mutex::new(Lifecycle::Idle),
                ready_notify: Notify::new(),
            }),
        })
    }

    /// Creates the clients and begins connecting them.
    ///
    /// Must be called from within a tokio runtime. A pool can be started
    /// only once.
    pub fn start(&self) -> Result<()> {
        let scheduler = Scheduler::current()?;
        {
            let mut lifecycle = lock(&self.inner.lifecycle);
            match *lifecycle {
                Lifecycle::Idle => *lifecycle = Lifecycle::Running,
                Lifecycle::Running => {
                    return Err(PoolError::InvalidState("pool is already started".into()))
                }
                Lifecycle::Stopped => {
                    return Err(PoolError::InvalidState("pool has been stopped".into()))
                }
            }
        }
        *lock(&self.inner.scheduler) = Some(scheduler);

        let clients: Vec<Arc<Client>> = (0..self.inner.config.pool_size)
            .map(|id| {
                Arc::new(Client::new(
                    id,
                    self.inner.host.clone(),
                    Arc::downgrade(&self.inner),
                ))
            })
            .collect();
        *lock(&self.inner.clients) = clients.clone();

        info!(
            host = %self.inner.host,
            "Starting client pool with {} connections",
            clients.len()
        );
        for client in &clients {
            client.start();
        }
        Ok(())
    }

    /// Stops every client and the scheduler. Idempotent.
    ///
    /// In-flight requests fail with [`PoolError::PoolStopped`].
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Sends `request` on the next ready client.
    ///
    /// Never blocks; the returned future is the request's own. It fails
    /// immediately with [`PoolError::PoolExhausted`] if no client is ready
    /// and with [`PoolError::PoolStopped`] if the pool is not running.
    pub fn request(&self, request: Request) -> ResponseFuture {
        let future = request.future().clone();
        if !self.inner.is_running() {
            self.inner.stats.record_rejected();
            future.fail(PoolError::PoolStopped);
            return future;
        }

        let mut request = request;
        loop {
            let next = lock(&self.inner.registry).next_ready();
            let Some(client) = next else {
                debug!(host = %self.inner.host, "No ready client for {}", request);
                self.inner.stats.record_rejected();
                future.fail(PoolError::PoolExhausted);
                return future;
            };
            match client.dispatch(request) {
                Ok(()) => {
                    self.inner.stats.record_dispatched();
                    return future;
                }
                // The client left Ready after it was popped; try the next.
                Err(returned) => request = returned,
            }
        }
    }

    /// Like [`request`](Self::request), but fails the future with
    /// [`PoolError::RequestTimeout`] if it is still unresolved after
    /// `timeout_ms`.
    ///
    /// With [`PoolConfig::cancel_on_timeout`] set, the client serving the
    /// request is cancelled as well, so a late response is never delivered.
    pub fn request_with_timeout(&self, request: Request, timeout_ms: u64) -> ResponseFuture {
        let future = self.request(request);
        if future.is_resolved() {
            return future;
        }

        let pool = Arc::downgrade(&self.inner);
        let pending = future.clone();
        let timer = self.inner.schedule(Duration::from_millis(timeout_ms), move || {
            if !pending.fail(PoolError::RequestTimeout(timeout_ms)) {
                return;
            }
            let Some(pool) = pool.upgrade() else {
                return;
            };
            pool.stats.record_timed_out();
            if pool.config.cancel_on_timeout {
                pool.cancel_serving(&pending);
            }
        });

        if let Some(timer) = timer {
            let timer = Arc::new(timer);
            let on_error = timer.clone();
            future.add_listener(move |_| timer.cancel(), move |_| on_error.cancel());
        }
        future
    }

    /// Runs `task` on the pool's scheduler after `delay`.
    ///
    /// Returns `None` if the pool is not running.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> Option<ScheduledTask>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.schedule(delay, task)
    }

    /// Waits until at least one client is ready.
    ///
    /// Fails with [`PoolError::PoolExhausted`] once every client has stopped
    /// while the pool keeps running.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let now = tokio::time::Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE);
        loop {
            let notified = self.inner.ready_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.inner.lifecycle() {
                Lifecycle::Stopped => return Err(PoolError::PoolStopped),
                Lifecycle::Idle => {
                    return Err(PoolError::InvalidState("pool is not started".into()))
                }
                Lifecycle::Running => {}
            }
            if self.ready_count() > 0 {
                return Ok(());
            }
            if lock(&self.inner.clients).is_empty() {
                return Err(PoolError::PoolExhausted);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                return Err(PoolError::RequestTimeout(timeout_ms));
            }
        }
    }

    /// Registers `client` as ready. Duplicates are ignored.
    pub fn add_client(&self, client: &Arc<Client>) {
        self.inner.add_client(client);
    }

    pub fn remove_client(&self, client: &Arc<Client>) {
        self.inner.remove_client(client);
    }

    /// Permanently removes a stopped client from the pool.
    pub fn client_exit(&self, client: &Arc<Client>) {
        self.inner.client_exit(client);
    }

    pub fn clients(&self) -> Vec<Arc<Client>> {
        lock(&self.inner.clients).clone()
    }

    pub fn client_statuses(&self) -> Vec<ClientStatus> {
        lock(&self.inner.clients).iter().map(|c| c.status()).collect()
    }

    pub fn ready_count(&self) -> usize {
        lock(&self.inner.registry).len()
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        self.inner.stats.snapshot()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
