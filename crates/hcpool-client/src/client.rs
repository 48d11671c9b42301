//! One pooled connection.
//!
//! A [`Client`] owns at most one [`Channel`] and serves at most one request
//! at a time. All of its mutable state (status, in-flight request, channel,
//! channel generation, failure counter) sits behind a single mutex, and every
//! status change goes through [`ClientStatus::transition`].
//!
//! Each connect attempt bumps the channel generation. Connect results and
//! channel events carry the generation they were created for and are dropped
//! if the client has moved on, so a replaced channel can never touch the
//! current request.

use hcpool_common::transport::{Channel, ChannelEvent, EventReceiver};
use hcpool_common::{PoolError, Request, ResponseFuture};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ExhaustionPolicy;
use crate::pool::PoolInner;
use crate::state::{ClientEvent, ClientStatus};

struct ClientState {
    status: ClientStatus,
    request: Option<Request>,
    channel: Option<Box<dyn Channel>>,
    generation: u64,
    connect_failures: u32,
    connected_once: bool,
}

/// A single persistent connection managed by a [`ClientPool`](crate::ClientPool).
pub struct Client {
    id: usize,
    addr: String,
    pool: Weak<PoolInner>,
    state: Mutex<ClientState>,
}

impl Client {
    pub(crate) fn new(id: usize, addr: String, pool: Weak<PoolInner>) -> Self {
        Self {
            id,
            addr,
            pool,
            state: Mutex::new(ClientState {
                status: ClientStatus::Starting,
                request: None,
                channel: None,
                generation: 0,
                connect_failures: 0,
                connected_once: false,
            }),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn status(&self) -> ClientStatus {
        self.lock().status
    }

    /// Consecutive failed connect attempts since the last successful one.
    pub fn connect_failures(&self) -> u32 {
        self.lock().connect_failures
    }

    /// Begins the first connect attempt.
    pub(crate) fn start(self: &Arc<Self>) {
        let mut state = self.lock();
        if state.status != ClientStatus::Starting || state.generation != 0 {
            return;
        }
        state.generation += 1;
        let generation = state.generation;
        drop(state);
        self.begin_connect(generation);
    }

    /// Hands `request` to this client.
    ///
    /// Gives the request back if the client is not `Ready`, so the pool can
    /// try the next one.
    pub(crate) fn dispatch(self: &Arc<Self>, request: Request) -> Result<(), Request> {
        let mut state = self.lock();
        let next = match state.status.transition(ClientEvent::Dispatch) {
            Ok(next) => next,
            Err(_) => return Err(request),
        };
        let Some(channel) = state.channel.as_mut() else {
            return Err(request);
        };

        if let Err(e) = channel.write(&request) {
            if matches!(e, PoolError::InvalidRequest(_)) {
                // Nothing reached the wire; the connection is still good.
                debug!(client = self.id, "Rejected {}: {}", request, e);
                self.with_pool(|pool| pool.add_client(self));
            } else {
                warn!(client = self.id, "Failed to write {}: {}", request, e);
                self.restart_locked(&mut state);
            }
            drop(state);
            if request.future().fail(e) {
                self.with_pool(|pool| pool.stats.record_failed());
            }
            return Ok(());
        }

        debug!(client = self.id, "Dispatched {}", request);
        state.status = next;
        state.request = Some(request);
        Ok(())
    }

    /// Cancels the in-flight request, failing it with
    /// [`PoolError::Cancelled`], and reconnects.
    ///
    /// Returns `false` if the client was not working.
    pub fn cancel(self: &Arc<Self>) -> bool {
        let state = self.lock();
        self.cancel_locked(state)
    }

    /// Cancels the in-flight request only if it is the one behind `future`.
    pub(crate) fn cancel_if_serving(self: &Arc<Self>, future: &ResponseFuture) -> bool {
        let state = self.lock();
        let serving = state
            .request
            .as_ref()
            .map(|r| r.future().ptr_eq(future))
            .unwrap_or(false);
        if !serving {
            return false;
        }
        self.cancel_locked(state)
    }

    fn cancel_locked(self: &Arc<Self>, mut state: MutexGuard<'_, ClientState>) -> bool {
        if state.status.transition(ClientEvent::Cancel).is_err() {
            return false;
        }
        info!(client = self.id, "Cancelling in-flight request");
        let pending = self.restart_locked(&mut state);
        drop(state);

        if let Some(request) = pending {
            if request.future().fail(PoolError::Cancelled) {
                self.with_pool(|pool| pool.stats.record_cancelled());
            }
        }
        true
    }

    /// Closes the channel and connects again.
    ///
    /// A request in flight fails with [`PoolError::TransportDisconnect`].
    pub fn restart(self: &Arc<Self>) {
        let mut state = self.lock();
        let pending = self.restart_locked(&mut state);
        drop(state);
        if let Some(request) = pending {
            if request.future().fail(PoolError::TransportDisconnect) {
                self.with_pool(|pool| pool.stats.record_failed());
            }
        }
    }

    /// Shuts the client down permanently.
    ///
    /// A request in flight fails with [`PoolError::PoolStopped`].
    pub fn stop(self: &Arc<Self>) {
        let mut state = self.lock();
        if state.status == ClientStatus::Stopped {
            return;
        }
        let was_ready = state.status.is_dispatchable();
        state.status = match state.status.transition(ClientEvent::Stop) {
            Ok(next) => next,
            Err(_) => ClientStatus::Stopped,
        };
        if was_ready {
            self.with_pool(|pool| pool.remove_client(self));
        }
        if let Some(mut channel) = state.channel.take() {
            channel.close();
        }
        state.generation += 1;
        let pending = state.request.take();
        drop(state);

        info!(client = self.id, addr = %self.addr, "Client stopped");
        if let Some(request) = pending {
            if request.future().fail(PoolError::PoolStopped) {
                self.with_pool(|pool| pool.stats.record_failed());
            }
        }
        self.with_pool(|pool| pool.client_exit(self));
    }

    /// Moves to `Starting`, drops the current channel and starts a fresh
    /// connect attempt. Returns the request that was in flight, if any; the
    /// caller fails it once the lock is released.
    fn restart_locked(self: &Arc<Self>, state: &mut ClientState) -> Option<Request> {
        let next = match state.status.transition(ClientEvent::Restart) {
            Ok(next) => next,
            Err(_) => return None,
        };
        if state.status.is_dispatchable() {
            self.with_pool(|pool| pool.remove_client(self));
        }
        state.status = next;
        if let Some(mut channel) = state.channel.take() {
            channel.close();
        }
        state.generation += 1;
        let generation = state.generation;
        let pending = state.request.take();
        self.begin_connect(generation);
        pending
    }

    fn begin_connect(self: &Arc<Self>, generation: u64) {
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        let (events_tx, events) = mpsc::unbounded_channel();
        let attempt = pool.connector.connect(&self.addr, events_tx);
        let connect_timeout = pool.config.connect_timeout();

        debug!(client = self.id, addr = %self.addr, generation, "Connecting");
        let client = self.clone();
        let spawned = pool.spawn(async move {
            match tokio::time::timeout(connect_timeout, attempt).await {
                Ok(Ok(channel)) => {
                    if client.on_connected(generation, channel) {
                        client.run_events(generation, events).await;
                    }
                }
                Ok(Err(e)) => client.on_connect_failed(generation, e),
                Err(_) => client.on_connect_failed(
                    generation,
                    PoolError::ConnectFailure(format!(
                        "Connect to {} timed out after {}ms",
                        client.addr,
                        connect_timeout.as_millis()
                    )),
                ),
            }
        });
        if spawned.is_none() {
            debug!(client = self.id, "Scheduler is shut down, connect attempt dropped");
        }
    }

    fn on_connected(self: &Arc<Self>, generation: u64, mut channel: Box<dyn Channel>) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            drop(state);
            channel.close();
            return false;
        }
        let next = match state.status.transition(ClientEvent::Connected) {
            Ok(next) => next,
            Err(e) => {
                warn!(client = self.id, "Connected in unexpected state: {}", e);
                drop(state);
                channel.close();
                return false;
            }
        };

        state.status = next;
        state.channel = Some(channel);
        state.connect_failures = 0;
        let reconnected = std::mem::replace(&mut state.connected_once, true);
        self.with_pool(|pool| {
            if reconnected {
                pool.stats.record_reconnect();
            }
            pool.add_client(self);
        });
        drop(state);

        info!(client = self.id, addr = %self.addr, "Client ready");
        true
    }

    fn on_connect_failed(self: &Arc<Self>, generation: u64, error: PoolError) {
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        let mut state = self.lock();
        if state.generation != generation || state.status != ClientStatus::Starting {
            return;
        }
        state.connect_failures += 1;
        let failures = state.connect_failures;
        drop(state);

        pool.stats.record_connect_failure();
        let cap = pool.config.max_connect_failures;
        if failures >= cap {
            warn!(
                client = self.id,
                addr = %self.addr,
                "Giving up after {} failed connect attempts: {}",
                failures,
                error
            );
            match pool.config.exhaustion_policy {
                ExhaustionPolicy::StopPool => pool.stop(),
                ExhaustionPolicy::StopClient => self.stop(),
            }
            return;
        }

        let delay = pool.config.reconnect_delay();
        warn!(
            client = self.id,
            "Connect attempt {}/{} failed: {}; retrying in {}ms",
            failures,
            cap,
            error,
            delay.as_millis()
        );
        let client = Arc::downgrade(self);
        pool.schedule(delay, move || {
            if let Some(client) = client.upgrade() {
                client.retry_connect(generation);
            }
        });
    }

    fn retry_connect(self: &Arc<Self>, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation || state.status != ClientStatus::Starting {
            return;
        }
        self.restart_locked(&mut state);
    }

    async fn run_events(self: &Arc<Self>, generation: u64, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            if !self.handle_event(generation, event) {
                return;
            }
        }
        // Every sender is gone: the channel died without saying so.
        self.handle_event(generation, ChannelEvent::Inactive);
    }

    /// Applies one channel event. Returns `false` once this channel's
    /// events should no longer be read.
    fn handle_event(self: &Arc<Self>, generation: u64, event: ChannelEvent) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }

        match event {
            ChannelEvent::Active => {
                debug!(client = self.id, "Channel active");
                true
            }
            ChannelEvent::Response(response) => {
                match state.status.transition(ClientEvent::ResponseReceived) {
                    Ok(next) => {
                        let request = state.request.take();
                        state.status = next;
                        self.with_pool(|pool| pool.add_client(self));
                        drop(state);

                        if let Some(request) = request {
                            debug!(client = self.id, status = response.status(), "Response for {}", request);
                            if request.future().complete(response) {
                                self.with_pool(|pool| pool.stats.record_completed());
                            }
                        }
                        true
                    }
                    Err(e) => {
                        warn!(client = self.id, "Discarding unsolicited response: {}", e);
                        self.restart_locked(&mut state);
                        false
                    }
                }
            }
            ChannelEvent::Inactive => self.on_channel_lost(state, PoolError::TransportDisconnect),
            ChannelEvent::Error(message) => {
                self.on_channel_lost(state, PoolError::TransportError(message))
            }
        }
    }

    fn on_channel_lost(self: &Arc<Self>, mut state: MutexGuard<'_, ClientState>, error: PoolError) -> bool {
        if state.status.transition(ClientEvent::ChannelLost).is_err() {
            return false;
        }
        info!(client = self.id, "Channel lost while {}: {}", state.status, error);
        let pending = self.restart_locked(&mut state);
        drop(state);

        if let Some(request) = pending {
            if request.future().fail(error) {
                self.with_pool(|pool| pool.stats.record_failed());
            }
        }
        false
    }

    fn with_pool(&self, f: impl FnOnce(&PoolInner)) {
        if let Some(pool) = self.pool.upgrade() {
            f(&pool);
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("status", &self.status())
            .finish()
    }
}
