//! Scripted transport for driving pool lifecycles without sockets.
//!
//! `ScriptedConnector` records the instant of every connect attempt and
//! decides its outcome from a mode plus an optional number of leading
//! failures. Accepted connections return a `MockChannel`; the test keeps a
//! `ChannelHandle` to inspect writes and push events as the remote side.

#![allow(dead_code)]

use futures::future::BoxFuture;
use hcpool_common::transport::{Channel, ChannelEvent, Connector, EventSender};
use hcpool_common::{Headers, PoolError, Request, Response, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Connections succeed (after any scripted leading failures)
    Accept,
    /// Connections are refused
    Refuse,
    /// Connect attempts never finish
    Hang,
}

struct Script {
    mode: Mode,
    fail_first: usize,
    accept_limit: Option<usize>,
    attempts: Vec<Instant>,
    channels: Vec<ChannelHandle>,
}

#[derive(Clone)]
pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub fn new(mode: Mode) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                mode,
                fail_first: 0,
                accept_limit: None,
                attempts: Vec::new(),
                channels: Vec::new(),
            })),
        }
    }

    pub fn accepting() -> Self {
        Self::new(Mode::Accept)
    }

    pub fn refusing() -> Self {
        Self::new(Mode::Refuse)
    }

    /// Refuses the first `n` attempts, then accepts.
    pub fn failing_first(n: usize) -> Self {
        let connector = Self::accepting();
        connector.script.lock().unwrap().fail_first = n;
        connector
    }

    /// Accepts the first `n` connections, then refuses every attempt.
    pub fn accepting_only(n: usize) -> Self {
        let connector = Self::accepting();
        connector.script.lock().unwrap().accept_limit = Some(n);
        connector
    }

    pub fn set_mode(&self, mode: Mode) {
        self.script.lock().unwrap().mode = mode;
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.script.lock().unwrap().attempts.clone()
    }

    /// Gaps between consecutive connect attempts.
    pub fn attempt_gaps(&self) -> Vec<Duration> {
        let attempts = self.attempts();
        attempts.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn channels(&self) -> Vec<ChannelHandle> {
        self.script.lock().unwrap().channels.clone()
    }

    pub fn channel(&self, index: usize) -> ChannelHandle {
        self.channels()[index].clone()
    }

    pub fn latest(&self) -> ChannelHandle {
        self.channels().last().cloned().expect("no channel was opened")
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, addr: &str, events: EventSender) -> BoxFuture<'static, Result<Box<dyn Channel>>> {
        let mut script = self.script.lock().unwrap();
        script.attempts.push(Instant::now());

        if script.fail_first > 0 {
            script.fail_first -= 1;
            let error = PoolError::ConnectFailure(format!("{} refused (scripted)", addr));
            return Box::pin(async move { Err(error) });
        }

        let over_limit = script
            .accept_limit
            .map(|limit| script.channels.len() >= limit)
            .unwrap_or(false);
        let mode = if over_limit { Mode::Refuse } else { script.mode };

        match mode {
            Mode::Refuse => {
                let error = PoolError::ConnectFailure(format!("{} refused", addr));
                Box::pin(async move { Err(error) })
            }
            Mode::Hang => Box::pin(futures::future::pending()),
            Mode::Accept => {
                let handle = ChannelHandle {
                    events: Arc::new(Mutex::new(Some(events.clone()))),
                    writes: Arc::new(Mutex::new(Vec::new())),
                    closed: Arc::new(AtomicBool::new(false)),
                };
                script.channels.push(handle.clone());
                let _ = events.send(ChannelEvent::Active);
                let channel: Box<dyn Channel> = Box::new(MockChannel { handle });
                Box::pin(async move { Ok(channel) })
            }
        }
    }
}

/// The test's view of one accepted connection.
#[derive(Clone)]
pub struct ChannelHandle {
    events: Arc<Mutex<Option<EventSender>>>,
    writes: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl ChannelHandle {
    /// Requests written so far, as `"METHOD path"`.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Delivers an event as if it came from the remote side. Returns
    /// `false` once the channel is closed.
    pub fn push(&self, event: ChannelEvent) -> bool {
        match self.events.lock().unwrap().as_ref() {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }

    pub fn respond(&self, status: u16, body: &str) -> bool {
        self.push(ChannelEvent::Response(Response::new(
            status,
            Headers::new(),
            body.to_string(),
        )))
    }

    pub fn disconnect(&self) -> bool {
        self.push(ChannelEvent::Inactive)
    }

    pub fn fail(&self, message: &str) -> bool {
        self.push(ChannelEvent::Error(message.to_string()))
    }
}

struct MockChannel {
    handle: ChannelHandle,
}

impl Channel for MockChannel {
    fn write(&mut self, request: &Request) -> Result<()> {
        if self.handle.is_closed() {
            return Err(PoolError::TransportDisconnect);
        }
        self.handle
            .writes
            .lock()
            .unwrap()
            .push(format!("{} {}", request.method(), request.path()));
        Ok(())
    }

    fn close(&mut self) {
        self.handle.closed.store(true, Ordering::SeqCst);
        self.handle.events.lock().unwrap().take();
    }
}

/// Lets spawned tasks drain their queues. Under paused time this does not
/// advance the clock past any pending timer.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
