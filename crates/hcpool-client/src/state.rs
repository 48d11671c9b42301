use hcpool_common::{PoolError, Result};
use serde::Serialize;
use std::fmt;

/// Lifecycle state of a pooled client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    /// Connecting, or waiting for a reconnect attempt
    Starting,
    /// Connected and idle; eligible for dispatch
    Ready,
    /// Serving exactly one request
    Working,
    /// Terminal; no further transitions
    Stopped,
}

/// Something that happened to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    /// The connect attempt succeeded
    Connected,
    /// The pool handed the client a request
    Dispatch,
    /// The channel delivered a decoded response
    ResponseReceived,
    /// The channel reported a disconnect or an error
    ChannelLost,
    /// The in-flight request was cancelled
    Cancel,
    /// Close the channel and connect again
    Restart,
    /// Shut the client down for good
    Stop,
}

impl ClientStatus {
    /// Applies `event` and returns the next status.
    ///
    /// Pairs outside the lifecycle table are rejected with
    /// [`PoolError::ClientProtocolViolation`]; the caller decides how to
    /// recover.
    pub fn transition(self, event: ClientEvent) -> Result<ClientStatus> {
        use ClientEvent::*;
        use ClientStatus::*;

        match (self, event) {
            (_, Stop) => Ok(Stopped),
            (Stopped, _) => Err(violation(self, event)),
            (_, Restart) => Ok(Starting),
            (Starting, Connected) => Ok(Ready),
            (Ready, Dispatch) => Ok(Working),
            (Working, ResponseReceived) => Ok(Ready),
            (Working, Cancel) => Ok(Starting),
            (Ready | Working, ChannelLost) => Ok(Starting),
            _ => Err(violation(self, event)),
        }
    }

    /// Whether a client in this status belongs in the ready registry.
    pub fn is_dispatchable(self) -> bool {
        self == ClientStatus::Ready
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientStatus::Starting => "starting",
            ClientStatus::Ready => "ready",
            ClientStatus::Working => "working",
            ClientStatus::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

fn violation(status: ClientStatus, event: ClientEvent) -> PoolError {
    PoolError::ClientProtocolViolation(format!("{:?} while {}", event, status))
}
