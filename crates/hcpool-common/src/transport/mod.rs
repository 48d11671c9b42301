//! hcpool Transport Layer
//!
//! This module defines the boundary between a pooled client and the raw
//! network connection it owns.
//!
//! # Architecture
//!
//! - **[`Connector`]**: opens a new connection to a host and hands back a
//!   [`Channel`]. Every reconnect goes through the connector again, so a
//!   channel is replaced wholesale, never repaired in place.
//! - **[`Channel`]**: writes one request at a time and can be closed.
//! - **[`ChannelEvent`]**: asynchronous notifications (connection active or
//!   lost, transport error, decoded response) sent to the owning client over
//!   an unbounded tokio channel.
//!
//! The default implementation, [`HttpConnector`], speaks HTTP/1.1 with
//! keep-alive using hyper.
//!
//! # Example
//!
//! ```no_run
//! use hcpool_common::transport::{ChannelEvent, Connector, HttpConnector};
//! use hcpool_common::Request;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (events_tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//! let mut channel = HttpConnector::new().connect("127.0.0.1:8080", events_tx).await?;
//!
//! channel.write(&Request::get("/"))?;
//! while let Some(event) = events.recv().await {
//!     if let ChannelEvent::Response(response) = event {
//!         println!("{}", response.status());
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod http;

use futures::future::BoxFuture;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::protocol::error::Result;
use crate::protocol::{Request, Response};

pub use http::{HttpChannel, HttpConnector};

/// Sending half handed to a connector for the lifetime of one channel.
pub type EventSender = UnboundedSender<ChannelEvent>;

/// Receiving half kept by the owning client.
pub type EventReceiver = UnboundedReceiver<ChannelEvent>;

/// Asynchronous notification from a channel to its owning client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The connection is established and usable.
    Active,
    /// The remote side closed the connection.
    Inactive,
    /// The connection failed.
    Error(String),
    /// A complete response was decoded.
    Response(Response),
}

/// One live connection, exclusively owned by a single pooled client.
pub trait Channel: Send {
    /// Starts writing a request. The outcome arrives later as a
    /// [`ChannelEvent`]; an `Err` here means the write could not even start.
    fn write(&mut self, request: &Request) -> Result<()>;

    /// Closes the connection. No further events are delivered.
    fn close(&mut self);
}

/// Opens channels to a remote host.
pub trait Connector: Send + Sync + 'static {
    /// Connects to `addr`. Events for the resulting channel are sent on
    /// `events` until the channel is closed or dropped.
    fn connect(&self, addr: &str, events: EventSender) -> BoxFuture<'static, Result<Box<dyn Channel>>>;
}
