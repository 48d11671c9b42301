//! hcpool Common Types and Transport
//!
//! This crate provides the value types, the single-resolution async result,
//! and the transport channel boundary shared by the hcpool connection pool.
//!
//! # Overview
//!
//! hcpool keeps a fixed number of persistent keep-alive connections to one
//! remote host and dispatches requests over them, one request per connection
//! at a time. This crate contains the pieces the pool is built from:
//!
//! - **Future**: [`PoolFuture`], resolved exactly once, with listener callbacks
//! - **Protocol**: [`Request`], [`Response`], and the [`PoolError`] taxonomy
//! - **Transport**: the [`Connector`](transport::Connector) /
//!   [`Channel`](transport::Channel) boundary and its HTTP/1.1 implementation
//!
//! # Example
//!
//! ```
//! use hcpool_common::{Request, Response};
//!
//! let request = Request::post("/submit", "hello").with_header("x-trace", "abc");
//! let future = request.future().clone();
//!
//! future.complete(Response::new(200, Default::default(), "ok"));
//! assert!(future.is_resolved());
//! ```

pub mod future;
pub mod protocol;
pub mod transport;

pub use future::PoolFuture;
pub use protocol::*;
