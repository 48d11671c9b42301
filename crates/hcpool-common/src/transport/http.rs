//! HTTP/1.1 keep-alive channel.
//!
//! Each [`HttpChannel`] wraps one hyper HTTP/1.1 client connection over a
//! tokio `TcpStream`. The hyper connection driver runs on its own task and
//! reports the end of the connection as [`ChannelEvent::Inactive`] (clean
//! close) or [`ChannelEvent::Error`]. Each written request is sent on a
//! separate task that reports the decoded [`Response`] or the failure.

use futures::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::client::conn::http1::{self, SendRequest};
use hyper::header::{CONNECTION, CONTENT_LENGTH, HOST};
use hyper::HeaderMap;
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{Channel, ChannelEvent, Connector, EventSender};
use crate::protocol::error::{PoolError, Result};
use crate::protocol::{Headers, Method, Request, Response};

/// Port used when the host string does not carry one.
pub const DEFAULT_PORT: u16 = 80;

type HttpSender = SendRequest<Full<Bytes>>;

/// Connector producing [`HttpChannel`]s.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector;

impl HttpConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for HttpConnector {
    fn connect(&self, addr: &str, events: EventSender) -> BoxFuture<'static, Result<Box<dyn Channel>>> {
        let host = addr.to_string();
        let authority = with_default_port(addr);

        Box::pin(async move {
            let stream = TcpStream::connect(&authority).await.map_err(|e| {
                PoolError::ConnectFailure(format!("Failed to connect to {}: {}", authority, e))
            })?;
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(%authority, "Failed to set TCP_NODELAY: {}", e);
            }

            let (sender, connection) = http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream))
                .await
                .map_err(|e| {
                    PoolError::ConnectFailure(format!("HTTP handshake with {} failed: {}", authority, e))
                })?;

            let runtime = Handle::current();
            let sender = Arc::new(Mutex::new(sender));
            let driver_sender = sender.clone();
            let driver_events = events.clone();
            let driver = runtime.spawn(async move {
                let event = match connection.await {
                    Ok(()) => ChannelEvent::Inactive,
                    Err(e) => ChannelEvent::Error(e.to_string()),
                };
                // A response read just before the close must be reported first.
                let _in_flight = driver_sender.lock().await;
                let _ = driver_events.send(event);
            });

            let _ = events.send(ChannelEvent::Active);

            Ok(Box::new(HttpChannel {
                host,
                sender,
                events,
                runtime,
                driver,
                in_flight: None,
            }) as Box<dyn Channel>)
        })
    }
}

/// One HTTP/1.1 connection.
pub struct HttpChannel {
    host: String,
    sender: Arc<Mutex<HttpSender>>,
    events: EventSender,
    runtime: Handle,
    driver: JoinHandle<()>,
    in_flight: Option<JoinHandle<()>>,
}

impl Channel for HttpChannel {
    fn write(&mut self, request: &Request) -> Result<()> {
        let http_request = build_http_request(&self.host, request)?;
        let sender = self.sender.clone();
        let events = self.events.clone();

        let task = self.runtime.spawn(async move {
            let mut sender = sender.lock().await;
            let event = match send(&mut sender, http_request).await {
                Ok(response) => ChannelEvent::Response(response),
                Err(e) => ChannelEvent::Error(e.to_string()),
            };
            let _ = events.send(event);
        });

        if let Some(previous) = self.in_flight.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    fn close(&mut self) {
        self.driver.abort();
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
    }
}

impl Drop for HttpChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn send(sender: &mut HttpSender, request: hyper::Request<Full<Bytes>>) -> Result<Response> {
    sender.ready().await?;
    let response = sender.send_request(request).await?;

    let (parts, body) = response.into_parts();
    let body = body.collect().await?.to_bytes();

    Ok(Response::new(parts.status.as_u16(), convert_headers(&parts.headers), body))
}

/// Appends [`DEFAULT_PORT`] when `addr` has no port.
pub fn with_default_port(addr: &str) -> String {
    let has_port = addr
        .rsplit_once(':')
        .map(|(_, port)| port.parse::<u16>().is_ok())
        .unwrap_or(false);

    if has_port {
        addr.to_string()
    } else {
        format!("{}:{}", addr, DEFAULT_PORT)
    }
}

/// Builds the wire request for `request`.
///
/// Adds `Host` and `Connection: keep-alive` unless the caller set them, and
/// `Content-Length` for POST bodies.
pub fn build_http_request(host: &str, request: &Request) -> Result<hyper::Request<Full<Bytes>>> {
    let method = match request.method() {
        Method::Get => hyper::Method::GET,
        Method::Post => hyper::Method::POST,
    };
    let path = if request.path().is_empty() { "/" } else { request.path() };

    let mut builder = hyper::Request::builder().method(method).uri(path);
    for (name, value) in request.headers() {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let has = |name: &str| request.headers().keys().any(|k| k.eq_ignore_ascii_case(name));
    if !has(HOST.as_str()) {
        builder = builder.header(HOST, host);
    }
    if !has(CONNECTION.as_str()) {
        builder = builder.header(CONNECTION, "keep-alive");
    }
    if request.method() == Method::Post && !has(CONTENT_LENGTH.as_str()) {
        builder = builder.header(CONTENT_LENGTH, request.body().len());
    }

    Ok(builder.body(Full::new(request.body().clone()))?)
}

/// Flattens a hyper header map; repeated headers are joined with `", "`.
pub fn convert_headers(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map.iter() {
        let Ok(value) = value.to_str() else {
            continue;
        };
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    headers
}
