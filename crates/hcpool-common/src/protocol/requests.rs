use hyper::body::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::PoolError;
use super::responses::Response;
use crate::future::PoolFuture;

/// Header mapping carried by requests and responses.
pub type Headers = BTreeMap<String, String>;

/// The future a request's outcome is delivered through.
pub type ResponseFuture = PoolFuture<Response>;

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("get") {
            Ok(Method::Get)
        } else if s.eq_ignore_ascii_case("post") {
            Ok(Method::Post)
        } else {
            Err(PoolError::InvalidRequest(format!("unsupported method '{}'", s)))
        }
    }
}

/// An outbound request together with the future that receives its outcome.
///
/// A request is built with the consuming `with_*` methods and is not changed
/// after it is handed to the pool. Cloning a request shares the same future,
/// so every clone observes the same outcome.
///
/// There is no correlation identifier: a pooled connection carries at most
/// one request at a time and the next response on that connection belongs to
/// it. Pipelining would need explicit request IDs.
///
/// # Example
///
/// ```
/// use hcpool_common::{Method, Request};
///
/// let request = Request::new(Method::Get, "/status").with_header("accept", "text/plain");
/// assert_eq!(request.method(), Method::Get);
/// assert_eq!(request.headers().get("accept").map(String::as_str), Some("text/plain"));
/// assert!(!request.future().is_resolved());
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    headers: Headers,
    body: Bytes,
    future: ResponseFuture,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Request {
            method,
            path: path.into(),
            headers: Headers::new(),
            body: Bytes::new(),
            future: PoolFuture::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The future this request's outcome is delivered through.
    pub fn future(&self) -> &ResponseFuture {
        &self.future
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({} bytes)", self.method, self.path, self.body.len())
    }
}
