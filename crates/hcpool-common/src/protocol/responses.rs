//! Response value type.

use hyper::body::Bytes;

use super::error::{PoolError, Result};
use super::requests::Headers;

/// A decoded response delivered by a transport channel.
///
/// # Example
///
/// ```
/// use hcpool_common::{Headers, Response};
///
/// let mut headers = Headers::new();
/// headers.insert("content-type".to_string(), "text/plain".to_string());
///
/// let response = Response::new(200, headers, "hello");
/// assert!(response.is_success());
/// assert_eq!(response.header("Content-Type"), Some("text/plain"));
/// assert_eq!(response.text().unwrap(), "hello");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    headers: Headers,
    body: Bytes,
}

impl Response {
    pub fn new(status: u16, headers: Headers, body: impl Into<Bytes>) -> Self {
        Response {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Status code (e.g. 200, 404).
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether the status code is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Looks up a header by name, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body decoded as UTF-8.
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| PoolError::TransportError(format!("response body is not UTF-8: {}", e)))
    }
}
