use thiserror::Error;

/// Errors observed by pool callers and logged by the pool itself.
///
/// The type is `Clone` because a single outcome is shared by every listener
/// registered on a [`PoolFuture`](crate::PoolFuture).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Connect failure: {0}")]
    ConnectFailure(String),

    #[error("Connection closed by remote host")]
    TransportDisconnect,

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Request timeout after {0}ms")]
    RequestTimeout(u64),

    #[error("Client protocol violation: {0}")]
    ClientProtocolViolation(String),

    #[error("No ready client available")]
    PoolExhausted,

    #[error("Client pool is stopped")]
    PoolStopped,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl PoolError {
    /// Returns `true` for errors caused by losing the underlying connection.
    ///
    /// These are the failures a caller may reasonably retry on another
    /// connection of the same pool.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            PoolError::TransportDisconnect
                | PoolError::TransportError(_)
                | PoolError::Cancelled
        )
    }
}

impl From<hyper::Error> for PoolError {
    fn from(err: hyper::Error) -> Self {
        PoolError::TransportError(err.to_string())
    }
}

impl From<hyper::http::Error> for PoolError {
    fn from(err: hyper::http::Error) -> Self {
        PoolError::InvalidRequest(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;
