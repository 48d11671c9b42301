use hcpool_common::{PoolError, Result};
use std::str::FromStr;
use std::time::Duration;

/// What happens when one client exhausts its connect retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExhaustionPolicy {
    /// Stop the whole pool; the host is presumed unreachable.
    #[default]
    StopPool,
    /// Stop only the exhausted client; the rest of the pool keeps serving.
    StopClient,
}

impl FromStr for ExhaustionPolicy {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stop-pool" => Ok(ExhaustionPolicy::StopPool),
            "stop-client" => Ok(ExhaustionPolicy::StopClient),
            other => Err(PoolError::InvalidConfig(format!(
                "unknown exhaustion policy '{}' (expected stop-pool or stop-client)",
                other
            ))),
        }
    }
}

/// Client pool configuration.
///
/// # Default Configuration
///
/// - `pool_size`: 2
/// - `reconnect_delay_ms`: 2000 (fixed delay between connect attempts)
/// - `max_connect_failures`: 10 (consecutive failures before giving up)
/// - `connect_timeout_ms`: 5000
/// - `exhaustion_policy`: [`ExhaustionPolicy::StopPool`]
/// - `cancel_on_timeout`: true
///
/// # Example
///
/// ```rust
/// use hcpool_client::{ExhaustionPolicy, PoolConfig};
///
/// let config = PoolConfig {
///     pool_size: 8,
///     exhaustion_policy: ExhaustionPolicy::StopClient,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of persistent connections
    pub pool_size: usize,
    /// Fixed backoff before a failed connect is retried, in milliseconds
    pub reconnect_delay_ms: u64,
    /// Consecutive connect failures tolerated per client
    pub max_connect_failures: u32,
    /// Upper bound on a single connect attempt, in milliseconds
    pub connect_timeout_ms: u64,
    /// Reaction to a client exhausting its retries
    pub exhaustion_policy: ExhaustionPolicy,
    /// Whether a request timeout also cancels the serving client
    pub cancel_on_timeout: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            reconnect_delay_ms: 2000,
            max_connect_failures: 10,
            connect_timeout_ms: 5000,
            exhaustion_policy: ExhaustionPolicy::StopPool,
            cancel_on_timeout: true,
        }
    }
}

impl PoolConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Rejects configurations the pool cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(PoolError::InvalidConfig("pool_size must be at least 1".into()));
        }
        if self.max_connect_failures == 0 {
            return Err(PoolError::InvalidConfig(
                "max_connect_failures must be at least 1".into(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(PoolError::InvalidConfig(
                "connect_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
