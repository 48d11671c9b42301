pub mod client;
pub mod config;
pub mod pool;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod stats;

pub use client::Client;
pub use config::{ExhaustionPolicy, PoolConfig};
pub use pool::ClientPool;
pub use registry::ReadyRegistry;
pub use scheduler::{ScheduledTask, Scheduler};
pub use state::{ClientEvent, ClientStatus};
pub use stats::{PoolStats, PoolStatsSnapshot};
