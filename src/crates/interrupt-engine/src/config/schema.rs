//! Configuration schema for the interrupt engine

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main interrupt engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct InterruptEngineConfig {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Registration lock configuration
    #[serde(default)]
    pub lock: LockConfig,

    /// Tree sweep configuration
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Expiry callback configuration
    #[serde(default)]
    pub expiry: ExpiryConfig,

    /// End-of-plan cleanup worker configuration
    #[serde(default)]
    pub end_worker: EndWorkerConfig,

    /// Periodic sweeper configuration
    #[serde(default)]
    pub sweeper: SweeperConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file path
    pub path: String,

    /// Maximum pooled connections
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "interrupt-engine.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Per-plan registration lock configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LockConfig {
    /// How long `register` waits for the plan lock
    pub wait_timeout_ms: u64,

    /// Lease length of a persistent lock row; expired leases may be taken over
    pub lease_ttl_secs: u64,

    /// Poll interval while waiting on a persistent lock
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 5_000,
            lease_ttl_secs: 60,
            poll_interval_ms: 50,
        }
    }
}

impl LockConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Tree sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// A node this interrupt marked DISCONTINUING within this window is left to
    /// its executor; older ones are finished synchronously
    pub discontinue_grace_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            discontinue_grace_secs: 30,
        }
    }
}

impl MonitorConfig {
    pub fn discontinue_grace(&self) -> Duration {
        Duration::from_secs(self.discontinue_grace_secs)
    }
}

/// Expiry callback configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExpiryConfig {
    /// Deadline for the executor to acknowledge a discontinue before expiry is forced
    pub callback_timeout_secs: u64,

    /// How long a resolution with no registered callback is kept for a late claimant
    pub parked_ttl_secs: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            callback_timeout_secs: 60,
            parked_ttl_secs: 300,
        }
    }
}

impl ExpiryConfig {
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    pub fn parked_ttl(&self) -> Duration {
        Duration::from_secs(self.parked_ttl_secs)
    }
}

/// End-of-plan cleanup worker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EndWorkerConfig {
    /// Bounded queue size between `on_end` and the worker
    pub queue_capacity: usize,

    /// Lock attempts before closing interrupts without the plan lock
    pub lock_attempts: u32,
}

impl Default for EndWorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            lock_attempts: 3,
        }
    }
}

/// Periodic sweeper configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SweeperConfig {
    /// Seconds between sweeps
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { interval_secs: 15 }
    }
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,

    /// Log format: "compact" or "pretty"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}
