//! Correlation-key based wait/notify
//!
//! A caller registers a [`NotifyCallback`] under a [`CorrelationKey`] with an
//! optional deadline. Exactly one of the callback's entry points runs: on
//! success (`done_with`), on failure (`fail_with`) or when the deadline
//! elapses first. Plain listeners can await a key with `wait_for`.

mod engine;

pub use engine::{InMemoryWaitNotifyEngine, DEFAULT_PARKED_TTL};

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Opaque key correlating a waiter with the event that releases it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey(String);

impl CorrelationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key the executor acknowledges once a node stopped for `interrupt_id`
    pub fn discontinue_ack(node_execution_id: &str, interrupt_id: &str) -> Self {
        Self(format!("{}/{}/discontinue", node_execution_id, interrupt_id))
    }

    /// Key signalled once an expiry finished for the node
    pub fn completion(node_execution_id: &str, interrupt_id: &str) -> Self {
        Self(format!("{}|{}", node_execution_id, interrupt_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a key was resolved
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Done(Value),
    Failed(Value),
    TimedOut,
}

/// Continuation invoked when a key resolves
#[async_trait]
pub trait NotifyCallback: Send + Sync {
    async fn notify(&self, payload: Value);

    async fn notify_error(&self, payload: Value);

    async fn notify_timeout(&self, payload: Value);
}

/// Wait/notify service
#[async_trait]
pub trait WaitNotifyEngine: Send + Sync {
    /// Register `callback` under `key`, replacing any earlier registration
    async fn register(
        &self,
        key: &CorrelationKey,
        callback: Arc<dyn NotifyCallback>,
        timeout: Option<Duration>,
    ) -> Result<()>;

    /// Resolve `key` successfully
    async fn done_with(&self, key: &CorrelationKey, payload: Value) -> Result<()>;

    /// Resolve `key` with an error
    async fn fail_with(&self, key: &CorrelationKey, payload: Value) -> Result<()>;

    /// Receive the next resolution of `key`
    fn wait_for(&self, key: &CorrelationKey) -> oneshot::Receiver<Resolution>;
}
