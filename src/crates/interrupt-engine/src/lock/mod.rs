//! Named mutual exclusion for interrupt registration
//!
//! A [`Locker`] hands out [`LockHandle`]s for a name; [`LockGuard`] wraps one so
//! the lock is released on every exit path, including early returns and
//! panics unwinding through the holder.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryLocker;
pub use sqlite::SqliteLocker;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Lock name serializing registrations for one plan execution
pub fn plan_lock_name(plan_execution_id: &str) -> String {
    format!("interrupt-register/{}", plan_execution_id)
}

/// Proof of ownership of a named lock
#[derive(Debug, PartialEq, Eq)]
pub struct LockHandle {
    pub name: String,
    pub token: String,
}

/// Distributed lock provider
#[async_trait]
pub trait Locker: Send + Sync {
    /// Wait up to `timeout` for the named lock
    ///
    /// Fails with `InterruptError::LockAcquisition` when the wait elapses.
    async fn acquire(&self, name: &str, timeout: Duration) -> Result<LockHandle>;

    /// Release a lock. Releasing a lock that has since been lost is a no-op.
    async fn release(&self, handle: LockHandle) -> Result<()>;
}

/// Scope guard over a held lock
pub struct LockGuard {
    locker: Arc<dyn Locker>,
    handle: Option<LockHandle>,
}

impl LockGuard {
    pub async fn acquire(locker: Arc<dyn Locker>, name: &str, timeout: Duration) -> Result<Self> {
        let handle = locker.acquire(name, timeout).await?;
        debug!(lock = %handle.name, "Lock acquired");
        Ok(Self {
            locker,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.handle.as_ref().map(|h| h.name.as_str())
    }

    /// Release now and report the outcome
    pub async fn release(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => {
                debug!(lock = %handle.name, "Releasing lock");
                self.locker.release(handle).await
            }
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let locker = Arc::clone(&self.locker);
                runtime.spawn(async move {
                    let name = handle.name.clone();
                    if let Err(e) = locker.release(handle).await {
                        warn!(lock = %name, error = %e, "Failed to release dropped lock");
                    }
                });
            }
            Err(_) => {
                warn!(lock = %handle.name, "No runtime to release dropped lock; left to lease expiry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dropped_guard_releases_lock() {
        let locker: Arc<dyn Locker> = Arc::new(InMemoryLocker::new());
        let name = plan_lock_name("plan-1");

        {
            let _guard = LockGuard::acquire(locker.clone(), &name, Duration::from_millis(50))
                .await
                .unwrap();
        }

        // The release runs on a spawned task; the next acquire waits for it
        let guard = LockGuard::acquire(locker.clone(), &name, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(guard.name(), Some("interrupt-register/plan-1"));
        guard.release().await.unwrap();
    }
}
