//! Lease-based locker on the `persistent_locks` table
//!
//! A row is a lease: `owner` holds `name` until `expires_at` (unix millis).
//! An expired lease may be taken over by anyone, so a crashed holder never
//! blocks a plan for longer than the lease TTL.

use super::{LockHandle, Locker};
use crate::db::Database;
use crate::error::{InterruptError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};
use uuid::Uuid;

/// Locker shared by every process using the same database
#[derive(Clone, Debug)]
pub struct SqliteLocker {
    db: Arc<Database>,
    lease_ttl: Duration,
    poll_interval: Duration,
}

impl SqliteLocker {
    pub fn new(db: Arc<Database>, lease_ttl: Duration, poll_interval: Duration) -> Self {
        Self {
            db,
            lease_ttl,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    async fn try_acquire(&self, name: &str, owner: &str) -> Result<bool> {
        let now = Utc::now().timestamp_millis();
        let expires_at = now + self.lease_ttl.as_millis() as i64;

        let result = sqlx::query(
            "INSERT INTO persistent_locks (name, owner, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET owner = excluded.owner, expires_at = excluded.expires_at
             WHERE persistent_locks.expires_at <= ?",
        )
        .bind(name)
        .bind(owner)
        .bind(expires_at)
        .bind(now)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Locker for SqliteLocker {
    async fn acquire(&self, name: &str, timeout: Duration) -> Result<LockHandle> {
        let owner = Uuid::new_v4().to_string();
        let deadline = Instant::now() + timeout;

        loop {
            if self.try_acquire(name, &owner).await? {
                debug!(lock = %name, owner = %owner, "Lease acquired");
                return Ok(LockHandle {
                    name: name.to_string(),
                    token: owner,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(InterruptError::LockAcquisition {
                    name: name.to_string(),
                    timeout,
                });
            }

            trace!(lock = %name, "Lease held elsewhere, polling");
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn release(&self, handle: LockHandle) -> Result<()> {
        let result = sqlx::query("DELETE FROM persistent_locks WHERE name = ? AND owner = ?")
            .bind(&handle.name)
            .bind(&handle.token)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            debug!(lock = %handle.name, "Lease already lost before release");
        }
        Ok(())
    }
}
