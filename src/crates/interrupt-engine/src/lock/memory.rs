//! Process-local locker

use super::{LockHandle, Locker};
use crate::error::{InterruptError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Named locks shared by tasks of one process
#[derive(Default)]
pub struct InMemoryLocker {
    locks: DashMap<String, Arc<Mutex<()>>>,
    held: DashMap<String, OwnedMutexGuard<()>>,
}

impl InMemoryLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is currently held
    pub fn is_locked(&self, name: &str) -> bool {
        self.locks
            .get(name)
            .map(|mutex| mutex.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Number of names with a live mutex
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }

    /// Drops the mutex for `name` once no holder or waiter references it
    fn forget_if_idle(&self, name: &str) {
        self.locks
            .remove_if(name, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[async_trait]
impl Locker for InMemoryLocker {
    async fn acquire(&self, name: &str, timeout: Duration) -> Result<LockHandle> {
        let mutex = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let acquired = tokio::time::timeout(timeout, mutex.lock_owned()).await;
        let guard = match acquired {
            Ok(guard) => guard,
            Err(_) => {
                self.forget_if_idle(name);
                return Err(InterruptError::LockAcquisition {
                    name: name.to_string(),
                    timeout,
                });
            }
        };

        let token = Uuid::new_v4().to_string();
        self.held.insert(token.clone(), guard);
        Ok(LockHandle {
            name: name.to_string(),
            token,
        })
    }

    async fn release(&self, handle: LockHandle) -> Result<()> {
        // Dropping the owned guard unlocks the mutex
        self.held.remove(&handle.token);
        self.forget_if_idle(&handle.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_acquire_times_out() {
        let locker = InMemoryLocker::new();
        let held = locker.acquire("a", Duration::from_millis(10)).await.unwrap();
        assert!(locker.is_locked("a"));

        let err = locker.acquire("a", Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, InterruptError::LockAcquisition { .. }));

        // Other names are independent
        let other = locker.acquire("b", Duration::from_millis(10)).await.unwrap();
        locker.release(other).await.unwrap();

        locker.release(held).await.unwrap();
        assert!(!locker.is_locked("a"));
        let again = locker.acquire("a", Duration::from_millis(10)).await.unwrap();
        locker.release(again).await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_names_are_forgotten() {
        let locker = InMemoryLocker::new();
        for n in 0..100 {
            let handle = locker
                .acquire(&format!("plan-{n}"), Duration::from_millis(10))
                .await
                .unwrap();
            locker.release(handle).await.unwrap();
        }
        assert_eq!(locker.tracked(), 0);

        let held = locker.acquire("a", Duration::from_millis(10)).await.unwrap();
        locker.acquire("a", Duration::from_millis(10)).await.unwrap_err();
        // The holder keeps the name alive through a waiter's timeout
        assert_eq!(locker.tracked(), 1);
        assert!(locker.is_locked("a"));

        locker.release(held).await.unwrap();
        assert_eq!(locker.tracked(), 0);
    }

    #[tokio::test]
    async fn test_waiter_keeps_mutex_across_release() {
        let locker = Arc::new(InMemoryLocker::new());
        let held = locker.acquire("a", Duration::from_millis(10)).await.unwrap();

        let waiting = locker.clone();
        let waiter = tokio::spawn(async move { waiting.acquire("a", Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        locker.release(held).await.unwrap();
        let next = waiter.await.unwrap().unwrap();
        assert!(locker.is_locked("a"));
        locker.release(next).await.unwrap();
        assert_eq!(locker.tracked(), 0);
    }
}
