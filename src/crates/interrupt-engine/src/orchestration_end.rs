//! End-of-plan cleanup
//!
//! When a plan reaches a terminal status the orchestrator calls `on_end`; a
//! background worker then closes every interrupt still active for that plan.
//! The worker takes the plan's registration lock so it cannot interleave with
//! a registration in progress.

use crate::config::InterruptEngineConfig;
use crate::error::{InterruptError, Result};
use crate::lock::{plan_lock_name, LockGuard, Locker};
use crate::repositories::InterruptRepository;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Closes the active interrupts of one plan
pub struct PlanInterruptCloser {
    interrupts: Arc<dyn InterruptRepository>,
    locker: Arc<dyn Locker>,
    lock_timeout: Duration,
    lock_attempts: u32,
}

impl PlanInterruptCloser {
    pub fn new(
        interrupts: Arc<dyn InterruptRepository>,
        locker: Arc<dyn Locker>,
        lock_timeout: Duration,
        lock_attempts: u32,
    ) -> Self {
        Self {
            interrupts,
            locker,
            lock_timeout,
            lock_attempts: lock_attempts.max(1),
        }
    }

    /// Close all active interrupts of the plan, returning how many were closed
    pub async fn close(&self, plan_execution_id: &str) -> Result<u64> {
        let guard = self.acquire_lock(plan_execution_id).await;
        let closed = self.interrupts.close_all_active(plan_execution_id).await;

        if let Some(guard) = guard {
            if let Err(e) = guard.release().await {
                warn!(plan_id = %plan_execution_id, error = %e, "Failed to release lock after cleanup");
            }
        }
        closed
    }

    async fn acquire_lock(&self, plan_execution_id: &str) -> Option<LockGuard> {
        let name = plan_lock_name(plan_execution_id);
        for attempt in 1..=self.lock_attempts {
            match LockGuard::acquire(self.locker.clone(), &name, self.lock_timeout).await {
                Ok(guard) => return Some(guard),
                Err(e) => warn!(
                    plan_id = %plan_execution_id,
                    attempt,
                    error = %e,
                    "Cleanup could not take the registration lock"
                ),
            }
        }

        // The plan is terminal, so registrations are rejected anyway
        warn!(plan_id = %plan_execution_id, "Closing interrupts without the registration lock");
        None
    }
}

/// Queues end-of-plan cleanups onto a dedicated worker
pub struct OrchestrationEndInterruptHandler {
    sender: Mutex<Option<mpsc::Sender<String>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    closer: Arc<PlanInterruptCloser>,
}

impl OrchestrationEndInterruptHandler {
    /// Start the worker; must be called from within a tokio runtime
    pub fn spawn(
        interrupts: Arc<dyn InterruptRepository>,
        locker: Arc<dyn Locker>,
        config: &InterruptEngineConfig,
    ) -> Self {
        let closer = Arc::new(PlanInterruptCloser::new(
            interrupts,
            locker,
            config.lock.wait_timeout(),
            config.end_worker.lock_attempts,
        ));
        let (sender, mut receiver) = mpsc::channel::<String>(config.end_worker.queue_capacity.max(1));

        let worker_closer = closer.clone();
        let worker = tokio::spawn(async move {
            debug!("End-of-plan worker started");
            while let Some(plan_execution_id) = receiver.recv().await {
                match worker_closer.close(&plan_execution_id).await {
                    Ok(0) => debug!(plan_id = %plan_execution_id, "No active interrupts at plan end"),
                    Ok(closed) => info!(
                        plan_id = %plan_execution_id,
                        closed,
                        "Closed active interrupts at plan end"
                    ),
                    Err(e) => error!(
                        plan_id = %plan_execution_id,
                        error = %e,
                        "Failed to close interrupts at plan end"
                    ),
                }
            }
            debug!("End-of-plan worker stopped");
        });

        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            closer,
        }
    }

    /// Schedule cleanup for a finished plan without waiting for it
    pub fn on_end(&self, plan_execution_id: &str) -> Result<()> {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or_else(|| InterruptError::Other("End-of-plan worker has shut down".to_string()))?;

        match sender.try_send(plan_execution_id.to_string()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(plan_execution_id)) => {
                warn!(plan_id = %plan_execution_id, "End-of-plan queue full, deferring");
                tokio::spawn(async move {
                    if sender.send(plan_execution_id).await.is_err() {
                        warn!("End-of-plan worker stopped before deferred cleanup");
                    }
                });
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(InterruptError::Other(
                "End-of-plan worker has shut down".to_string(),
            )),
        }
    }

    /// Run cleanup for a plan on the caller's task
    pub async fn close_now(&self, plan_execution_id: &str) -> Result<u64> {
        self.closer.close(plan_execution_id).await
    }

    /// Stop accepting work, drain the queue and join the worker
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "End-of-plan worker panicked");
            }
        }
    }
}
