//! Entry point for registering interrupts

use crate::error::{InterruptError, Result};
use crate::handlers::HandlerRegistry;
use crate::lock::{plan_lock_name, LockGuard, Locker};
use crate::models::{Interrupt, InterruptPackage};
use crate::repositories::PlanExecutionService;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Serializes registrations per plan and dispatches them to handlers
pub struct InterruptManager {
    locker: Arc<dyn Locker>,
    registry: Arc<HandlerRegistry>,
    plans: Arc<dyn PlanExecutionService>,
    lock_timeout: Duration,
}

impl InterruptManager {
    pub fn new(
        locker: Arc<dyn Locker>,
        registry: Arc<HandlerRegistry>,
        plans: Arc<dyn PlanExecutionService>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            locker,
            registry,
            plans,
            lock_timeout,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Register an interrupt against a running plan
    ///
    /// Nothing is written before the plan's registration lock is held, so a
    /// lock timeout leaves no partial state behind.
    pub async fn register(&self, package: InterruptPackage) -> Result<Interrupt> {
        let lock_name = plan_lock_name(&package.plan_execution_id);
        debug!(
            plan_id = %package.plan_execution_id,
            interrupt_type = %package.interrupt_type,
            "Registering interrupt"
        );
        let guard = LockGuard::acquire(self.locker.clone(), &lock_name, self.lock_timeout).await?;

        let result = self.register_locked(package).await;

        if let Err(e) = guard.release().await {
            warn!(lock = %lock_name, error = %e, "Failed to release registration lock");
        }

        match &result {
            Ok(interrupt) => info!(
                interrupt_id = %interrupt.id,
                plan_id = %interrupt.plan_execution_id,
                interrupt_type = %interrupt.interrupt_type,
                state = %interrupt.state,
                "Interrupt registration finished"
            ),
            Err(e) => debug!(lock = %lock_name, error = %e, "Interrupt registration failed"),
        }
        result
    }

    async fn register_locked(&self, package: InterruptPackage) -> Result<Interrupt> {
        let plan = self.plans.get(&package.plan_execution_id).await?;
        if plan.is_finished() {
            return Err(InterruptError::PlanAlreadyFinished {
                plan_id: plan.id,
                status: plan.status,
            });
        }

        let handler = self.registry.resolve(package.interrupt_type)?;
        handler.register_interrupt(package).await
    }
}
