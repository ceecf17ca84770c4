//! Per-type interrupt handlers and the registry resolving them
//!
//! Handlers run with the plan's registration lock held by
//! [`crate::manager::InterruptManager`]; they persist the interrupt and kick
//! off the first round of stop or control actions.

mod abort;
mod abort_all;
mod expire_all;
mod mark_expired;
mod pause_all;
mod resume_all;
mod retry;

pub use abort::AbortInterruptHandler;
pub use abort_all::AbortAllInterruptHandler;
pub use expire_all::ExpireAllInterruptHandler;
pub use mark_expired::MarkExpiredInterruptHandler;
pub use pause_all::PauseAllInterruptHandler;
pub use resume_all::ResumeAllInterruptHandler;
pub use retry::RetryInterruptHandler;

use crate::error::{InterruptError, Result};
use crate::models::{Interrupt, InterruptPackage, InterruptType, NodeExecution};
use crate::services::InterruptServices;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Registers one interrupt type
#[async_trait]
pub trait InterruptHandler: Send + Sync {
    fn interrupt_type(&self) -> InterruptType;

    async fn register_interrupt(&self, package: InterruptPackage) -> Result<Interrupt>;
}

/// Handler lookup by interrupt type
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<InterruptType, Arc<dyn InterruptHandler>>,
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in handler for every interrupt type
    pub fn standard(services: &InterruptServices) -> Self {
        let mut registry = Self::empty();
        for interrupt_type in InterruptType::ALL {
            registry.register(standard_handler(interrupt_type, services));
        }
        registry
    }

    /// Add or replace the handler for its type, returning the replaced one
    pub fn register(
        &mut self,
        handler: Arc<dyn InterruptHandler>,
    ) -> Option<Arc<dyn InterruptHandler>> {
        self.handlers.insert(handler.interrupt_type(), handler)
    }

    pub fn resolve(&self, interrupt_type: InterruptType) -> Result<Arc<dyn InterruptHandler>> {
        self.handlers
            .get(&interrupt_type)
            .cloned()
            .ok_or_else(|| InterruptError::UnsupportedInterruptType(interrupt_type.to_string()))
    }

    pub fn supported_types(&self) -> Vec<InterruptType> {
        InterruptType::ALL
            .into_iter()
            .filter(|ty| self.handlers.contains_key(ty))
            .collect()
    }
}

fn standard_handler(
    interrupt_type: InterruptType,
    services: &InterruptServices,
) -> Arc<dyn InterruptHandler> {
    let services = services.clone();
    match interrupt_type {
        InterruptType::AbortAll => Arc::new(AbortAllInterruptHandler::new(services)),
        InterruptType::Abort => Arc::new(AbortInterruptHandler::new(services)),
        InterruptType::ExpireAll => Arc::new(ExpireAllInterruptHandler::new(services)),
        InterruptType::MarkExpired => Arc::new(MarkExpiredInterruptHandler::new(services)),
        InterruptType::PauseAll => Arc::new(PauseAllInterruptHandler::new(services)),
        InterruptType::ResumeAll => Arc::new(ResumeAllInterruptHandler::new(services)),
        InterruptType::Retry => Arc::new(RetryInterruptHandler::new(services)),
    }
}

/// Register a tree-wide interrupt and run the first monitor pass
///
/// An active interrupt of the same type makes the request a re-entrant
/// convergence attempt: the existing interrupt gets another pass and is
/// returned instead of persisting a duplicate.
pub(crate) async fn register_tree_wide(
    services: &InterruptServices,
    package: InterruptPackage,
) -> Result<Interrupt> {
    let existing = services
        .interrupts
        .find_active(&package.plan_execution_id, Some(package.interrupt_type))
        .await?
        .into_iter()
        .next();

    let interrupt = match existing {
        Some(existing) => {
            info!(
                interrupt_id = %existing.id,
                plan_id = %existing.plan_execution_id,
                interrupt_type = %existing.interrupt_type,
                "Interrupt already active, re-running convergence"
            );
            existing
        }
        None => {
            let interrupt = services
                .interrupts
                .save(&Interrupt::processing(&package))
                .await?;
            info!(
                interrupt_id = %interrupt.id,
                plan_id = %interrupt.plan_execution_id,
                interrupt_type = %interrupt.interrupt_type,
                "Interrupt registered"
            );
            interrupt
        }
    };

    let report = services.monitor.handle(&interrupt).await?;
    debug!(interrupt_id = %interrupt.id, outcome = ?report.outcome, "First monitor pass done");

    services.interrupts.get(&interrupt.id).await
}

/// Load and validate the target node of a node-scoped package
pub(crate) async fn load_target_node(
    services: &InterruptServices,
    package: &InterruptPackage,
) -> Result<NodeExecution> {
    let node_id = package.target_node_execution_id.as_deref().ok_or(
        InterruptError::MissingTargetNode {
            interrupt_type: package.interrupt_type,
        },
    )?;

    let node = services.nodes.get(node_id).await?;
    if node.plan_execution_id != package.plan_execution_id {
        return Err(InterruptError::NodeNotFound(format!(
            "{} in plan {}",
            node_id, package.plan_execution_id
        )));
    }
    Ok(node)
}

/// Reject a node-scoped request against a terminal node
pub(crate) fn ensure_not_terminal(node: &NodeExecution, interrupt_type: InterruptType) -> Result<()> {
    if node.status.is_terminal() {
        return Err(InterruptError::invalid_transition(
            format!("node {}", node.id),
            node.status,
            interrupt_type,
        ));
    }
    Ok(())
}
