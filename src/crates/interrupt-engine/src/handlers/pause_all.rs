use super::InterruptHandler;
use crate::error::Result;
use crate::executor::NodeSignal;
use crate::models::{Interrupt, InterruptPackage, InterruptType, Status};
use crate::monitor::TreeSnapshot;
use crate::services::InterruptServices;
use async_trait::async_trait;
use tracing::{info, warn};

/// Pauses every running leaf of a plan
///
/// The interrupt stays PROCESSING while the plan is paused and is closed by
/// the matching RESUME_ALL or by end-of-plan cleanup.
pub struct PauseAllInterruptHandler {
    services: InterruptServices,
}

impl PauseAllInterruptHandler {
    pub fn new(services: InterruptServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl InterruptHandler for PauseAllInterruptHandler {
    fn interrupt_type(&self) -> InterruptType {
        InterruptType::PauseAll
    }

    async fn register_interrupt(&self, package: InterruptPackage) -> Result<Interrupt> {
        if let Some(active) = self
            .services
            .interrupts
            .find_active(&package.plan_execution_id, Some(InterruptType::PauseAll))
            .await?
            .into_iter()
            .next()
        {
            info!(interrupt_id = %active.id, "Plan already pausing");
            return Ok(active);
        }

        let interrupt = self
            .services
            .interrupts
            .save(&Interrupt::processing(&package))
            .await?;

        let snapshot = TreeSnapshot::collect(
            self.services.nodes.stream_active(&interrupt.plan_execution_id),
        )
        .await?;

        let mut signalled = 0usize;
        for leaf in snapshot
            .running_leaves()
            .filter(|leaf| !matches!(leaf.status, Status::Pausing | Status::Paused))
        {
            let signal = NodeSignal::Pause {
                interrupt_id: interrupt.id.clone(),
            };
            match self.services.executor.signal(leaf, signal).await {
                Ok(()) => signalled += 1,
                Err(e) => warn!(
                    interrupt_id = %interrupt.id,
                    node_execution_id = %leaf.id,
                    error = %e,
                    "Failed to signal pause"
                ),
            }
        }

        info!(
            interrupt_id = %interrupt.id,
            plan_id = %interrupt.plan_execution_id,
            signalled,
            "Pause registered"
        );
        Ok(interrupt)
    }
}
