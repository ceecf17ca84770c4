use super::InterruptHandler;
use crate::error::{InterruptError, Result};
use crate::executor::NodeSignal;
use crate::models::{Interrupt, InterruptPackage, InterruptType, Status};
use crate::services::InterruptServices;
use async_trait::async_trait;
use tracing::{info, warn};

/// Resumes a paused plan and closes its PAUSE_ALL
pub struct ResumeAllInterruptHandler {
    services: InterruptServices,
}

impl ResumeAllInterruptHandler {
    pub fn new(services: InterruptServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl InterruptHandler for ResumeAllInterruptHandler {
    fn interrupt_type(&self) -> InterruptType {
        InterruptType::ResumeAll
    }

    async fn register_interrupt(&self, package: InterruptPackage) -> Result<Interrupt> {
        let pauses = self
            .services
            .interrupts
            .find_active(&package.plan_execution_id, Some(InterruptType::PauseAll))
            .await?;
        if pauses.is_empty() {
            return Err(InterruptError::invalid_transition(
                format!("plan {}", package.plan_execution_id),
                "NOT_PAUSED",
                InterruptType::ResumeAll,
            ));
        }

        for pause in &pauses {
            self.services
                .interrupts
                .mark_processed_successfully(&pause.id)
                .await?;
        }

        let interrupt = self
            .services
            .interrupts
            .save(&Interrupt::processing(&package))
            .await?;

        let paused = self
            .services
            .nodes
            .find_by_plan_and_status(&interrupt.plan_execution_id, &[Status::Pausing, Status::Paused])
            .await?;

        for node in paused.iter().filter(|node| !node.old_retry) {
            let signal = NodeSignal::Resume {
                interrupt_id: interrupt.id.clone(),
            };
            if let Err(e) = self.services.executor.signal(node, signal).await {
                warn!(
                    interrupt_id = %interrupt.id,
                    node_execution_id = %node.id,
                    error = %e,
                    "Failed to signal resume"
                );
            }
        }

        info!(
            interrupt_id = %interrupt.id,
            plan_id = %interrupt.plan_execution_id,
            resumed = paused.len(),
            "Plan resumed"
        );

        self.services
            .interrupts
            .mark_processed_successfully(&interrupt.id)
            .await
    }
}
