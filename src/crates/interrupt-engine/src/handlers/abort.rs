use super::{ensure_not_terminal, load_target_node, InterruptHandler};
use crate::error::Result;
use crate::models::{Interrupt, InterruptEffect, InterruptPackage, InterruptType, Status};
use crate::services::InterruptServices;
use async_trait::async_trait;
use tracing::{info, warn};

/// Aborts a single node
pub struct AbortInterruptHandler {
    services: InterruptServices,
}

impl AbortInterruptHandler {
    pub fn new(services: InterruptServices) -> Self {
        Self { services }
    }

    async fn fail(&self, interrupt: &Interrupt, forceful: bool) {
        if let Err(e) = self
            .services
            .interrupts
            .mark_processed_unsuccessfully(&interrupt.id, forceful)
            .await
        {
            warn!(interrupt_id = %interrupt.id, error = %e, "Failed to close interrupt");
        }
    }
}

#[async_trait]
impl InterruptHandler for AbortInterruptHandler {
    fn interrupt_type(&self) -> InterruptType {
        InterruptType::Abort
    }

    async fn register_interrupt(&self, package: InterruptPackage) -> Result<Interrupt> {
        let node = load_target_node(&self.services, &package).await?;
        ensure_not_terminal(&node, InterruptType::Abort)?;

        let interrupt = self
            .services
            .interrupts
            .save(&Interrupt::processing(&package))
            .await?;
        info!(
            interrupt_id = %interrupt.id,
            node_execution_id = %node.id,
            status = %node.status,
            "Abort registered"
        );

        if node.status == Status::Discontinuing {
            // Already told to stop; finish it here
            if let Err(e) = self
                .services
                .abort_helper
                .abort_discontinuing_node(&node, &interrupt.id, &interrupt.config)
                .await
            {
                self.fail(&interrupt, true).await;
                return Err(e);
            }
            return self
                .services
                .interrupts
                .mark_processed_successfully(&interrupt.id)
                .await;
        }

        let effect = InterruptEffect::new(&interrupt.id, InterruptType::Abort);
        let marked = self
            .services
            .nodes
            .update_status_if(&node.id, &Status::RUNNING_LIKE, Status::Discontinuing, Some(effect))
            .await?;

        match marked {
            Some(marked) => {
                if let Err(e) = self
                    .services
                    .abort_helper
                    .discontinue_marked_instance(&marked, &interrupt)
                    .await
                {
                    self.fail(&interrupt, false).await;
                    return Err(e);
                }
            }
            None => {
                info!(
                    interrupt_id = %interrupt.id,
                    node_execution_id = %node.id,
                    "Node left its running status concurrently, nothing to abort"
                );
            }
        }

        self.services
            .interrupts
            .mark_processed_successfully(&interrupt.id)
            .await
    }
}
