use super::{load_target_node, InterruptHandler};
use crate::error::{InterruptError, Result};
use crate::executor::NodeSignal;
use crate::models::{Interrupt, InterruptPackage, InterruptType};
use crate::services::InterruptServices;
use async_trait::async_trait;
use tracing::info;

/// Retries a single failed or waiting node
pub struct RetryInterruptHandler {
    services: InterruptServices,
}

impl RetryInterruptHandler {
    pub fn new(services: InterruptServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl InterruptHandler for RetryInterruptHandler {
    fn interrupt_type(&self) -> InterruptType {
        InterruptType::Retry
    }

    async fn register_interrupt(&self, package: InterruptPackage) -> Result<Interrupt> {
        let node = load_target_node(&self.services, &package).await?;
        if !node.status.is_retryable() || node.old_retry {
            return Err(InterruptError::invalid_transition(
                format!("node {}", node.id),
                node.status,
                InterruptType::Retry,
            ));
        }

        let interrupt = self
            .services
            .interrupts
            .save(&Interrupt::processing(&package))
            .await?;

        let signal = NodeSignal::Retry {
            interrupt_id: interrupt.id.clone(),
        };
        if let Err(e) = self.services.executor.signal(&node, signal).await {
            self.services
                .interrupts
                .mark_processed_unsuccessfully(&interrupt.id, false)
                .await?;
            return Err(InterruptError::stop_signal(&node.id, e));
        }

        info!(
            interrupt_id = %interrupt.id,
            node_execution_id = %node.id,
            status = %node.status,
            "Retry requested"
        );

        self.services
            .interrupts
            .mark_processed_successfully(&interrupt.id)
            .await
    }
}
