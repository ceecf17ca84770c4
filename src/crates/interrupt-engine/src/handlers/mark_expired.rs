use super::{ensure_not_terminal, load_target_node, InterruptHandler};
use crate::callback::ExpiryInterruptCallback;
use crate::error::{InterruptError, Result};
use crate::models::{Interrupt, InterruptEffect, InterruptPackage, InterruptType, Status};
use crate::services::InterruptServices;
use crate::waitnotify::CorrelationKey;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Expires a single node
///
/// The node is marked DISCONTINUING and its executor asked to stop. An
/// [`ExpiryInterruptCallback`] waits on the executor's acknowledgement and
/// finishes the expiry, or forces it once `expiry.callback_timeout` elapses.
pub struct MarkExpiredInterruptHandler {
    services: InterruptServices,
}

impl MarkExpiredInterruptHandler {
    pub fn new(services: InterruptServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl InterruptHandler for MarkExpiredInterruptHandler {
    fn interrupt_type(&self) -> InterruptType {
        InterruptType::MarkExpired
    }

    async fn register_interrupt(&self, package: InterruptPackage) -> Result<Interrupt> {
        let node = load_target_node(&self.services, &package).await?;
        ensure_not_terminal(&node, InterruptType::MarkExpired)?;

        let interrupt = self
            .services
            .interrupts
            .save(&Interrupt::processing(&package))
            .await?;

        let marked = if node.status == Status::Discontinuing {
            node
        } else {
            let effect = InterruptEffect::new(&interrupt.id, InterruptType::MarkExpired);
            match self
                .services
                .nodes
                .update_status_if(&node.id, &Status::RUNNING_LIKE, Status::Discontinuing, Some(effect))
                .await?
            {
                Some(marked) => marked,
                None => {
                    let current = self.services.nodes.get(&node.id).await?;
                    if current.status.is_terminal() {
                        info!(
                            interrupt_id = %interrupt.id,
                            node_execution_id = %current.id,
                            status = %current.status,
                            "Node finished before it could be expired"
                        );
                        return self
                            .services
                            .interrupts
                            .mark_processed_successfully(&interrupt.id)
                            .await;
                    }
                    if current.status != Status::Discontinuing {
                        self.services
                            .interrupts
                            .mark_processed_unsuccessfully(&interrupt.id, false)
                            .await?;
                        return Err(InterruptError::invalid_transition(
                            format!("node {}", current.id),
                            current.status,
                            Status::Discontinuing,
                        ));
                    }
                    current
                }
            }
        };

        let ack_key = CorrelationKey::discontinue_ack(&marked.id, &interrupt.id);
        let callback = Arc::new(ExpiryInterruptCallback::new(&marked.id, &interrupt.id, &self.services));
        self.services
            .wait_notify
            .register(&ack_key, callback, Some(self.services.config.expiry.callback_timeout()))
            .await?;

        info!(
            interrupt_id = %interrupt.id,
            node_execution_id = %marked.id,
            ack_key = %ack_key,
            "Expiry registered, waiting for executor"
        );

        if let Err(e) = self
            .services
            .expiry_helper
            .discontinue_marked_instance(&marked, &interrupt)
            .await
        {
            warn!(
                interrupt_id = %interrupt.id,
                node_execution_id = %marked.id,
                error = %e,
                "Stop signal failed, expiry completes at the callback deadline"
            );
        }

        self.services.interrupts.get(&interrupt.id).await
    }
}
