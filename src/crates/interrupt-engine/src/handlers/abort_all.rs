use super::{register_tree_wide, InterruptHandler};
use crate::error::Result;
use crate::models::{Interrupt, InterruptPackage, InterruptType};
use crate::services::InterruptServices;
use async_trait::async_trait;

/// Aborts every active leaf of a plan and drives the tree to ABORTED
pub struct AbortAllInterruptHandler {
    services: InterruptServices,
}

impl AbortAllInterruptHandler {
    pub fn new(services: InterruptServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl InterruptHandler for AbortAllInterruptHandler {
    fn interrupt_type(&self) -> InterruptType {
        InterruptType::AbortAll
    }

    async fn register_interrupt(&self, package: InterruptPackage) -> Result<Interrupt> {
        register_tree_wide(&self.services, package).await
    }
}
