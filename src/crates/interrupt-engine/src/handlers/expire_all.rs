use super::{register_tree_wide, InterruptHandler};
use crate::error::Result;
use crate::models::{Interrupt, InterruptPackage, InterruptType};
use crate::services::InterruptServices;
use async_trait::async_trait;

/// Expires every active leaf of a plan; stuck nodes finish as EXPIRED
pub struct ExpireAllInterruptHandler {
    services: InterruptServices,
}

impl ExpireAllInterruptHandler {
    pub fn new(services: InterruptServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl InterruptHandler for ExpireAllInterruptHandler {
    fn interrupt_type(&self) -> InterruptType {
        InterruptType::ExpireAll
    }

    async fn register_interrupt(&self, package: InterruptPackage) -> Result<Interrupt> {
        register_tree_wide(&self.services, package).await
    }
}
