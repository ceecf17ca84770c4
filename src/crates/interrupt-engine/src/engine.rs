//! Wiring of the manager, end-of-plan worker and sweeper

use crate::handlers::HandlerRegistry;
use crate::lock::Locker;
use crate::manager::InterruptManager;
use crate::monitor::InterruptMonitor;
use crate::orchestration_end::OrchestrationEndInterruptHandler;
use crate::services::InterruptServices;
use crate::sweeper::InterruptSweeper;
use std::sync::Arc;

/// A fully wired interrupt subsystem
pub struct InterruptEngine {
    services: InterruptServices,
    manager: InterruptManager,
    end_handler: OrchestrationEndInterruptHandler,
    sweeper: InterruptSweeper,
}

impl InterruptEngine {
    /// Build with the standard handlers; spawns the end-of-plan worker
    pub fn new(services: InterruptServices, locker: Arc<dyn Locker>) -> Self {
        let registry = Arc::new(HandlerRegistry::standard(&services));
        Self::with_registry(services, locker, registry)
    }

    /// Build with a custom handler registry
    pub fn with_registry(
        services: InterruptServices,
        locker: Arc<dyn Locker>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        let config = &services.config;
        let manager = InterruptManager::new(
            locker.clone(),
            registry,
            services.plans.clone(),
            config.lock.wait_timeout(),
        );
        let end_handler =
            OrchestrationEndInterruptHandler::spawn(services.interrupts.clone(), locker, config);
        let sweeper = InterruptSweeper::new(
            services.interrupts.clone(),
            services.monitor.clone(),
            config.sweeper.interval(),
        );

        Self {
            services,
            manager,
            end_handler,
            sweeper,
        }
    }

    pub fn manager(&self) -> &InterruptManager {
        &self.manager
    }

    pub fn end_handler(&self) -> &OrchestrationEndInterruptHandler {
        &self.end_handler
    }

    pub fn sweeper(&self) -> &InterruptSweeper {
        &self.sweeper
    }

    pub fn monitor(&self) -> &Arc<InterruptMonitor> {
        &self.services.monitor
    }

    pub fn services(&self) -> &InterruptServices {
        &self.services
    }

    /// Drain the end-of-plan queue and stop its worker
    pub async fn shutdown(&self) {
        self.end_handler.shutdown().await;
    }
}
