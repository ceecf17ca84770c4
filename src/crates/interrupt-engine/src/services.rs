//! Shared collaborators handed to handlers, callbacks and the monitor

use crate::config::InterruptEngineConfig;
use crate::executor::{CompletionPublisher, ExecutorClient};
use crate::helpers::{AbortHelper, DefaultAbortHelper, DefaultExpiryHelper, ExpiryHelper};
use crate::monitor::InterruptMonitor;
use crate::repositories::{InterruptRepository, NodeExecutionService, PlanExecutionService};
use crate::waitnotify::WaitNotifyEngine;
use std::sync::Arc;

/// Everything an interrupt handler may touch
#[derive(Clone)]
pub struct InterruptServices {
    pub plans: Arc<dyn PlanExecutionService>,
    pub nodes: Arc<dyn NodeExecutionService>,
    pub interrupts: Arc<dyn InterruptRepository>,
    pub executor: Arc<dyn ExecutorClient>,
    pub publisher: Arc<dyn CompletionPublisher>,
    pub wait_notify: Arc<dyn WaitNotifyEngine>,
    pub abort_helper: Arc<dyn AbortHelper>,
    pub expiry_helper: Arc<dyn ExpiryHelper>,
    pub monitor: Arc<InterruptMonitor>,
    pub config: InterruptEngineConfig,
}

impl InterruptServices {
    /// Wire the default helpers and monitor around the given adapters
    pub fn new(
        plans: Arc<dyn PlanExecutionService>,
        nodes: Arc<dyn NodeExecutionService>,
        interrupts: Arc<dyn InterruptRepository>,
        executor: Arc<dyn ExecutorClient>,
        publisher: Arc<dyn CompletionPublisher>,
        wait_notify: Arc<dyn WaitNotifyEngine>,
        config: InterruptEngineConfig,
    ) -> Self {
        let abort_helper: Arc<dyn AbortHelper> = Arc::new(DefaultAbortHelper::new(
            nodes.clone(),
            executor.clone(),
            publisher.clone(),
        ));
        let expiry_helper: Arc<dyn ExpiryHelper> = Arc::new(DefaultExpiryHelper::new(
            nodes.clone(),
            executor.clone(),
            publisher.clone(),
        ));
        let monitor = Self::build_monitor(
            &plans,
            &nodes,
            &interrupts,
            &abort_helper,
            &expiry_helper,
            &config,
        );

        Self {
            plans,
            nodes,
            interrupts,
            executor,
            publisher,
            wait_notify,
            abort_helper,
            expiry_helper,
            monitor,
            config,
        }
    }

    /// Replace the abort helper, rebuilding the monitor around it
    pub fn with_abort_helper(mut self, abort_helper: Arc<dyn AbortHelper>) -> Self {
        self.abort_helper = abort_helper;
        self.rebuild_monitor();
        self
    }

    /// Replace the expiry helper, rebuilding the monitor around it
    pub fn with_expiry_helper(mut self, expiry_helper: Arc<dyn ExpiryHelper>) -> Self {
        self.expiry_helper = expiry_helper;
        self.rebuild_monitor();
        self
    }

    fn rebuild_monitor(&mut self) {
        self.monitor = Self::build_monitor(
            &self.plans,
            &self.nodes,
            &self.interrupts,
            &self.abort_helper,
            &self.expiry_helper,
            &self.config,
        );
    }

    fn build_monitor(
        plans: &Arc<dyn PlanExecutionService>,
        nodes: &Arc<dyn NodeExecutionService>,
        interrupts: &Arc<dyn InterruptRepository>,
        abort_helper: &Arc<dyn AbortHelper>,
        expiry_helper: &Arc<dyn ExpiryHelper>,
        config: &InterruptEngineConfig,
    ) -> Arc<InterruptMonitor> {
        Arc::new(InterruptMonitor::new(
            plans.clone(),
            nodes.clone(),
            interrupts.clone(),
            abort_helper.clone(),
            expiry_helper.clone(),
            config.monitor.clone(),
        ))
    }
}
