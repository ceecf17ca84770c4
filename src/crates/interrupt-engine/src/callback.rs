//! Continuation completing a MARK_EXPIRED interrupt
//!
//! Registered on the node's discontinue acknowledgement key. Whichever entry
//! point fires first (acknowledgement, error or deadline) runs the expiry;
//! later calls are ignored. The outcome is announced once on the derived
//! completion key so callers waiting on the expiry can resume.

use crate::error::Result;
use crate::helpers::ExpiryHelper;
use crate::models::Status;
use crate::repositories::{InterruptRepository, NodeExecutionService};
use crate::services::InterruptServices;
use crate::waitnotify::{CorrelationKey, NotifyCallback, WaitNotifyEngine};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Which entry point triggered the expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryTrigger {
    Acknowledged,
    Errored,
    TimedOut,
}

impl fmt::Display for ExpiryTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExpiryTrigger::Acknowledged => "acknowledged",
            ExpiryTrigger::Errored => "errored",
            ExpiryTrigger::TimedOut => "timed_out",
        })
    }
}

pub struct ExpiryInterruptCallback {
    node_execution_id: String,
    interrupt_id: String,
    nodes: Arc<dyn NodeExecutionService>,
    interrupts: Arc<dyn InterruptRepository>,
    expiry_helper: Arc<dyn ExpiryHelper>,
    wait_notify: Arc<dyn WaitNotifyEngine>,
    fired: AtomicBool,
}

impl ExpiryInterruptCallback {
    pub fn new(node_execution_id: &str, interrupt_id: &str, services: &InterruptServices) -> Self {
        Self {
            node_execution_id: node_execution_id.to_string(),
            interrupt_id: interrupt_id.to_string(),
            nodes: services.nodes.clone(),
            interrupts: services.interrupts.clone(),
            expiry_helper: services.expiry_helper.clone(),
            wait_notify: services.wait_notify.clone(),
            fired: AtomicBool::new(false),
        }
    }

    /// Key signalled once the expiry finished
    pub fn completion_key(&self) -> CorrelationKey {
        CorrelationKey::completion(&self.node_execution_id, &self.interrupt_id)
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    async fn expire_node(&self, trigger: ExpiryTrigger, payload: Value) {
        if self.fired.swap(true, Ordering::AcqRel) {
            debug!(
                node_execution_id = %self.node_execution_id,
                interrupt_id = %self.interrupt_id,
                trigger = %trigger,
                "Expiry already handled, ignoring"
            );
            return;
        }

        debug!(
            node_execution_id = %self.node_execution_id,
            interrupt_id = %self.interrupt_id,
            trigger = %trigger,
            payload = %payload,
            "Completing expiry"
        );

        let key = self.completion_key();
        let signalled = match self.run_expiry().await {
            Ok(status) => {
                info!(
                    node_execution_id = %self.node_execution_id,
                    interrupt_id = %self.interrupt_id,
                    trigger = %trigger,
                    status = %status,
                    "Node expiry completed"
                );
                let payload = json!({
                    "node_execution_id": self.node_execution_id,
                    "interrupt_id": self.interrupt_id,
                    "trigger": trigger.to_string(),
                    "status": status,
                });
                self.wait_notify.done_with(&key, payload).await
            }
            Err(e) => {
                error!(
                    node_execution_id = %self.node_execution_id,
                    interrupt_id = %self.interrupt_id,
                    trigger = %trigger,
                    error = %e,
                    "Node expiry failed"
                );
                let payload = json!({
                    "node_execution_id": self.node_execution_id,
                    "interrupt_id": self.interrupt_id,
                    "trigger": trigger.to_string(),
                    "error": e.to_string(),
                });
                self.wait_notify.fail_with(&key, payload).await
            }
        };

        if let Err(e) = signalled {
            error!(key = %key, error = %e, "Failed to signal expiry completion");
        }
    }

    async fn run_expiry(&self) -> Result<Status> {
        let interrupt = self.interrupts.get(&self.interrupt_id).await?;
        let node = self.nodes.get(&self.node_execution_id).await?;

        match self
            .expiry_helper
            .expire_discontinued_instance(&node, &interrupt.id, &interrupt.config)
            .await
        {
            Ok(()) => {
                self.interrupts
                    .mark_processed_successfully(&interrupt.id)
                    .await?;
                let node = self.nodes.get(&self.node_execution_id).await?;
                Ok(node.status)
            }
            Err(e) => {
                self.interrupts
                    .mark_processed_unsuccessfully(&interrupt.id, true)
                    .await?;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl NotifyCallback for ExpiryInterruptCallback {
    async fn notify(&self, payload: Value) {
        self.expire_node(ExpiryTrigger::Acknowledged, payload).await
    }

    async fn notify_error(&self, payload: Value) {
        self.expire_node(ExpiryTrigger::Errored, payload).await
    }

    async fn notify_timeout(&self, payload: Value) {
        self.expire_node(ExpiryTrigger::TimedOut, payload).await
    }
}
