use super::{finish_discontinuing, ExpiryHelper};
use crate::error::{InterruptError, Result};
use crate::executor::{CompletionPublisher, ExecutorClient, NodeSignal};
use crate::models::{Interrupt, InterruptConfig, NodeExecution, Status};
use crate::repositories::NodeExecutionService;
use crate::waitnotify::CorrelationKey;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Expiry helper backed by the executor client and node store
pub struct DefaultExpiryHelper {
    nodes: Arc<dyn NodeExecutionService>,
    executor: Arc<dyn ExecutorClient>,
    publisher: Arc<dyn CompletionPublisher>,
}

impl DefaultExpiryHelper {
    pub fn new(
        nodes: Arc<dyn NodeExecutionService>,
        executor: Arc<dyn ExecutorClient>,
        publisher: Arc<dyn CompletionPublisher>,
    ) -> Self {
        Self {
            nodes,
            executor,
            publisher,
        }
    }
}

#[async_trait]
impl ExpiryHelper for DefaultExpiryHelper {
    async fn discontinue_marked_instance(
        &self,
        node: &NodeExecution,
        interrupt: &Interrupt,
    ) -> Result<()> {
        let ack_key = CorrelationKey::discontinue_ack(&node.id, &interrupt.id);
        debug!(
            node_execution_id = %node.id,
            interrupt_id = %interrupt.id,
            ack_key = %ack_key,
            "Signalling executor to expire"
        );

        let signal = NodeSignal::Discontinue {
            interrupt_id: interrupt.id.clone(),
            interrupt_type: interrupt.interrupt_type,
            ack_key: Some(ack_key.as_str().to_string()),
        };
        self.executor
            .signal(node, signal)
            .await
            .map_err(|e| InterruptError::stop_signal(&node.id, e))
    }

    async fn expire_discontinued_instance(
        &self,
        node: &NodeExecution,
        interrupt_id: &str,
        _config: &InterruptConfig,
    ) -> Result<()> {
        finish_discontinuing(
            self.nodes.as_ref(),
            self.publisher.as_ref(),
            node,
            interrupt_id,
            Status::Expired,
        )
        .await
    }
}
