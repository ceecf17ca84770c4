use super::{finish_discontinuing, AbortHelper};
use crate::error::{InterruptError, Result};
use crate::executor::{CompletionPublisher, ExecutorClient, NodeSignal};
use crate::models::{Interrupt, InterruptConfig, NodeExecution, Status};
use crate::repositories::NodeExecutionService;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Abort helper backed by the executor client and node store
pub struct DefaultAbortHelper {
    nodes: Arc<dyn NodeExecutionService>,
    executor: Arc<dyn ExecutorClient>,
    publisher: Arc<dyn CompletionPublisher>,
}

impl DefaultAbortHelper {
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
impl AbortHelper for DefaultAbortHelper {
    async fn discontinue_marked_instance(
        &self,
        node: &NodeExecution,
        interrupt: &Interrupt,
    ) -> Result<()> {
        debug!(
            node_execution_id = %node.id,
            interrupt_id = %interrupt.id,
            "Signalling executor to discontinue"
        );

        let signal = NodeSignal::Discontinue {
            interrupt_id: interrupt.id.clone(),
            interrupt_type: interrupt.interrupt_type,
            ack_key: None,
        };
        self.executor
            .signal(node, signal)
            .await
            .map_err(|e| InterruptError::stop_signal(&node.id, e))
    }

    async fn abort_discontinuing_node(
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
            Status::Aborted,
        )
        .await
    }
}
