//! Stop helpers used by handlers and the monitor
//!
//! Two operations per flavour: ask an executor to stop a node already marked
//! `Discontinuing` (asynchronous), or finish such a node to its terminal status
//! right away (synchronous). A finish that finds the node already terminal
//! counts as converged, not as a failure.

mod abort;
mod expiry;

pub use abort::DefaultAbortHelper;
pub use expiry::DefaultExpiryHelper;

use crate::error::{InterruptError, Result};
use crate::executor::{CompletionPublisher, NodeCompletion};
use crate::models::{Interrupt, InterruptConfig, NodeExecution, Status};
use crate::repositories::NodeExecutionService;
use async_trait::async_trait;
use tracing::{debug, info};

#[async_trait]
pub trait AbortHelper: Send + Sync {
    /// Ask the executor to stop `node`, already marked `Discontinuing`
    async fn discontinue_marked_instance(
        &self,
        node: &NodeExecution,
        interrupt: &Interrupt,
    ) -> Result<()>;

    /// Finish a `Discontinuing` node as `Aborted` without the executor
    async fn abort_discontinuing_node(
        &self,
        node: &NodeExecution,
        interrupt_id: &str,
        config: &InterruptConfig,
    ) -> Result<()>;
}

#[async_trait]
pub trait ExpiryHelper: Send + Sync {
    /// Ask the executor to stop `node` and acknowledge on its discontinue key
    async fn discontinue_marked_instance(
        &self,
        node: &NodeExecution,
        interrupt: &Interrupt,
    ) -> Result<()>;

    /// Finish a `Discontinuing` node as `Expired` without the executor
    async fn expire_discontinued_instance(
        &self,
        node: &NodeExecution,
        interrupt_id: &str,
        config: &InterruptConfig,
    ) -> Result<()>;
}

/// Move `node` from `Discontinuing` to `terminal` and publish its completion
pub(crate) async fn finish_discontinuing(
    nodes: &dyn NodeExecutionService,
    publisher: &dyn CompletionPublisher,
    node: &NodeExecution,
    interrupt_id: &str,
    terminal: Status,
) -> Result<()> {
    let updated = nodes
        .update_status_if(&node.id, &[Status::Discontinuing], terminal, None)
        .await
        .map_err(|e| InterruptError::node_abort(&node.id, e))?;

    match updated {
        Some(finished) => {
            info!(
                node_execution_id = %finished.id,
                interrupt_id = %interrupt_id,
                status = %terminal,
                "Finished discontinuing node"
            );
            publisher
                .publish(NodeCompletion::new(&finished, interrupt_id))
                .await
                .map_err(|e| InterruptError::node_abort(&finished.id, e))
        }
        None => {
            let current = nodes
                .get(&node.id)
                .await
                .map_err(|e| InterruptError::node_abort(&node.id, e))?;

            if current.status.is_terminal() {
                debug!(
                    node_execution_id = %current.id,
                    status = %current.status,
                    "Node already terminal, nothing to finish"
                );
                Ok(())
            } else {
                Err(InterruptError::node_abort(
                    &current.id,
                    format!("expected DISCONTINUING, found {}", current.status),
                ))
            }
        }
    }
}
