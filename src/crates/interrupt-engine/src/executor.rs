//! Seams towards the node executors and completion listeners
//!
//! The engine never stops work itself. It asks executors to stop, pause,
//! resume or retry a node through an [`ExecutorClient`] and announces nodes it
//! finished synchronously through a [`CompletionPublisher`].

use crate::error::Result;
use crate::models::{InterruptType, NodeExecution, Status};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Instruction sent to the executor running a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum NodeSignal {
    /// Stop the node; when `ack_key` is set, resolve it once stopped
    Discontinue {
        interrupt_id: String,
        interrupt_type: InterruptType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ack_key: Option<String>,
    },
    Pause {
        interrupt_id: String,
    },
    Resume {
        interrupt_id: String,
    },
    Retry {
        interrupt_id: String,
    },
}

impl NodeSignal {
    pub fn interrupt_id(&self) -> &str {
        match self {
            NodeSignal::Discontinue { interrupt_id, .. }
            | NodeSignal::Pause { interrupt_id }
            | NodeSignal::Resume { interrupt_id }
            | NodeSignal::Retry { interrupt_id } => interrupt_id,
        }
    }
}

/// Delivers signals to node executors
#[async_trait]
pub trait ExecutorClient: Send + Sync {
    async fn signal(&self, node: &NodeExecution, signal: NodeSignal) -> Result<()>;
}

/// A node brought to a terminal status by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCompletion {
    pub node_execution_id: String,
    pub plan_execution_id: String,
    pub status: Status,
    pub interrupt_id: String,
    pub completed_at: DateTime<Utc>,
}

impl NodeCompletion {
    pub fn new(node: &NodeExecution, interrupt_id: impl Into<String>) -> Self {
        Self {
            node_execution_id: node.id.clone(),
            plan_execution_id: node.plan_execution_id.clone(),
            status: node.status,
            interrupt_id: interrupt_id.into(),
            completed_at: Utc::now(),
        }
    }
}

/// Announces synchronously finished nodes so parents can advance
#[async_trait]
pub trait CompletionPublisher: Send + Sync {
    async fn publish(&self, completion: NodeCompletion) -> Result<()>;
}

/// Executor client that only logs; for deployments without a live executor
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExecutorClient;

#[async_trait]
impl ExecutorClient for LoggingExecutorClient {
    async fn signal(&self, node: &NodeExecution, signal: NodeSignal) -> Result<()> {
        info!(
            node_execution_id = %node.id,
            plan_execution_id = %node.plan_execution_id,
            signal = ?signal,
            "Executor signal"
        );
        Ok(())
    }
}

/// Fan-out of completions over a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastCompletionPublisher {
    sender: broadcast::Sender<NodeCompletion>,
}

impl BroadcastCompletionPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeCompletion> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastCompletionPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl CompletionPublisher for BroadcastCompletionPublisher {
    async fn publish(&self, completion: NodeCompletion) -> Result<()> {
        // No subscribers is not an error for the caller
        if self.sender.send(completion).is_err() {
            debug!("Completion published without subscribers");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutionMode;

    #[test]
    fn test_signal_serialization_is_tagged() {
        let signal = NodeSignal::Discontinue {
            interrupt_id: "i-1".to_string(),
            interrupt_type: InterruptType::MarkExpired,
            ack_key: Some("n-1/i-1/discontinue".to_string()),
        };
        let value = serde_json::to_value(&signal).unwrap();
        assert_eq!(value["signal"], "discontinue");
        assert_eq!(value["interrupt_type"], "MARK_EXPIRED");
        assert_eq!(signal.interrupt_id(), "i-1");
    }

    #[tokio::test]
    async fn test_broadcast_publisher_delivers() {
        let publisher = BroadcastCompletionPublisher::default();
        let mut rx = publisher.subscribe();
        let node = NodeExecution::new("n1", "p1", None, ExecutionMode::Sync, Status::Aborted);

        publisher.publish(NodeCompletion::new(&node, "i-1")).await.unwrap();
        let completion = rx.recv().await.unwrap();
        assert_eq!(completion.status, Status::Aborted);
        assert_eq!(completion.interrupt_id, "i-1");
    }
}
