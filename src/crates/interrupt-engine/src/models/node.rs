//! Node execution read model

use super::{InterruptType, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a node executes its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    /// Single child
    Child,
    /// Children one after another
    ChildChain,
    /// Parallel fork
    Children,
    /// Leaf delegating to an external task
    Task,
    /// Leaf executing inline
    Sync,
    /// Leaf waiting on an asynchronous callback
    Async,
}

impl ExecutionMode {
    pub fn is_fork(self) -> bool {
        matches!(self, ExecutionMode::Children)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Child => "CHILD",
            ExecutionMode::ChildChain => "CHILD_CHAIN",
            ExecutionMode::Children => "CHILDREN",
            ExecutionMode::Task => "TASK",
            ExecutionMode::Sync => "SYNC",
            ExecutionMode::Async => "ASYNC",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CHILD" => Ok(ExecutionMode::Child),
            "CHILD_CHAIN" => Ok(ExecutionMode::ChildChain),
            "CHILDREN" => Ok(ExecutionMode::Children),
            "TASK" => Ok(ExecutionMode::Task),
            "SYNC" => Ok(ExecutionMode::Sync),
            "ASYNC" => Ok(ExecutionMode::Async),
            other => Err(format!("Unknown execution mode: {}", other)),
        }
    }
}

/// Record of an interrupt-driven transition applied to a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptEffect {
    pub interrupt_id: String,
    pub interrupt_type: InterruptType,
    pub applied_at: DateTime<Utc>,
}

impl InterruptEffect {
    pub fn new(interrupt_id: impl Into<String>, interrupt_type: InterruptType) -> Self {
        Self {
            interrupt_id: interrupt_id.into(),
            interrupt_type,
            applied_at: Utc::now(),
        }
    }
}

/// One step, stage or fork instance within a plan execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecution {
    pub id: String,
    pub parent_id: Option<String>,
    pub plan_execution_id: String,
    pub status: Status,
    pub mode: ExecutionMode,
    /// Superseded by a later retry attempt
    #[serde(default)]
    pub old_retry: bool,
    #[serde(default)]
    pub interrupt_histories: Vec<InterruptEffect>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl NodeExecution {
    pub fn new(
        id: impl Into<String>,
        plan_execution_id: impl Into<String>,
        parent_id: Option<&str>,
        mode: ExecutionMode,
        status: Status,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            parent_id: parent_id.map(str::to_string),
            plan_execution_id: plan_execution_id.into(),
            status,
            mode,
            old_retry: false,
            interrupt_histories: Vec::new(),
            created_at: now,
            last_updated_at: now,
        }
    }

    /// When `interrupt_id` last moved this node, if ever
    pub fn applied_by(&self, interrupt_id: &str) -> Option<DateTime<Utc>> {
        self.interrupt_histories
            .iter()
            .rev()
            .find(|effect| effect.interrupt_id == interrupt_id)
            .map(|effect| effect.applied_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applied_by_returns_latest_effect() {
        let mut node = NodeExecution::new("n1", "p1", None, ExecutionMode::Sync, Status::Running);
        assert!(node.applied_by("i-1").is_none());

        let first = InterruptEffect::new("i-1", InterruptType::AbortAll);
        let mut second = InterruptEffect::new("i-1", InterruptType::AbortAll);
        second.applied_at = first.applied_at + chrono::Duration::seconds(5);
        node.interrupt_histories.push(first);
        node.interrupt_histories.push(InterruptEffect::new("i-2", InterruptType::PauseAll));
        node.interrupt_histories.push(second.clone());

        assert_eq!(node.applied_by("i-1"), Some(second.applied_at));
        assert!(node.applied_by("i-3").is_none());
    }

    #[test]
    fn test_mode_round_trip_through_str() {
        assert_eq!("children".parse::<ExecutionMode>().unwrap(), ExecutionMode::Children);
        assert!(ExecutionMode::Children.is_fork());
        assert!(!ExecutionMode::ChildChain.is_fork());
    }
}
