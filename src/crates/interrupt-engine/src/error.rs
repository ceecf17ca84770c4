//! Error types for the interrupt engine
//!
//! A single error enum covers registration, monitor passes and the storage
//! adapters. Callers use [`InterruptError::is_transient`] to decide whether a
//! whole `register` call is worth retrying.

use crate::models::{InterruptType, Status};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for interrupt engine operations
pub type Result<T> = std::result::Result<T, InterruptError>;

/// Main error type for interrupt engine operations
#[derive(Debug, Error)]
pub enum InterruptError {
    /// The per-plan registration lock could not be taken in time
    #[error("Failed to acquire lock {name} within {timeout:?}")]
    LockAcquisition { name: String, timeout: Duration },

    /// No handler is registered for the requested interrupt type
    #[error("Unsupported interrupt type: {0}")]
    UnsupportedInterruptType(String),

    /// The requested transition is not legal for the current state
    #[error("Invalid state transition for {entity}: {from} -> {to}")]
    InvalidStateTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// The asynchronous stop signal to a node's executor failed
    #[error("Failed to signal executor for node {node_id}: {reason}")]
    AsyncStopSignal { node_id: String, reason: String },

    /// Synchronously finishing an already discontinuing node failed
    #[error("Failed to finish discontinuing node {node_id}: {reason}")]
    NodeAbort { node_id: String, reason: String },

    /// Plan execution not found
    #[error("Plan execution not found: {0}")]
    PlanNotFound(String),

    /// Plan execution already reached a terminal status
    #[error("Plan execution {plan_id} already finished with status {status}")]
    PlanAlreadyFinished { plan_id: String, status: Status },

    /// Node execution not found
    #[error("Node execution not found: {0}")]
    NodeNotFound(String),

    /// Interrupt not found
    #[error("Interrupt not found: {0}")]
    InterruptNotFound(String),

    /// A node-scoped interrupt was registered without a usable target node
    #[error("Interrupt type {interrupt_type} requires a target node execution")]
    MissingTargetNode { interrupt_type: InterruptType },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl InterruptError {
    /// Create an InvalidStateTransition error
    pub fn invalid_transition(
        entity: impl Into<String>,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        InterruptError::InvalidStateTransition {
            entity: entity.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create a NodeAbort error
    pub fn node_abort(node_id: impl Into<String>, reason: impl ToString) -> Self {
        InterruptError::NodeAbort {
            node_id: node_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an AsyncStopSignal error
    pub fn stop_signal(node_id: impl Into<String>, reason: impl ToString) -> Self {
        InterruptError::AsyncStopSignal {
            node_id: node_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether retrying the whole operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            InterruptError::LockAcquisition { .. } | InterruptError::AsyncStopSignal { .. } => {
                true
            }
            InterruptError::Database(err) => matches!(
                err,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            InterruptError::PlanNotFound(_)
                | InterruptError::NodeNotFound(_)
                | InterruptError::InterruptNotFound(_)
        )
    }
}

impl From<String> for InterruptError {
    fn from(msg: String) -> Self {
        Self::Other(msg)
    }
}

impl From<&str> for InterruptError {
    fn from(msg: &str) -> Self {
        Self::Other(msg.to_string())
    }
}
