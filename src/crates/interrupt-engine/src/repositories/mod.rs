//! Storage contracts for plan executions, node executions and interrupts
//!
//! The execution engine owns node and plan records; this crate only reads them
//! and moves nodes with guarded, conditional updates. Two adapter families are
//! provided: in-memory (`memory`) and SQLite (`node_repository`,
//! `plan_repository`, `interrupt_repository`).

pub mod interrupt_repository;
pub mod memory;
pub mod node_repository;
pub mod plan_repository;

pub use interrupt_repository::SqliteInterruptRepository;
pub use memory::{InMemoryInterruptRepository, InMemoryNodeExecutionService, InMemoryPlanExecutionService};
pub use node_repository::SqliteNodeExecutionService;
pub use plan_repository::SqlitePlanExecutionService;

use crate::error::{InterruptError, Result};
use crate::models::{
    Interrupt, InterruptEffect, InterruptState, InterruptType, NodeExecution, PlanExecution, Status,
};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Read and conditional-update access to node executions
///
/// Implementations must make `update_status_if` atomic: the status is only
/// written when the stored status is one of `expected`, otherwise nothing is
/// written and `None` is returned.
#[async_trait]
pub trait NodeExecutionService: Send + Sync {
    /// Fetch one node execution by id
    async fn get(&self, node_execution_id: &str) -> Result<NodeExecution>;

    /// Fetch nodes of a plan currently in one of `statuses`
    async fn find_by_plan_and_status(
        &self,
        plan_execution_id: &str,
        statuses: &[Status],
    ) -> Result<Vec<NodeExecution>>;

    /// Stream non-terminal, non-superseded nodes of a plan in creation order.
    /// Dropping the stream releases any underlying cursor.
    fn stream_active<'a>(
        &'a self,
        plan_execution_id: &'a str,
    ) -> BoxStream<'a, Result<NodeExecution>>;

    /// Move a node to `status` only if it is currently in `expected`,
    /// appending `effect` to its interrupt histories when given
    async fn update_status_if(
        &self,
        node_execution_id: &str,
        expected: &[Status],
        status: Status,
        effect: Option<InterruptEffect>,
    ) -> Result<Option<NodeExecution>>;
}

/// Read access to plan executions
#[async_trait]
pub trait PlanExecutionService: Send + Sync {
    async fn get(&self, plan_execution_id: &str) -> Result<PlanExecution>;
}

/// Persistence for interrupt records
#[async_trait]
pub trait InterruptRepository: Send + Sync {
    /// Insert a new interrupt
    async fn save(&self, interrupt: &Interrupt) -> Result<Interrupt>;

    /// Fetch one interrupt by id
    async fn get(&self, interrupt_id: &str) -> Result<Interrupt>;

    /// Active interrupts of a plan, oldest first, optionally of one type
    async fn find_active(
        &self,
        plan_execution_id: &str,
        interrupt_type: Option<InterruptType>,
    ) -> Result<Vec<Interrupt>>;

    /// Active interrupts of the given types across all plans, oldest first
    async fn list_active(&self, interrupt_types: &[InterruptType]) -> Result<Vec<Interrupt>>;

    /// Move an active interrupt to a terminal state. Terminal interrupts are
    /// immutable: marking one again returns the stored record unchanged.
    async fn mark_processed(
        &self,
        interrupt_id: &str,
        state: InterruptState,
        forceful: bool,
    ) -> Result<Interrupt>;

    /// Close every active interrupt of a plan, returning how many were closed
    async fn close_all_active(&self, plan_execution_id: &str) -> Result<u64>;

    async fn mark_processed_successfully(&self, interrupt_id: &str) -> Result<Interrupt> {
        self.mark_processed(interrupt_id, InterruptState::ProcessedSuccessfully, false)
            .await
    }

    async fn mark_processed_unsuccessfully(
        &self,
        interrupt_id: &str,
        forceful: bool,
    ) -> Result<Interrupt> {
        self.mark_processed(interrupt_id, InterruptState::ProcessedUnsuccessfully, forceful)
            .await
    }
}

/// Reject non-terminal target states for `mark_processed`
pub(crate) fn ensure_processed_state(interrupt_id: &str, state: InterruptState) -> Result<()> {
    if state.is_terminal() {
        Ok(())
    } else {
        Err(InterruptError::invalid_transition(
            format!("interrupt {}", interrupt_id),
            InterruptState::Processing,
            state,
        ))
    }
}

/// Timestamps are stored as fixed-width RFC 3339 text so they sort lexically
pub(crate) fn encode_timestamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(column: &str, value: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&chrono::Utc))
        .map_err(|e| InterruptError::Other(format!("Invalid timestamp in {}: {}", column, e)))
}

/// Comma separated `?` placeholders for an `IN (...)` clause
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
