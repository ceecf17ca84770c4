//! In-memory storage adapters
//!
//! Backed by `DashMap`; per-key entry locking gives `update_status_if` and
//! `mark_processed` the same compare-and-set semantics as the SQLite adapters.

use super::{
    ensure_processed_state, InterruptRepository, NodeExecutionService, PlanExecutionService,
};
use crate::error::{InterruptError, Result};
use crate::models::{
    Interrupt, InterruptEffect, InterruptState, InterruptType, NodeExecution, PlanExecution, Status,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};

/// Node executions held in memory
#[derive(Debug, Default)]
pub struct InMemoryNodeExecutionService {
    nodes: DashMap<String, NodeExecution>,
}

impl InMemoryNodeExecutionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node
    pub fn insert(&self, node: NodeExecution) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Overwrite a node's status without any guard, as the executor would
    pub fn set_status(&self, node_execution_id: &str, status: Status) -> Result<()> {
        let mut node = self
            .nodes
            .get_mut(node_execution_id)
            .ok_or_else(|| InterruptError::NodeNotFound(node_execution_id.to_string()))?;
        node.status = status;
        node.last_updated_at = Utc::now();
        Ok(())
    }

    pub fn snapshot(&self, node_execution_id: &str) -> Option<NodeExecution> {
        self.nodes.get(node_execution_id).map(|n| n.clone())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn plan_nodes<F>(&self, plan_execution_id: &str, filter: F) -> Vec<NodeExecution>
    where
        F: Fn(&NodeExecution) -> bool,
    {
        let mut nodes: Vec<NodeExecution> = self
            .nodes
            .iter()
            .filter(|entry| entry.plan_execution_id == plan_execution_id && filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        nodes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        nodes
    }
}

#[async_trait]
impl NodeExecutionService for InMemoryNodeExecutionService {
    async fn get(&self, node_execution_id: &str) -> Result<NodeExecution> {
        self.snapshot(node_execution_id)
            .ok_or_else(|| InterruptError::NodeNotFound(node_execution_id.to_string()))
    }

    async fn find_by_plan_and_status(
        &self,
        plan_execution_id: &str,
        statuses: &[Status],
    ) -> Result<Vec<NodeExecution>> {
        Ok(self.plan_nodes(plan_execution_id, |node| statuses.contains(&node.status)))
    }

    fn stream_active<'a>(
        &'a self,
        plan_execution_id: &'a str,
    ) -> BoxStream<'a, Result<NodeExecution>> {
        let nodes = self.plan_nodes(plan_execution_id, |node| {
            !node.status.is_terminal() && !node.old_retry
        });
        stream::iter(nodes.into_iter().map(Ok)).boxed()
    }

    async fn update_status_if(
        &self,
        node_execution_id: &str,
        expected: &[Status],
        status: Status,
        effect: Option<InterruptEffect>,
    ) -> Result<Option<NodeExecution>> {
        let mut node = self
            .nodes
            .get_mut(node_execution_id)
            .ok_or_else(|| InterruptError::NodeNotFound(node_execution_id.to_string()))?;

        if !expected.contains(&node.status) {
            return Ok(None);
        }

        node.status = status;
        node.last_updated_at = Utc::now();
        if let Some(effect) = effect {
            node.interrupt_histories.push(effect);
        }
        Ok(Some(node.clone()))
    }
}

/// Plan executions held in memory
#[derive(Debug, Default)]
pub struct InMemoryPlanExecutionService {
    plans: DashMap<String, PlanExecution>,
}

impl InMemoryPlanExecutionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, plan: PlanExecution) {
        self.plans.insert(plan.id.clone(), plan);
    }

    pub fn set_status(&self, plan_execution_id: &str, status: Status) -> Result<()> {
        let mut plan = self
            .plans
            .get_mut(plan_execution_id)
            .ok_or_else(|| InterruptError::PlanNotFound(plan_execution_id.to_string()))?;
        plan.status = status;
        Ok(())
    }
}

#[async_trait]
impl PlanExecutionService for InMemoryPlanExecutionService {
    async fn get(&self, plan_execution_id: &str) -> Result<PlanExecution> {
        self.plans
            .get(plan_execution_id)
            .map(|plan| plan.clone())
            .ok_or_else(|| InterruptError::PlanNotFound(plan_execution_id.to_string()))
    }
}

/// Interrupt records held in memory
#[derive(Debug, Default)]
pub struct InMemoryInterruptRepository {
    interrupts: DashMap<String, Interrupt>,
}

impl InMemoryInterruptRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All interrupts of a plan regardless of state, oldest first
    pub fn all_for_plan(&self, plan_execution_id: &str) -> Vec<Interrupt> {
        self.collect(|i| i.plan_execution_id == plan_execution_id)
    }

    fn collect<F>(&self, filter: F) -> Vec<Interrupt>
    where
        F: Fn(&Interrupt) -> bool,
    {
        let mut interrupts: Vec<Interrupt> = self
            .interrupts
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        interrupts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        interrupts
    }
}

#[async_trait]
impl InterruptRepository for InMemoryInterruptRepository {
    async fn save(&self, interrupt: &Interrupt) -> Result<Interrupt> {
        if self.interrupts.contains_key(&interrupt.id) {
            return Err(InterruptError::Other(format!(
                "Interrupt already exists: {}",
                interrupt.id
            )));
        }
        self.interrupts.insert(interrupt.id.clone(), interrupt.clone());
        Ok(interrupt.clone())
    }

    async fn get(&self, interrupt_id: &str) -> Result<Interrupt> {
        self.interrupts
            .get(interrupt_id)
            .map(|i| i.clone())
            .ok_or_else(|| InterruptError::InterruptNotFound(interrupt_id.to_string()))
    }

    async fn find_active(
        &self,
        plan_execution_id: &str,
        interrupt_type: Option<InterruptType>,
    ) -> Result<Vec<Interrupt>> {
        Ok(self.collect(|i| {
            i.plan_execution_id == plan_execution_id
                && i.is_active()
                && interrupt_type.map_or(true, |ty| i.interrupt_type == ty)
        }))
    }

    async fn list_active(&self, interrupt_types: &[InterruptType]) -> Result<Vec<Interrupt>> {
        Ok(self.collect(|i| i.is_active() && interrupt_types.contains(&i.interrupt_type)))
    }

    async fn mark_processed(
        &self,
        interrupt_id: &str,
        state: InterruptState,
        forceful: bool,
    ) -> Result<Interrupt> {
        ensure_processed_state(interrupt_id, state)?;

        let mut interrupt = self
            .interrupts
            .get_mut(interrupt_id)
            .ok_or_else(|| InterruptError::InterruptNotFound(interrupt_id.to_string()))?;

        if interrupt.is_active() {
            interrupt.state = state;
            interrupt.forceful = forceful;
            interrupt.last_updated_at = Utc::now();
        }
        Ok(interrupt.clone())
    }

    async fn close_all_active(&self, plan_execution_id: &str) -> Result<u64> {
        let mut closed = 0;
        for mut entry in self.interrupts.iter_mut() {
            if entry.plan_execution_id == plan_execution_id && entry.is_active() {
                entry.state = InterruptState::ProcessedSuccessfully;
                entry.last_updated_at = Utc::now();
                closed += 1;
            }
        }
        Ok(closed)
    }
}
