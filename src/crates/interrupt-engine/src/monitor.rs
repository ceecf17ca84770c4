//! Convergent sweep of a plan's execution tree
//!
//! One pass takes a point-in-time snapshot of the plan's live nodes, classifies
//! each node by its direct children and issues at most one stop action per
//! node. Passes are safe to repeat: a node this interrupt already marked is
//! left alone while its stop is in flight, so re-running converges without
//! firing a helper twice on the same node.

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::helpers::{AbortHelper, ExpiryHelper};
use crate::models::{Interrupt, InterruptEffect, InterruptType, NodeExecution, Status};
use crate::repositories::{InterruptRepository, NodeExecutionService, PlanExecutionService};
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Role of a node within one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    /// Has at least one live child; converges once its children do
    WaitingParent,
    /// Running-like with no live children; gets escalated
    ActiveLeaf,
    /// Marked by this interrupt within the grace window; stop pending
    InFlight,
    /// Discontinuing with nothing left below it; finished synchronously
    Stuck,
}

/// Point-in-time view of a plan's live nodes
#[derive(Debug, Default)]
pub struct TreeSnapshot {
    nodes: HashMap<String, NodeExecution>,
    order: Vec<String>,
    children: HashMap<String, Vec<String>>,
}

impl TreeSnapshot {
    /// Drain `stream` completely into a snapshot
    ///
    /// The stream is consumed and dropped before this returns, so callers may
    /// write to the store afterwards.
    pub async fn collect(stream: BoxStream<'_, Result<NodeExecution>>) -> Result<Self> {
        let nodes: Vec<NodeExecution> = stream.try_collect().await?;
        Ok(Self::from_nodes(nodes))
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = NodeExecution>) -> Self {
        let mut snapshot = Self::default();
        for node in nodes {
            if node.status.is_terminal() || node.old_retry {
                continue;
            }
            snapshot.order.push(node.id.clone());
            snapshot.nodes.insert(node.id.clone(), node);
        }
        for id in &snapshot.order {
            if let Some(parent_id) = snapshot.nodes[id].parent_id.as_ref() {
                snapshot
                    .children
                    .entry(parent_id.clone())
                    .or_default()
                    .push(id.clone());
            }
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, node_execution_id: &str) -> Option<&NodeExecution> {
        self.nodes.get(node_execution_id)
    }

    /// Nodes in stream order
    pub fn iter(&self) -> impl Iterator<Item = &NodeExecution> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Live direct children of a node
    pub fn active_children(&self, node_execution_id: &str) -> &[String] {
        self.children
            .get(node_execution_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Leaves in a running-like status, the targets of pause signals
    pub fn running_leaves(&self) -> impl Iterator<Item = &NodeExecution> {
        self.iter()
            .filter(|node| self.active_children(&node.id).is_empty() && node.status.is_running_like())
    }

    /// Classify one node for `interrupt_id`
    pub fn classify(
        &self,
        node: &NodeExecution,
        interrupt_id: &str,
        grace: Duration,
        now: DateTime<Utc>,
    ) -> NodeClass {
        if !self.active_children(&node.id).is_empty() {
            return NodeClass::WaitingParent;
        }
        if node.status != Status::Discontinuing {
            return NodeClass::ActiveLeaf;
        }

        let within_grace = node.applied_by(interrupt_id).map(|applied_at| {
            // A mark stamped after `now` (clock skew) is still in flight
            now.signed_duration_since(applied_at)
                .to_std()
                .map_or(true, |elapsed| elapsed < grace)
        });
        match within_grace {
            Some(true) => NodeClass::InFlight,
            _ => NodeClass::Stuck,
        }
    }
}

/// How a pass ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The plan is already terminal; nothing to do
    PlanFinished,
    /// The interrupt is already terminal; nothing to do
    InterruptClosed,
    /// The interrupt type does not sweep the tree
    NotApplicable,
    /// All actions issued; later passes or completions finish the job
    Converging,
    /// A synchronous finish failed and the interrupt was closed forcefully
    ForcefullyFailed { node_execution_id: String, reason: String },
}

/// What one pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub interrupt_id: String,
    pub outcome: SweepOutcome,
    /// Leaves moved to `Discontinuing`
    pub escalated: Vec<String>,
    /// Stuck nodes finished synchronously
    pub finished: Vec<String>,
    pub waiting: Vec<String>,
    pub in_flight: Vec<String>,
    /// Leaves whose conditional update lost a race
    pub conflicts: Vec<String>,
    /// Escalated leaves whose stop signal failed
    pub signal_failures: Vec<String>,
    /// Leaves the store failed to update; retried on a later pass
    pub errors: Vec<String>,
}

impl SweepReport {
    fn new(interrupt_id: &str, outcome: SweepOutcome) -> Self {
        Self {
            interrupt_id: interrupt_id.to_string(),
            outcome,
            escalated: Vec::new(),
            finished: Vec::new(),
            waiting: Vec::new(),
            in_flight: Vec::new(),
            conflicts: Vec::new(),
            signal_failures: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Whether the pass changed any node
    pub fn made_progress(&self) -> bool {
        !self.escalated.is_empty() || !self.finished.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FinishAction {
    Abort,
    Expire,
}

impl FinishAction {
    fn for_type(interrupt_type: InterruptType) -> Option<Self> {
        match interrupt_type {
            InterruptType::AbortAll => Some(FinishAction::Abort),
            InterruptType::ExpireAll => Some(FinishAction::Expire),
            InterruptType::Abort
            | InterruptType::MarkExpired
            | InterruptType::PauseAll
            | InterruptType::ResumeAll
            | InterruptType::Retry => None,
        }
    }
}

/// Drives tree-wide interrupts towards convergence
pub struct InterruptMonitor {
    plans: Arc<dyn PlanExecutionService>,
    nodes: Arc<dyn NodeExecutionService>,
    interrupts: Arc<dyn InterruptRepository>,
    abort_helper: Arc<dyn AbortHelper>,
    expiry_helper: Arc<dyn ExpiryHelper>,
    config: MonitorConfig,
}

impl InterruptMonitor {
    pub fn new(
        plans: Arc<dyn PlanExecutionService>,
        nodes: Arc<dyn NodeExecutionService>,
        interrupts: Arc<dyn InterruptRepository>,
        abort_helper: Arc<dyn AbortHelper>,
        expiry_helper: Arc<dyn ExpiryHelper>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            plans,
            nodes,
            interrupts,
            abort_helper,
            expiry_helper,
            config,
        }
    }

    /// Run one pass for `interrupt`
    pub async fn handle(&self, interrupt: &Interrupt) -> Result<SweepReport> {
        let Some(action) = FinishAction::for_type(interrupt.interrupt_type) else {
            debug!(
                interrupt_id = %interrupt.id,
                interrupt_type = %interrupt.interrupt_type,
                "Interrupt type does not sweep the tree"
            );
            return Ok(SweepReport::new(&interrupt.id, SweepOutcome::NotApplicable));
        };

        let plan = self.plans.get(&interrupt.plan_execution_id).await?;
        if plan.is_finished() {
            debug!(plan_id = %plan.id, status = %plan.status, "Plan already finished, skipping pass");
            return Ok(SweepReport::new(&interrupt.id, SweepOutcome::PlanFinished));
        }

        let current = self.interrupts.get(&interrupt.id).await?;
        if !current.is_active() {
            debug!(interrupt_id = %current.id, state = %current.state, "Interrupt closed, skipping pass");
            return Ok(SweepReport::new(&current.id, SweepOutcome::InterruptClosed));
        }

        let snapshot =
            TreeSnapshot::collect(self.nodes.stream_active(&current.plan_execution_id)).await?;
        let now = Utc::now();
        let grace = self.config.discontinue_grace();

        let mut report = SweepReport::new(&current.id, SweepOutcome::Converging);
        let mut leaves = Vec::new();
        let mut stuck = Vec::new();

        for node in snapshot.iter() {
            match snapshot.classify(node, &current.id, grace, now) {
                NodeClass::WaitingParent => report.waiting.push(node.id.clone()),
                NodeClass::InFlight => report.in_flight.push(node.id.clone()),
                NodeClass::ActiveLeaf => leaves.push(node),
                NodeClass::Stuck => stuck.push(node),
            }
        }

        debug!(
            interrupt_id = %current.id,
            plan_id = %current.plan_execution_id,
            nodes = snapshot.len(),
            leaves = leaves.len(),
            stuck = stuck.len(),
            "Classified execution tree"
        );

        for leaf in leaves {
            if let Err(e) = self.escalate(leaf, &current, &mut report).await {
                warn!(
                    interrupt_id = %current.id,
                    node_execution_id = %leaf.id,
                    error = %e,
                    "Failed to mark leaf as discontinuing, continuing with the rest"
                );
                report.errors.push(leaf.id.clone());
            }
        }

        for node in stuck {
            let result = match action {
                FinishAction::Abort => {
                    self.abort_helper
                        .abort_discontinuing_node(node, &current.id, &current.config)
                        .await
                }
                FinishAction::Expire => {
                    self.expiry_helper
                        .expire_discontinued_instance(node, &current.id, &current.config)
                        .await
                }
            };

            if let Err(e) = result {
                error!(
                    interrupt_id = %current.id,
                    node_execution_id = %node.id,
                    error = %e,
                    "Failed to finish discontinuing node, closing interrupt forcefully"
                );
                self.interrupts
                    .mark_processed_unsuccessfully(&current.id, true)
                    .await?;
                report.outcome = SweepOutcome::ForcefullyFailed {
                    node_execution_id: node.id.clone(),
                    reason: e.to_string(),
                };
                return Ok(report);
            }
            report.finished.push(node.id.clone());
        }

        if report.made_progress() {
            info!(
                interrupt_id = %current.id,
                escalated = report.escalated.len(),
                finished = report.finished.len(),
                "Monitor pass issued stop actions"
            );
        }
        Ok(report)
    }

    async fn escalate(
        &self,
        leaf: &NodeExecution,
        interrupt: &Interrupt,
        report: &mut SweepReport,
    ) -> Result<()> {
        let effect = InterruptEffect::new(&interrupt.id, interrupt.interrupt_type);
        let marked = self
            .nodes
            .update_status_if(&leaf.id, &Status::RUNNING_LIKE, Status::Discontinuing, Some(effect))
            .await?;

        let Some(marked) = marked else {
            debug!(
                node_execution_id = %leaf.id,
                status = %leaf.status,
                "Node changed status concurrently, skipping"
            );
            report.conflicts.push(leaf.id.clone());
            return Ok(());
        };

        report.escalated.push(marked.id.clone());
        if let Err(e) = self
            .abort_helper
            .discontinue_marked_instance(&marked, interrupt)
            .await
        {
            warn!(
                node_execution_id = %marked.id,
                interrupt_id = %interrupt.id,
                error = %e,
                "Stop signal failed, leaving node for a later pass"
            );
            report.signal_failures.push(marked.id.clone());
        }
        Ok(())
    }
}
