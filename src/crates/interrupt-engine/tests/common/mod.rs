//! Common test utilities and setup

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use interrupt_engine::db::Database;
use interrupt_engine::waitnotify::Resolution;
use interrupt_engine::{
    AbortHelper, BroadcastCompletionPublisher, CorrelationKey, ExecutionMode, ExecutorClient,
    ExpiryHelper, HandlerRegistry, InMemoryInterruptRepository, InMemoryLocker,
    InMemoryNodeExecutionService, InMemoryPlanExecutionService, InMemoryWaitNotifyEngine,
    Interrupt, InterruptConfig, InterruptEngineConfig, InterruptError, InterruptManager,
    InterruptPackage, InterruptRepository, InterruptServices, InterruptType, NodeExecution,
    NodeExecutionService, NodeSignal, NotifyCallback, PlanExecution, Result, Status,
    WaitNotifyEngine,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;

pub const PLAN: &str = "plan-1";

static TEST_DB_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Create a migrated test database with a unique name
pub async fn setup_test_db() -> (TempDir, Arc<Database>) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let counter = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    let db_path = temp_dir.path().join(format!("test_{}.db", counter));

    let db = Database::initialize(&db_path, 4)
        .await
        .expect("Failed to create test database");

    (temp_dir, Arc::new(db))
}

/// Config tuned for fast tests
pub fn test_config() -> InterruptEngineConfig {
    let mut config = InterruptEngineConfig::default();
    config.lock.wait_timeout_ms = 200;
    config.expiry.callback_timeout_secs = 60;
    config
}

/// Executor client recording every signal
#[derive(Default)]
pub struct RecordingExecutor {
    signals: Mutex<Vec<(String, NodeSignal)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingExecutor {
    pub fn signals(&self) -> Vec<(String, NodeSignal)> {
        self.signals.lock().clone()
    }

    pub fn signalled_nodes(&self) -> Vec<String> {
        self.signals.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn signals_for(&self, node_execution_id: &str) -> Vec<NodeSignal> {
        self.signals
            .lock()
            .iter()
            .filter(|(id, _)| id == node_execution_id)
            .map(|(_, signal)| signal.clone())
            .collect()
    }

    pub fn fail_for(&self, node_execution_id: &str) {
        self.failing.lock().insert(node_execution_id.to_string());
    }
}

#[async_trait]
impl ExecutorClient for RecordingExecutor {
    async fn signal(&self, node: &NodeExecution, signal: NodeSignal) -> Result<()> {
        if self.failing.lock().contains(&node.id) {
            return Err(InterruptError::Other(format!("executor for {} unreachable", node.id)));
        }
        self.signals.lock().push((node.id.clone(), signal));
        Ok(())
    }
}

/// Abort and expiry helper recording calls
///
/// Finishing calls move the node to its terminal status in `nodes`, unless
/// the node was configured to fail.
pub struct RecordingHelper {
    nodes: Arc<InMemoryNodeExecutionService>,
    discontinued: Mutex<Vec<String>>,
    aborted: Mutex<Vec<String>>,
    expired: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingHelper {
    pub fn new(nodes: Arc<InMemoryNodeExecutionService>) -> Self {
        Self {
            nodes,
            discontinued: Mutex::new(Vec::new()),
            aborted: Mutex::new(Vec::new()),
            expired: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn discontinued(&self) -> Vec<String> {
        self.discontinued.lock().clone()
    }

    pub fn aborted(&self) -> Vec<String> {
        self.aborted.lock().clone()
    }

    pub fn expired(&self) -> Vec<String> {
        self.expired.lock().clone()
    }

    /// Total calls of any kind
    pub fn calls(&self) -> usize {
        self.discontinued.lock().len() + self.aborted.lock().len() + self.expired.lock().len()
    }

    pub fn fail_for(&self, node_execution_id: &str) {
        self.failing.lock().insert(node_execution_id.to_string());
    }

    async fn finish(&self, node: &NodeExecution, status: Status) -> Result<()> {
        if self.failing.lock().contains(&node.id) {
            return Err(InterruptError::node_abort(&node.id, "helper failure"));
        }
        self.nodes
            .update_status_if(&node.id, &[Status::Discontinuing], status, None)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AbortHelper for RecordingHelper {
    async fn discontinue_marked_instance(
        &self,
        node: &NodeExecution,
        _interrupt: &Interrupt,
    ) -> Result<()> {
        self.discontinued.lock().push(node.id.clone());
        Ok(())
    }

    async fn abort_discontinuing_node(
        &self,
        node: &NodeExecution,
        _interrupt_id: &str,
        _config: &InterruptConfig,
    ) -> Result<()> {
        self.aborted.lock().push(node.id.clone());
        self.finish(node, Status::Aborted).await
    }
}

#[async_trait]
impl ExpiryHelper for RecordingHelper {
    async fn discontinue_marked_instance(
        &self,
        node: &NodeExecution,
        _interrupt: &Interrupt,
    ) -> Result<()> {
        self.discontinued.lock().push(node.id.clone());
        Ok(())
    }

    async fn expire_discontinued_instance(
        &self,
        node: &NodeExecution,
        _interrupt_id: &str,
        _config: &InterruptConfig,
    ) -> Result<()> {
        self.expired.lock().push(node.id.clone());
        self.finish(node, Status::Expired).await
    }
}

/// Wait/notify engine recording every resolution it is asked for
#[derive(Default)]
pub struct RecordingWaitNotify {
    inner: InMemoryWaitNotifyEngine,
    resolved: Mutex<Vec<(String, &'static str)>>,
}

impl RecordingWaitNotify {
    pub fn resolutions_for(&self, key: &CorrelationKey) -> Vec<&'static str> {
        self.resolved
            .lock()
            .iter()
            .filter(|(k, _)| k == key.as_str())
            .map(|(_, kind)| *kind)
            .collect()
    }

    pub fn engine(&self) -> &InMemoryWaitNotifyEngine {
        &self.inner
    }
}

#[async_trait]
impl WaitNotifyEngine for RecordingWaitNotify {
    async fn register(
        &self,
        key: &CorrelationKey,
        callback: Arc<dyn NotifyCallback>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.inner.register(key, callback, timeout).await
    }

    async fn done_with(&self, key: &CorrelationKey, payload: Value) -> Result<()> {
        self.resolved.lock().push((key.as_str().to_string(), "done"));
        self.inner.done_with(key, payload).await
    }

    async fn fail_with(&self, key: &CorrelationKey, payload: Value) -> Result<()> {
        self.resolved.lock().push((key.as_str().to_string(), "failed"));
        self.inner.fail_with(key, payload).await
    }

    fn wait_for(&self, key: &CorrelationKey) -> oneshot::Receiver<Resolution> {
        self.inner.wait_for(key)
    }
}

/// In-memory adapters plus recording fakes wired into services
pub struct Harness {
    pub plans: Arc<InMemoryPlanExecutionService>,
    pub nodes: Arc<InMemoryNodeExecutionService>,
    pub interrupts: Arc<InMemoryInterruptRepository>,
    pub executor: Arc<RecordingExecutor>,
    pub helper: Arc<RecordingHelper>,
    pub wait_notify: Arc<RecordingWaitNotify>,
    pub publisher: Arc<BroadcastCompletionPublisher>,
    pub locker: Arc<InMemoryLocker>,
    pub services: InterruptServices,
    epoch: DateTime<Utc>,
    sequence: AtomicI64,
}

impl Harness {
    /// Harness whose abort and expiry helpers are the recording fake
    pub fn new() -> Self {
        Self::with_config(test_config(), true)
    }

    /// Harness using the default helpers over the recording executor
    pub fn with_default_helpers() -> Self {
        Self::with_config(test_config(), false)
    }

    pub fn with_config(config: InterruptEngineConfig, recording_helpers: bool) -> Self {
        let plans = Arc::new(InMemoryPlanExecutionService::new());
        plans.insert(PlanExecution::new(PLAN, Status::Running));
        let nodes = Arc::new(InMemoryNodeExecutionService::new());
        let interrupts = Arc::new(InMemoryInterruptRepository::new());
        let executor = Arc::new(RecordingExecutor::default());
        let helper = Arc::new(RecordingHelper::new(nodes.clone()));
        let wait_notify = Arc::new(RecordingWaitNotify::default());
        let publisher = Arc::new(BroadcastCompletionPublisher::default());
        let locker = Arc::new(InMemoryLocker::new());

        let mut services = InterruptServices::new(
            plans.clone(),
            nodes.clone(),
            interrupts.clone(),
            executor.clone(),
            publisher.clone(),
            wait_notify.clone(),
            config,
        );
        if recording_helpers {
            services = services
                .with_abort_helper(helper.clone())
                .with_expiry_helper(helper.clone());
        }

        Self {
            plans,
            nodes,
            interrupts,
            executor,
            helper,
            wait_notify,
            publisher,
            locker,
            services,
            epoch: Utc::now() - chrono::Duration::hours(1),
            sequence: AtomicI64::new(0),
        }
    }

    /// Add a node to the plan; nodes stream in the order they were added
    pub fn add(&self, id: &str, parent: Option<&str>, mode: ExecutionMode, status: Status) {
        let mut node = NodeExecution::new(id, PLAN, parent, mode, status);
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        node.created_at = self.epoch + chrono::Duration::milliseconds(sequence);
        self.nodes.insert(node);
    }

    pub fn status(&self, id: &str) -> Status {
        self.nodes.snapshot(id).expect("node exists").status
    }

    /// Manager with the standard handlers
    pub fn manager(&self) -> InterruptManager {
        InterruptManager::new(
            self.locker.clone(),
            Arc::new(HandlerRegistry::standard(&self.services)),
            self.plans.clone(),
            self.services.config.lock.wait_timeout(),
        )
    }

    /// Persist a PROCESSING interrupt directly, bypassing handlers
    pub async fn persist(&self, interrupt_type: InterruptType) -> Interrupt {
        let package = InterruptPackage::new(PLAN, interrupt_type);
        self.interrupts
            .save(&Interrupt::processing(&package))
            .await
            .expect("interrupt saved")
    }
}

/// pipeline -> stages -> stage -> step group -> step
pub fn build_pipeline_chain(harness: &Harness, step_status: Status) {
    harness.add("pipeline", None, ExecutionMode::Child, Status::Running);
    harness.add("stages", Some("pipeline"), ExecutionMode::ChildChain, Status::Running);
    harness.add("stage", Some("stages"), ExecutionMode::Child, Status::Running);
    harness.add("execution", Some("stage"), ExecutionMode::ChildChain, Status::Running);
    harness.add("step", Some("execution"), ExecutionMode::Task, step_status);
}
