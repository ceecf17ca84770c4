//! Registration through the manager and the built-in handlers

mod common;

use common::{Harness, PLAN};
use interrupt_engine::lock::plan_lock_name;
use interrupt_engine::{
    ExecutionMode, HandlerRegistry, InterruptError, InterruptManager, InterruptPackage,
    InterruptRepository, InterruptState, InterruptType, Locker, NodeSignal, Status,
};
use std::sync::Arc;
use std::time::Duration;

fn package(interrupt_type: InterruptType) -> InterruptPackage {
    InterruptPackage::new(PLAN, interrupt_type)
}

fn node_package(interrupt_type: InterruptType, node: &str) -> InterruptPackage {
    package(interrupt_type).with_target_node(node)
}

#[tokio::test]
async fn test_lock_timeout_persists_nothing() {
    let harness = Harness::new();
    harness.add("a", None, ExecutionMode::Sync, Status::Running);
    let _held = harness
        .locker
        .acquire(&plan_lock_name(PLAN), Duration::from_secs(1))
        .await
        .unwrap();

    let err = harness
        .manager()
        .register(package(InterruptType::AbortAll))
        .await
        .unwrap_err();

    assert!(matches!(err, InterruptError::LockAcquisition { .. }));
    assert!(err.is_transient());
    assert!(harness.interrupts.all_for_plan(PLAN).is_empty());
    assert_eq!(harness.status("a"), Status::Running);
}

#[tokio::test]
async fn test_lock_is_released_after_registration() {
    let harness = Harness::new();
    harness.add("a", None, ExecutionMode::Sync, Status::Running);

    harness
        .manager()
        .register(package(InterruptType::AbortAll))
        .await
        .unwrap();
    assert!(!harness.locker.is_locked(&plan_lock_name(PLAN)));

    // Failures release it too
    let manager = harness.manager();
    assert!(manager.register(package(InterruptType::ResumeAll)).await.is_err());
    assert!(!harness.locker.is_locked(&plan_lock_name(PLAN)));
}

#[tokio::test]
async fn test_unsupported_type_is_rejected() {
    let harness = Harness::new();
    let manager = InterruptManager::new(
        harness.locker.clone(),
        Arc::new(HandlerRegistry::empty()),
        harness.plans.clone(),
        Duration::from_millis(200),
    );
    assert!(manager.registry().supported_types().is_empty());

    let err = manager
        .register(package(InterruptType::AbortAll))
        .await
        .unwrap_err();
    assert!(matches!(err, InterruptError::UnsupportedInterruptType(_)));
    assert!(harness.interrupts.all_for_plan(PLAN).is_empty());
}

#[tokio::test]
async fn test_standard_registry_supports_every_type() {
    let harness = Harness::new();
    let manager = harness.manager();
    assert_eq!(manager.registry().supported_types(), InterruptType::ALL.to_vec());
}

#[tokio::test]
async fn test_finished_plan_rejects_registration() {
    let harness = Harness::new();
    harness.plans.set_status(PLAN, Status::Aborted).unwrap();

    let err = harness
        .manager()
        .register(package(InterruptType::AbortAll))
        .await
        .unwrap_err();
    assert!(matches!(err, InterruptError::PlanAlreadyFinished { status: Status::Aborted, .. }));
    assert!(harness.interrupts.all_for_plan(PLAN).is_empty());
}

#[tokio::test]
async fn test_unknown_plan_is_not_found() {
    let harness = Harness::new();
    let err = harness
        .manager()
        .register(InterruptPackage::new("nope", InterruptType::AbortAll))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_abort_all_registration_runs_first_pass() {
    let harness = Harness::new();
    harness.add("a", None, ExecutionMode::Sync, Status::Running);

    let interrupt = harness
        .manager()
        .register(package(InterruptType::AbortAll))
        .await
        .unwrap();

    assert_eq!(interrupt.state, InterruptState::Processing);
    assert_eq!(harness.status("a"), Status::Discontinuing);
    assert_eq!(harness.helper.discontinued(), vec!["a".to_string()]);
}

#[tokio::test]
async fn test_abort_all_is_reentrant() {
    let harness = Harness::new();
    harness.add("a", None, ExecutionMode::Sync, Status::Running);
    let manager = harness.manager();

    let first = manager.register(package(InterruptType::AbortAll)).await.unwrap();
    let second = manager.register(package(InterruptType::AbortAll)).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(harness.interrupts.all_for_plan(PLAN).len(), 1);
    assert_eq!(harness.helper.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_abort_all_creates_one_interrupt() {
    let harness = Harness::new();
    harness.add("a", None, ExecutionMode::Sync, Status::Running);
    harness.add("b", None, ExecutionMode::Sync, Status::Running);
    let manager = Arc::new(harness.manager());

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.register(package(InterruptType::AbortAll)).await })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().unwrap().id);
    }
    ids.dedup();

    assert_eq!(ids.len(), 1);
    assert_eq!(harness.interrupts.all_for_plan(PLAN).len(), 1);
    assert_eq!(harness.helper.discontinued().len(), 2);
}

#[tokio::test]
async fn test_pause_all_twice_returns_active_pause() {
    let harness = Harness::new();
    harness.add("fork", None, ExecutionMode::Children, Status::Running);
    harness.add("a", Some("fork"), ExecutionMode::Sync, Status::Running);
    harness.add("b", Some("fork"), ExecutionMode::Sync, Status::Paused);
    let manager = harness.manager();

    let first = manager.register(package(InterruptType::PauseAll)).await.unwrap();
    let second = manager.register(package(InterruptType::PauseAll)).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.state, InterruptState::Processing);
    assert_eq!(harness.executor.signalled_nodes(), vec!["a".to_string()]);
    assert_eq!(
        harness.executor.signals_for("a"),
        vec![NodeSignal::Pause {
            interrupt_id: first.id.clone()
        }]
    );
}

#[tokio::test]
async fn test_resume_without_pause_is_invalid() {
    let harness = Harness::new();
    let err = harness
        .manager()
        .register(package(InterruptType::ResumeAll))
        .await
        .unwrap_err();

    assert!(matches!(err, InterruptError::InvalidStateTransition { .. }));
    assert!(harness.interrupts.all_for_plan(PLAN).is_empty());
}

#[tokio::test]
async fn test_resume_closes_pause_and_signals_paused_nodes() {
    let harness = Harness::new();
    harness.add("a", None, ExecutionMode::Sync, Status::Running);
    let manager = harness.manager();
    let pause = manager.register(package(InterruptType::PauseAll)).await.unwrap();

    // Executor acknowledged the pause
    harness.nodes.set_status("a", Status::Paused).unwrap();

    let resume = manager.register(package(InterruptType::ResumeAll)).await.unwrap();
    assert_eq!(resume.state, InterruptState::ProcessedSuccessfully);

    let pause = harness.interrupts.get(&pause.id).await.unwrap();
    assert_eq!(pause.state, InterruptState::ProcessedSuccessfully);
    assert!(harness
        .executor
        .signals_for("a")
        .contains(&NodeSignal::Resume {
            interrupt_id: resume.id.clone()
        }));

    // Paused again after a resume is a fresh pause
    let again = manager.register(package(InterruptType::PauseAll)).await.unwrap();
    assert_ne!(again.id, pause.id);
}

#[tokio::test]
async fn test_retry_signals_failed_node() {
    let harness = Harness::new();
    harness.add("step", None, ExecutionMode::Task, Status::Failed);

    let interrupt = harness
        .manager()
        .register(node_package(InterruptType::Retry, "step"))
        .await
        .unwrap();

    assert_eq!(interrupt.state, InterruptState::ProcessedSuccessfully);
    assert_eq!(
        harness.executor.signals_for("step"),
        vec![NodeSignal::Retry {
            interrupt_id: interrupt.id.clone()
        }]
    );
}

#[tokio::test]
async fn test_retry_of_running_node_is_invalid() {
    let harness = Harness::new();
    harness.add("step", None, ExecutionMode::Task, Status::Running);

    let err = harness
        .manager()
        .register(node_package(InterruptType::Retry, "step"))
        .await
        .unwrap_err();

    assert!(matches!(err, InterruptError::InvalidStateTransition { .. }));
    assert!(harness.executor.signals().is_empty());
}

#[tokio::test]
async fn test_retry_signal_failure_closes_interrupt() {
    let harness = Harness::new();
    harness.add("step", None, ExecutionMode::Task, Status::Errored);
    harness.executor.fail_for("step");

    let err = harness
        .manager()
        .register(node_package(InterruptType::Retry, "step"))
        .await
        .unwrap_err();

    assert!(matches!(err, InterruptError::AsyncStopSignal { .. }));
    let stored = harness.interrupts.all_for_plan(PLAN);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].state, InterruptState::ProcessedUnsuccessfully);
    assert!(!stored[0].forceful);
}

#[tokio::test]
async fn test_abort_requires_target_node() {
    let harness = Harness::new();
    let err = harness
        .manager()
        .register(package(InterruptType::Abort))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        InterruptError::MissingTargetNode {
            interrupt_type: InterruptType::Abort
        }
    ));
}

#[tokio::test]
async fn test_abort_rejects_node_of_another_plan() {
    let harness = Harness::new();
    harness.nodes.insert(interrupt_engine::NodeExecution::new(
        "foreign",
        "plan-2",
        None,
        ExecutionMode::Sync,
        Status::Running,
    ));

    let err = harness
        .manager()
        .register(node_package(InterruptType::Abort, "foreign"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_abort_running_node_discontinues_it() {
    let harness = Harness::new();
    harness.add("step", None, ExecutionMode::Task, Status::Running);

    let interrupt = harness
        .manager()
        .register(node_package(InterruptType::Abort, "step"))
        .await
        .unwrap();

    assert_eq!(interrupt.state, InterruptState::ProcessedSuccessfully);
    assert_eq!(harness.status("step"), Status::Discontinuing);
    assert_eq!(harness.helper.discontinued(), vec!["step".to_string()]);
    assert!(harness.helper.aborted().is_empty());
}

#[tokio::test]
async fn test_abort_discontinuing_node_finishes_it() {
    let harness = Harness::new();
    harness.add("step", None, ExecutionMode::Task, Status::Discontinuing);

    let interrupt = harness
        .manager()
        .register(node_package(InterruptType::Abort, "step"))
        .await
        .unwrap();

    assert_eq!(interrupt.state, InterruptState::ProcessedSuccessfully);
    assert_eq!(harness.status("step"), Status::Aborted);
    assert_eq!(harness.helper.aborted(), vec!["step".to_string()]);
}

#[tokio::test]
async fn test_abort_finish_failure_is_forceful() {
    let harness = Harness::new();
    harness.add("step", None, ExecutionMode::Task, Status::Discontinuing);
    harness.helper.fail_for("step");

    let err = harness
        .manager()
        .register(node_package(InterruptType::Abort, "step"))
        .await
        .unwrap_err();

    assert!(matches!(err, InterruptError::NodeAbort { .. }));
    let stored = harness.interrupts.all_for_plan(PLAN);
    assert_eq!(stored[0].state, InterruptState::ProcessedUnsuccessfully);
    assert!(stored[0].forceful);
}

#[tokio::test]
async fn test_abort_signal_failure_is_not_forceful() {
    let harness = Harness::with_default_helpers();
    harness.add("step", None, ExecutionMode::Task, Status::Running);
    harness.executor.fail_for("step");

    let result = harness
        .manager()
        .register(node_package(InterruptType::Abort, "step"))
        .await;

    assert!(result.is_err());
    let stored = harness.interrupts.all_for_plan(PLAN);
    assert_eq!(stored[0].state, InterruptState::ProcessedUnsuccessfully);
    assert!(!stored[0].forceful);
    assert_eq!(harness.status("step"), Status::Discontinuing);
}

#[tokio::test]
async fn test_abort_of_finished_node_is_invalid() {
    let harness = Harness::new();
    harness.add("step", None, ExecutionMode::Task, Status::Succeeded);

    let err = harness
        .manager()
        .register(node_package(InterruptType::Abort, "step"))
        .await
        .unwrap_err();
    assert!(matches!(err, InterruptError::InvalidStateTransition { .. }));
    assert!(harness.interrupts.all_for_plan(PLAN).is_empty());
}
