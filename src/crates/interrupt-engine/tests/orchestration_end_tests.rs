//! End-of-plan cleanup of interrupts left open

mod common;

use common::{test_config, Harness, PLAN};
use interrupt_engine::lock::plan_lock_name;
use interrupt_engine::{
    InterruptRepository, InterruptState, InterruptType, Locker, OrchestrationEndInterruptHandler,
};
use std::time::Duration;

fn end_handler(harness: &Harness) -> OrchestrationEndInterruptHandler {
    OrchestrationEndInterruptHandler::spawn(
        harness.interrupts.clone(),
        harness.locker.clone(),
        &harness.services.config,
    )
}

#[tokio::test]
async fn test_plan_end_closes_all_active_interrupts() {
    let harness = Harness::new();
    let abort_all = harness.persist(InterruptType::AbortAll).await;
    let pause_all = harness.persist(InterruptType::PauseAll).await;
    let done = harness.persist(InterruptType::Retry).await;
    harness
        .interrupts
        .mark_processed_unsuccessfully(&done.id, false)
        .await
        .unwrap();

    let handler = end_handler(&harness);
    handler.on_end(PLAN).unwrap();
    handler.shutdown().await;

    for id in [&abort_all.id, &pause_all.id] {
        let stored = harness.interrupts.get(id).await.unwrap();
        assert_eq!(stored.state, InterruptState::ProcessedSuccessfully);
        assert!(!stored.forceful);
    }

    // Already terminal interrupts keep their state
    let stored = harness.interrupts.get(&done.id).await.unwrap();
    assert_eq!(stored.state, InterruptState::ProcessedUnsuccessfully);
}

#[tokio::test]
async fn test_plan_end_without_active_interrupts_is_a_no_op() {
    let harness = Harness::new();
    let handler = end_handler(&harness);

    assert_eq!(handler.close_now(PLAN).await.unwrap(), 0);
    handler.on_end(PLAN).unwrap();
    handler.shutdown().await;

    assert!(harness.interrupts.all_for_plan(PLAN).is_empty());
}

#[tokio::test]
async fn test_plan_end_only_touches_its_plan() {
    let harness = Harness::new();
    let ours = harness.persist(InterruptType::AbortAll).await;
    let other = interrupt_engine::InterruptPackage::new("plan-2", InterruptType::AbortAll);
    let other = harness
        .interrupts
        .save(&interrupt_engine::Interrupt::processing(&other))
        .await
        .unwrap();

    let handler = end_handler(&harness);
    assert_eq!(handler.close_now(PLAN).await.unwrap(), 1);

    assert!(!harness.interrupts.get(&ours.id).await.unwrap().is_active());
    assert!(harness.interrupts.get(&other.id).await.unwrap().is_active());
    handler.shutdown().await;
}

#[tokio::test]
async fn test_on_end_after_shutdown_is_rejected() {
    let harness = Harness::new();
    let handler = end_handler(&harness);
    handler.shutdown().await;

    assert!(handler.on_end(PLAN).is_err());
    // Shutting down twice is harmless
    handler.shutdown().await;
}

#[tokio::test]
async fn test_cleanup_waits_for_registration_lock() {
    let harness = Harness::new();
    let interrupt = harness.persist(InterruptType::AbortAll).await;

    let held = harness
        .locker
        .acquire(&plan_lock_name(PLAN), Duration::from_secs(1))
        .await
        .unwrap();

    let handler = end_handler(&harness);
    handler.on_end(PLAN).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.interrupts.get(&interrupt.id).await.unwrap().is_active());

    harness.locker.release(held).await.unwrap();
    handler.shutdown().await;

    assert!(!harness.interrupts.get(&interrupt.id).await.unwrap().is_active());
    assert!(!harness.locker.is_locked(&plan_lock_name(PLAN)));
}

#[tokio::test]
async fn test_cleanup_proceeds_when_lock_stays_held() {
    let mut config = test_config();
    config.lock.wait_timeout_ms = 20;
    config.end_worker.lock_attempts = 2;
    let harness = Harness::with_config(config, true);
    let interrupt = harness.persist(InterruptType::ExpireAll).await;

    let _held = harness
        .locker
        .acquire(&plan_lock_name(PLAN), Duration::from_secs(1))
        .await
        .unwrap();

    let handler = end_handler(&harness);
    assert_eq!(handler.close_now(PLAN).await.unwrap(), 1);
    assert!(!harness.interrupts.get(&interrupt.id).await.unwrap().is_active());
    handler.shutdown().await;
}
