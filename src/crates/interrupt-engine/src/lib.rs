//! # Interrupt Engine
//!
//! Interrupt and abort propagation for a pipeline-execution orchestrator.
//! Callers register control requests (abort, expire, pause, resume, retry)
//! against a running plan execution; the engine persists them and drives the
//! plan's execution tree to a consistent state.
//!
//! ## Features
//!
//! - **Serialized registration** - One registration per plan at a time, behind
//!   a distributed lock
//! - **Convergent monitor** - Repeatable tree sweeps that stop leaves first and
//!   never fire a stop action twice on one node
//! - **Expiry continuations** - Wait/notify callbacks that finish an expiry
//!   exactly once, on acknowledgement or deadline
//! - **End-of-plan cleanup** - Background closing of interrupts left open when
//!   a plan finishes
//! - **SQLite adapters** - Reference storage and lock implementations
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use interrupt_engine::{InterruptPackage, InterruptType};
//!
//! # async fn example(engine: interrupt_engine::InterruptEngine) -> interrupt_engine::Result<()> {
//! let interrupt = engine
//!     .manager()
//!     .register(InterruptPackage::new("plan-1", InterruptType::AbortAll))
//!     .await?;
//! println!("{} is {}", interrupt.id, interrupt.state);
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod callback;
pub mod config;
pub mod db;
pub mod engine;
pub mod executor;
pub mod handlers;
pub mod helpers;
pub mod lock;
pub mod manager;
pub mod models;
pub mod monitor;
pub mod orchestration_end;
pub mod repositories;
pub mod services;
pub mod sweeper;
pub mod waitnotify;

// Error types and utilities
mod error;

// Error types
pub use error::{InterruptError, Result};

// Re-export models
pub use models::{
    ExecutionMode, Interrupt, InterruptConfig, InterruptEffect, InterruptPackage, InterruptState,
    InterruptType, IssuerMetadata, NodeExecution, PlanExecution, Status,
};

// Re-export database and config types
pub use config::{load_config, ConfigLoader, InterruptEngineConfig};
pub use db::Database;

// Re-export the engine surface
pub use callback::ExpiryInterruptCallback;
pub use engine::InterruptEngine;
pub use executor::{
    BroadcastCompletionPublisher, CompletionPublisher, ExecutorClient, LoggingExecutorClient,
    NodeCompletion, NodeSignal,
};
pub use handlers::{HandlerRegistry, InterruptHandler};
pub use helpers::{AbortHelper, ExpiryHelper};
pub use lock::{InMemoryLocker, LockGuard, LockHandle, Locker, SqliteLocker};
pub use manager::InterruptManager;
pub use monitor::{InterruptMonitor, SweepOutcome, SweepReport};
pub use orchestration_end::OrchestrationEndInterruptHandler;
pub use services::InterruptServices;
pub use sweeper::InterruptSweeper;
pub use waitnotify::{
    CorrelationKey, InMemoryWaitNotifyEngine, NotifyCallback, Resolution, WaitNotifyEngine,
};

// Re-export repositories
pub use repositories::{
    InMemoryInterruptRepository, InMemoryNodeExecutionService, InMemoryPlanExecutionService,
    InterruptRepository, NodeExecutionService, PlanExecutionService, SqliteInterruptRepository,
    SqliteNodeExecutionService, SqlitePlanExecutionService,
};
