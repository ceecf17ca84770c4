//! Data model for interrupts and the execution trees they act on

pub mod interrupt;
pub mod node;
pub mod plan;
pub mod status;

pub use interrupt::{
    Interrupt, InterruptConfig, InterruptPackage, InterruptState, InterruptType, IssuerMetadata,
};
pub use node::{ExecutionMode, InterruptEffect, NodeExecution};
pub use plan::PlanExecution;
pub use status::Status;
