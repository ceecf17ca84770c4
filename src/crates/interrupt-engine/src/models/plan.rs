//! Plan execution read model

use super::Status;
use serde::{Deserialize, Serialize};

/// Minimal projection of a running pipeline instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanExecution {
    pub id: String,
    pub status: Status,
}

impl PlanExecution {
    pub fn new(id: impl Into<String>, status: Status) -> Self {
        Self {
            id: id.into(),
            status,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}
