//! Execution status lattice shared by node and plan executions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a node or plan execution
///
/// Terminal statuses are final: once a node reaches one it is never moved back
/// into a non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Queued,
    Running,
    AsyncWaiting,
    TaskWaiting,
    TimedWaiting,
    InterventionWaiting,
    ApprovalWaiting,
    InputWaiting,
    ResourceWaiting,
    Pausing,
    Paused,
    /// Told to stop, not yet terminal
    Discontinuing,
    Succeeded,
    Failed,
    Errored,
    Aborted,
    Expired,
    Skipped,
    IgnoreFailed,
}

impl Status {
    pub const ALL: [Status; 19] = [
        Status::Queued,
        Status::Running,
        Status::AsyncWaiting,
        Status::TaskWaiting,
        Status::TimedWaiting,
        Status::InterventionWaiting,
        Status::ApprovalWaiting,
        Status::InputWaiting,
        Status::ResourceWaiting,
        Status::Pausing,
        Status::Paused,
        Status::Discontinuing,
        Status::Succeeded,
        Status::Failed,
        Status::Errored,
        Status::Aborted,
        Status::Expired,
        Status::Skipped,
        Status::IgnoreFailed,
    ];

    /// Statuses an interrupt may move to `Discontinuing`
    pub const RUNNING_LIKE: [Status; 11] = [
        Status::Queued,
        Status::Running,
        Status::AsyncWaiting,
        Status::TaskWaiting,
        Status::TimedWaiting,
        Status::InterventionWaiting,
        Status::ApprovalWaiting,
        Status::InputWaiting,
        Status::ResourceWaiting,
        Status::Pausing,
        Status::Paused,
    ];

    /// Statuses from which a node may be retried
    pub const RETRYABLE: [Status; 5] = [
        Status::InterventionWaiting,
        Status::ApprovalWaiting,
        Status::Failed,
        Status::Errored,
        Status::Expired,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Status::Succeeded
                | Status::Failed
                | Status::Errored
                | Status::Aborted
                | Status::Expired
                | Status::Skipped
                | Status::IgnoreFailed
        )
    }

    pub fn is_running_like(self) -> bool {
        Self::RUNNING_LIKE.contains(&self)
    }

    pub fn is_retryable(self) -> bool {
        Self::RETRYABLE.contains(&self)
    }

    /// All non-terminal statuses
    pub fn non_terminal() -> Vec<Status> {
        Self::ALL.into_iter().filter(|s| !s.is_terminal()).collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Queued => "QUEUED",
            Status::Running => "RUNNING",
            Status::AsyncWaiting => "ASYNC_WAITING",
            Status::TaskWaiting => "TASK_WAITING",
            Status::TimedWaiting => "TIMED_WAITING",
            Status::InterventionWaiting => "INTERVENTION_WAITING",
            Status::ApprovalWaiting => "APPROVAL_WAITING",
            Status::InputWaiting => "INPUT_WAITING",
            Status::ResourceWaiting => "RESOURCE_WAITING",
            Status::Pausing => "PAUSING",
            Status::Paused => "PAUSED",
            Status::Discontinuing => "DISCONTINUING",
            Status::Succeeded => "SUCCEEDED",
            Status::Failed => "FAILED",
            Status::Errored => "ERRORED",
            Status::Aborted => "ABORTED",
            Status::Expired => "EXPIRED",
            Status::Skipped => "SKIPPED",
            Status::IgnoreFailed => "IGNORE_FAILED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown execution status: {}", s))
    }
}
