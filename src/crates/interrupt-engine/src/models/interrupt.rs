//! Interrupt records and the packages callers submit to register them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Closed set of interrupt types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterruptType {
    /// Abort every active leaf of the plan
    AbortAll,
    /// Abort a single node
    Abort,
    /// Expire every active leaf of the plan
    ExpireAll,
    /// Expire a single node
    MarkExpired,
    /// Pause the whole plan
    PauseAll,
    /// Resume a paused plan
    ResumeAll,
    /// Retry a single node
    Retry,
}

impl InterruptType {
    pub const ALL: [InterruptType; 7] = [
        InterruptType::AbortAll,
        InterruptType::Abort,
        InterruptType::ExpireAll,
        InterruptType::MarkExpired,
        InterruptType::PauseAll,
        InterruptType::ResumeAll,
        InterruptType::Retry,
    ];

    /// Types that sweep the whole execution tree through the monitor
    pub fn is_tree_wide(self) -> bool {
        matches!(self, InterruptType::AbortAll | InterruptType::ExpireAll)
    }

    /// Types that act on `target_node_execution_id` only
    pub fn is_node_scoped(self) -> bool {
        matches!(
            self,
            InterruptType::Abort | InterruptType::MarkExpired | InterruptType::Retry
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InterruptType::AbortAll => "ABORT_ALL",
            InterruptType::Abort => "ABORT",
            InterruptType::ExpireAll => "EXPIRE_ALL",
            InterruptType::MarkExpired => "MARK_EXPIRED",
            InterruptType::PauseAll => "PAUSE_ALL",
            InterruptType::ResumeAll => "RESUME_ALL",
            InterruptType::Retry => "RETRY",
        }
    }
}

impl fmt::Display for InterruptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterruptType {
    type Err = crate::InterruptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InterruptType::ALL
            .into_iter()
            .find(|ty| ty.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::InterruptError::UnsupportedInterruptType(s.to_string()))
    }
}

/// Lifecycle of an interrupt
///
/// `Registered -> Processing -> {ProcessedSuccessfully | ProcessedUnsuccessfully}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterruptState {
    Registered,
    Processing,
    ProcessedSuccessfully,
    ProcessedUnsuccessfully,
}

impl InterruptState {
    pub const ACTIVE: [InterruptState; 2] = [InterruptState::Registered, InterruptState::Processing];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InterruptState::ProcessedSuccessfully | InterruptState::ProcessedUnsuccessfully
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InterruptState::Registered => "REGISTERED",
            InterruptState::Processing => "PROCESSING",
            InterruptState::ProcessedSuccessfully => "PROCESSED_SUCCESSFULLY",
            InterruptState::ProcessedUnsuccessfully => "PROCESSED_UNSUCCESSFULLY",
        }
    }
}

impl fmt::Display for InterruptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterruptState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "REGISTERED" => Ok(InterruptState::Registered),
            "PROCESSING" => Ok(InterruptState::Processing),
            "PROCESSED_SUCCESSFULLY" => Ok(InterruptState::ProcessedSuccessfully),
            "PROCESSED_UNSUCCESSFULLY" => Ok(InterruptState::ProcessedUnsuccessfully),
            other => Err(format!("Unknown interrupt state: {}", other)),
        }
    }
}

/// Who or what issued an interrupt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssuerMetadata {
    /// A user acting through the API or UI
    Manual {
        identifier: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
    },
    /// A step or stage timeout
    Timeout { timeout_instance_id: String },
    /// A pipeline trigger superseding this run
    Trigger { trigger_type: String },
    /// A failure strategy adviser
    Adviser { failure_type: String },
    /// The orchestrator itself
    #[default]
    System,
}

/// Caller supplied configuration attached to an interrupt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptConfig {
    #[serde(default)]
    pub issued_by: IssuerMetadata,

    /// Free-form parameters forwarded to helpers and executors
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl InterruptConfig {
    pub fn new(issued_by: IssuerMetadata) -> Self {
        Self {
            issued_by,
            parameters: BTreeMap::new(),
        }
    }

    pub fn manual(identifier: impl Into<String>) -> Self {
        Self::new(IssuerMetadata::Manual {
            identifier: identifier.into(),
            email: None,
        })
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// A persisted control request against a running plan execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    pub id: String,
    pub plan_execution_id: String,
    pub interrupt_type: InterruptType,
    pub state: InterruptState,
    /// Set together with `ProcessedUnsuccessfully` when the monitor gave up
    #[serde(default)]
    pub forceful: bool,
    pub config: InterruptConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_node_execution_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl Interrupt {
    /// Build a new interrupt in `Processing` state from a package
    pub fn processing(package: &InterruptPackage) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            plan_execution_id: package.plan_execution_id.clone(),
            interrupt_type: package.interrupt_type,
            state: InterruptState::Processing,
            forceful: false,
            config: package.interrupt_config.clone(),
            target_node_execution_id: package.target_node_execution_id.clone(),
            created_at: now,
            last_updated_at: now,
        }
    }

    pub fn issuer(&self) -> &IssuerMetadata {
        &self.config.issued_by
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }
}

/// Input to `InterruptManager::register`; never persisted itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptPackage {
    pub plan_execution_id: String,
    pub interrupt_type: InterruptType,
    #[serde(default)]
    pub interrupt_config: InterruptConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_node_execution_id: Option<String>,
}

impl InterruptPackage {
    pub fn new(plan_execution_id: impl Into<String>, interrupt_type: InterruptType) -> Self {
        Self {
            plan_execution_id: plan_execution_id.into(),
            interrupt_type,
            interrupt_config: InterruptConfig::default(),
            target_node_execution_id: None,
        }
    }

    pub fn with_config(mut self, config: InterruptConfig) -> Self {
        self.interrupt_config = config;
        self
    }

    pub fn with_target_node(mut self, node_execution_id: impl Into<String>) -> Self {
        self.target_node_execution_id = Some(node_execution_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_type_parsing() {
        assert_eq!("abort_all".parse::<InterruptType>().unwrap(), InterruptType::AbortAll);
        let err = "SKIP_ALL".parse::<InterruptType>().unwrap_err();
        assert!(matches!(err, crate::InterruptError::UnsupportedInterruptType(_)));
    }

    #[test]
    fn test_scopes_are_exclusive() {
        for ty in InterruptType::ALL {
            assert!(!(ty.is_tree_wide() && ty.is_node_scoped()), "{ty}");
        }
    }

    #[test]
    fn test_processing_interrupt_from_package() {
        let package = InterruptPackage::new("plan-1", InterruptType::MarkExpired)
            .with_target_node("node-7")
            .with_config(InterruptConfig::manual("admin").with_parameter("reason", "stale"));

        let interrupt = Interrupt::processing(&package);
        assert_eq!(interrupt.state, InterruptState::Processing);
        assert_eq!(interrupt.target_node_execution_id.as_deref(), Some("node-7"));
        assert!(!interrupt.forceful);
        assert!(interrupt.is_active());
        assert!(matches!(interrupt.issuer(), IssuerMetadata::Manual { identifier, .. } if identifier == "admin"));
    }

    #[test]
    fn test_issuer_serialization_is_tagged() {
        let config = InterruptConfig::new(IssuerMetadata::Timeout {
            timeout_instance_id: "t-1".to_string(),
        });
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["issued_by"]["kind"], "timeout");
        let back: InterruptConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }
}
