//! Records persisted by the sandbox and the mutating-call log.

use serde::{Deserialize, Serialize};

use bluegreen_core::{
    Environment, EnvironmentStatus, HealthColor, Listener, ProviderEvent, RoutingRule, RuleAction,
    Tag,
};

/// An environment plus the simulation state the platform keeps for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    pub application: String,
    pub environment: Environment,
    pub protected: bool,
    /// Describe polls left before a transitional status settles.
    pub pending_polls: u32,
    /// Health reported once the environment settles to Ready.
    pub pending_health: HealthColor,
    pub load_balancer: String,
    pub autoscaling_group: String,
}

impl EnvironmentRecord {
    pub fn is_live(&self) -> bool {
        self.environment.status != EnvironmentStatus::Terminated
    }

    pub fn is_transitional(&self) -> bool {
        matches!(
            self.environment.status,
            EnvironmentStatus::Launching | EnvironmentStatus::Updating | EnvironmentStatus::Terminating
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub environment_id: String,
    pub event: ProviderEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerRecord {
    pub load_balancer_arn: String,
    pub listener: Listener,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub rule: RoutingRule,
    pub tags: Vec<Tag>,
}

/// A mutating call received by the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    CreateEnvironment { name: String, alias: String },
    UpdateEnvironment { environment_id: String, version_label: Option<String> },
    TerminateEnvironment { environment_id: String },
    SwapAliases { source_id: String, destination_id: String },
    SetTerminationProtection { environment_id: String, protected: bool },
    ModifyRule { rule_arn: String, actions: Vec<RuleAction> },
    CreateVersion { label: String },
}

impl ProviderCall {
    pub fn is_create(&self) -> bool {
        matches!(self, ProviderCall::CreateEnvironment { .. })
    }

    pub fn is_update(&self) -> bool {
        matches!(self, ProviderCall::UpdateEnvironment { .. })
    }
}
