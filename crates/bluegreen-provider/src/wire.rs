//! Raw response shapes as the platform returns them.
//!
//! Every field is optional on the wire. The `validate` methods turn a
//! description into the matching domain type, raising
//! [`ProviderError::MissingField`] or [`ProviderError::InvalidValue`]
//! instead of letting a hole travel further into the engine.

use serde::{Deserialize, Serialize};

use bluegreen_core::{
    ApplicationVersion, AutoScalingGroup, BundleLocation, Environment, EnvironmentResources,
    EnvironmentStatus, EventSeverity, HealthColor, Listener, ProviderError, ProviderEvent,
    ProviderResult, RoutingRule, RuleAction, RuleCondition, Tag, TargetPool,
};

fn required<T>(value: Option<T>, operation: &'static str, field: &'static str) -> ProviderResult<T> {
    value.ok_or(ProviderError::MissingField { operation, field })
}

fn parsed<T: std::str::FromStr<Err = String>>(
    value: Option<String>,
    operation: &'static str,
    field: &'static str,
) -> ProviderResult<T> {
    required(value, operation, field)?
        .parse()
        .map_err(|message| ProviderError::InvalidValue {
            operation,
            field,
            message,
        })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDescription {
    pub environment_id: Option<String>,
    pub environment_name: Option<String>,
    pub cname: Option<String>,
    pub endpoint_url: Option<String>,
    pub status: Option<String>,
    pub health: Option<String>,
    pub version_label: Option<String>,
    pub date_created: Option<u64>,
}

impl EnvironmentDescription {
    pub fn validate(self, operation: &'static str) -> ProviderResult<Environment> {
        Ok(Environment {
            id: required(self.environment_id, operation, "EnvironmentId")?,
            name: required(self.environment_name, operation, "EnvironmentName")?,
            alias: required(self.cname, operation, "CNAME")?,
            endpoint_url: self.endpoint_url,
            status: parsed::<EnvironmentStatus>(self.status, operation, "Status")?,
            // Freshly launched environments report no color yet.
            health: match self.health {
                Some(health) => parsed::<HealthColor>(Some(health), operation, "Health")?,
                None => HealthColor::Grey,
            },
            version_label: self.version_label,
            created_at: self.date_created.unwrap_or_default(),
        })
    }
}

impl From<&Environment> for EnvironmentDescription {
    fn from(env: &Environment) -> Self {
        Self {
            environment_id: Some(env.id.clone()),
            environment_name: Some(env.name.clone()),
            cname: Some(env.alias.clone()),
            endpoint_url: env.endpoint_url.clone(),
            status: Some(env.status.label().to_string()),
            health: Some(env.health.label().to_string()),
            version_label: env.version_label.clone(),
            date_created: Some(env.created_at),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescription {
    pub environment_id: Option<String>,
    pub load_balancers: Option<Vec<String>>,
    pub autoscaling_groups: Option<Vec<String>>,
}

impl ResourceDescription {
    pub fn validate(self, operation: &'static str) -> ProviderResult<EnvironmentResources> {
        Ok(EnvironmentResources {
            environment_id: required(self.environment_id, operation, "EnvironmentId")?,
            load_balancers: self.load_balancers.unwrap_or_default(),
            autoscaling_groups: self.autoscaling_groups.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDescription {
    pub event_date: Option<u64>,
    pub severity: Option<String>,
    pub environment_name: Option<String>,
    pub message: Option<String>,
}

impl EventDescription {
    pub fn validate(self, operation: &'static str) -> ProviderResult<ProviderEvent> {
        Ok(ProviderEvent {
            timestamp: required(self.event_date, operation, "EventDate")?,
            severity: parsed::<EventSeverity>(self.severity, operation, "Severity")?,
            environment_name: self.environment_name.unwrap_or_default(),
            message: self.message.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerDescription {
    pub listener_arn: Option<String>,
    pub port: Option<u16>,
}

impl ListenerDescription {
    pub fn validate(self, operation: &'static str) -> ProviderResult<Listener> {
        Ok(Listener {
            arn: required(self.listener_arn, operation, "ListenerArn")?,
            port: required(self.port, operation, "Port")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDescription {
    pub rule_arn: Option<String>,
    pub priority: Option<String>,
    pub is_default: Option<bool>,
    pub conditions: Option<Vec<RuleCondition>>,
    pub actions: Option<Vec<RuleAction>>,
}

impl RuleDescription {
    pub fn validate(self, operation: &'static str, listener_arn: &str) -> ProviderResult<RoutingRule> {
        Ok(RoutingRule {
            arn: required(self.rule_arn, operation, "RuleArn")?,
            listener_arn: listener_arn.to_string(),
            priority: self.priority.unwrap_or_else(|| "default".to_string()),
            is_default: self.is_default.unwrap_or(false),
            conditions: self.conditions.unwrap_or_default(),
            actions: self.actions.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDescription {
    pub resource_arn: Option<String>,
    pub tags: Option<Vec<Tag>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPoolDescription {
    pub target_group_arn: Option<String>,
    pub port: Option<u16>,
}

impl TargetPoolDescription {
    pub fn validate(self, operation: &'static str) -> ProviderResult<TargetPool> {
        Ok(TargetPool {
            arn: required(self.target_group_arn, operation, "TargetGroupArn")?,
            port: required(self.port, operation, "Port")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoScalingGroupDescription {
    pub auto_scaling_group_name: Option<String>,
    pub target_group_arns: Option<Vec<String>>,
}

impl AutoScalingGroupDescription {
    pub fn validate(self, operation: &'static str) -> ProviderResult<AutoScalingGroup> {
        Ok(AutoScalingGroup {
            name: required(self.auto_scaling_group_name, operation, "AutoScalingGroupName")?,
            target_pool_arns: self.target_group_arns.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDescription {
    pub application_name: Option<String>,
    pub version_label: Option<String>,
    pub description: Option<String>,
    pub source_bundle: Option<BundleLocation>,
}

impl VersionDescription {
    pub fn validate(self, operation: &'static str) -> ProviderResult<ApplicationVersion> {
        Ok(ApplicationVersion {
            application: required(self.application_name, operation, "ApplicationName")?,
            label: required(self.version_label, operation, "VersionLabel")?,
            description: self.description,
            source_bundle: self.source_bundle,
        })
    }
}
