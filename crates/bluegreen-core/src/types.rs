//! Shared types used across the blue/green crates.
//!
//! These are the validated domain shapes. Raw provider responses are
//! converted into them at the boundary (see `bluegreen-provider`), so
//! everything downstream can rely on required fields being present.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Health ─────────────────────────────────────────────────────────

/// Provider-reported health color, totally ordered `Grey < Red < Yellow < Green`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HealthColor {
    #[serde(alias = "grey", alias = "gray")]
    Grey,
    #[serde(alias = "red")]
    Red,
    #[serde(alias = "yellow")]
    Yellow,
    #[serde(alias = "green")]
    Green,
}

impl HealthColor {
    pub fn label(&self) -> &'static str {
        match self {
            HealthColor::Grey => "Grey",
            HealthColor::Red => "Red",
            HealthColor::Yellow => "Yellow",
            HealthColor::Green => "Green",
        }
    }
}

impl fmt::Display for HealthColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for HealthColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grey" | "gray" => Ok(HealthColor::Grey),
            "red" => Ok(HealthColor::Red),
            "yellow" => Ok(HealthColor::Yellow),
            "green" => Ok(HealthColor::Green),
            other => Err(format!("unknown health color: {other}")),
        }
    }
}

// ── Environment ────────────────────────────────────────────────────

/// Lifecycle status of an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvironmentStatus {
    Launching,
    Updating,
    Ready,
    Terminating,
    Terminated,
}

impl EnvironmentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            EnvironmentStatus::Launching => "Launching",
            EnvironmentStatus::Updating => "Updating",
            EnvironmentStatus::Ready => "Ready",
            EnvironmentStatus::Terminating => "Terminating",
            EnvironmentStatus::Terminated => "Terminated",
        }
    }
}

impl fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EnvironmentStatus {
    type Err = String;

    /// Parses provider status strings. The transitional link/abort states
    /// behave like an update from the orchestrator's point of view.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Launching" => Ok(EnvironmentStatus::Launching),
            "Updating" | "Aborting" | "LinkingFrom" | "LinkingTo" => {
                Ok(EnvironmentStatus::Updating)
            }
            "Ready" => Ok(EnvironmentStatus::Ready),
            "Terminating" => Ok(EnvironmentStatus::Terminating),
            "Terminated" => Ok(EnvironmentStatus::Terminated),
            other => Err(format!("unknown environment status: {other}")),
        }
    }
}

/// A deployed instance of the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub id: String,
    pub name: String,
    /// Full public alias (cname), e.g. `my-app.us-west-2.elasticbeanstalk.com`.
    pub alias: String,
    pub endpoint_url: Option<String>,
    pub status: EnvironmentStatus,
    pub health: HealthColor,
    pub version_label: Option<String>,
    /// Unix timestamp (milliseconds) when the environment was created.
    pub created_at: u64,
}

impl Environment {
    pub fn is_ready(&self) -> bool {
        self.status == EnvironmentStatus::Ready
    }

    /// The alias with the provider's domain suffix stripped.
    ///
    /// Returns `None` when the alias does not live under `domain`.
    pub fn alias_prefix<'a>(&'a self, domain: &str) -> Option<&'a str> {
        self.alias
            .strip_suffix(domain)
            .and_then(|rest| rest.strip_suffix('.'))
            .filter(|prefix| !prefix.is_empty())
    }
}

/// Role an environment plays in the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Production,
    Staging,
    Single,
}

/// How production traffic is cut over to the new slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStrategy {
    /// Exchange the two environments' public aliases.
    #[default]
    AliasSwap,
    /// Rewrite a shared load balancer's tagged listener rules.
    SharedRoutingTable,
}

impl DeploymentStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            DeploymentStrategy::AliasSwap => "alias_swap",
            DeploymentStrategy::SharedRoutingTable => "shared_routing_table",
        }
    }
}

impl fmt::Display for DeploymentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Provider resources backing an environment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvironmentResources {
    pub environment_id: String,
    /// Load balancer identities (ARNs).
    pub load_balancers: Vec<String>,
    /// Autoscaling group names.
    pub autoscaling_groups: Vec<String>,
}

/// Option that attaches a new environment to an existing load balancer.
pub const SHARED_LB_NAMESPACE: &str = "aws:elbv2:loadbalancer";
pub const SHARED_LB_OPTION: &str = "SharedLoadBalancer";

/// A provider option setting passed on create/update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSetting {
    pub namespace: String,
    pub option_name: String,
    pub value: String,
}

impl OptionSetting {
    pub fn new(namespace: &str, option_name: &str, value: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            option_name: option_name.to_string(),
            value: value.to_string(),
        }
    }
}

// ── Application version ────────────────────────────────────────────

/// Location of an already-uploaded source bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLocation {
    pub bucket: String,
    pub key: String,
}

impl FromStr for BundleLocation {
    type Err = String;

    /// Parses `bucket/key/with/slashes.zip`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok(Self {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            _ => Err(format!("invalid source bundle location: {s}")),
        }
    }
}

/// An immutable deployable artifact reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationVersion {
    pub application: String,
    pub label: String,
    pub description: Option<String>,
    pub source_bundle: Option<BundleLocation>,
}

// ── Load balancing ─────────────────────────────────────────────────

/// An autoscaling group and the backend pools it registers into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoScalingGroup {
    pub name: String,
    pub target_pool_arns: Vec<String>,
}

/// A load-balancer backend pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPool {
    pub arn: String,
    pub port: u16,
}

/// A listener on a load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    pub arn: String,
    pub port: u16,
}

/// A rule match condition. Never modified by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field: String,
    pub values: Vec<String>,
}

/// A listener rule action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RuleAction {
    Forward {
        target_pool_arn: String,
    },
    FixedResponse {
        status_code: String,
        content_type: String,
        message_body: Option<String>,
    },
    Redirect {
        host: Option<String>,
        path: Option<String>,
        status_code: String,
    },
    /// Authentication steps precede the terminal action; their settings
    /// are opaque to the orchestrator.
    Authenticate {
        provider: String,
        config: std::collections::BTreeMap<String, String>,
    },
}

impl RuleAction {
    /// The fixed response used when a rule's alias has no serving environment.
    pub fn unavailable() -> Self {
        RuleAction::FixedResponse {
            status_code: "404".to_string(),
            content_type: "text/plain".to_string(),
            message_body: Some("Environment not available".to_string()),
        }
    }

    pub fn forward(target_pool_arn: &str) -> Self {
        RuleAction::Forward {
            target_pool_arn: target_pool_arn.to_string(),
        }
    }

    /// The pool this action forwards to, if it is a forward.
    pub fn forward_target(&self) -> Option<&str> {
        match self {
            RuleAction::Forward { target_pool_arn } => Some(target_pool_arn),
            _ => None,
        }
    }
}

/// A routing rule on a shared listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub arn: String,
    pub listener_arn: String,
    pub priority: String,
    pub is_default: bool,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
}

impl RoutingRule {
    /// The action that decides where matching traffic ends up.
    pub fn terminal_action(&self) -> Option<&RuleAction> {
        self.actions.last()
    }
}

/// A resource tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

// ── Events ─────────────────────────────────────────────────────────

/// Severity of a provider event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl EventSeverity {
    /// Error and Fatal events abort the enclosing wait.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EventSeverity::Error | EventSeverity::Fatal)
    }

    pub fn label(&self) -> &'static str {
        match self {
            EventSeverity::Trace => "TRACE",
            EventSeverity::Debug => "DEBUG",
            EventSeverity::Info => "INFO",
            EventSeverity::Warn => "WARN",
            EventSeverity::Error => "ERROR",
            EventSeverity::Fatal => "FATAL",
        }
    }
}

impl FromStr for EventSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(EventSeverity::Trace),
            "DEBUG" => Ok(EventSeverity::Debug),
            "INFO" => Ok(EventSeverity::Info),
            "WARN" | "WARNING" => Ok(EventSeverity::Warn),
            "ERROR" => Ok(EventSeverity::Error),
            "FATAL" => Ok(EventSeverity::Fatal),
            other => Err(format!("unknown event severity: {other}")),
        }
    }
}

/// A provider event attached to an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEvent {
    /// Unix timestamp (milliseconds).
    pub timestamp: u64,
    pub severity: EventSeverity,
    pub environment_name: String,
    pub message: String,
}

impl fmt::Display for ProviderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}: {}",
            format_utc_time(self.timestamp),
            self.severity.label(),
            self.environment_name,
            self.message
        )
    }
}

/// Current Unix time in milliseconds.
pub fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Render a millisecond timestamp as `HH:MM:SS` (UTC).
pub fn format_utc_time(millis: u64) -> String {
    let secs_of_day = (millis / 1000) % 86_400;
    format!(
        "{:02}:{:02}:{:02}",
        secs_of_day / 3600,
        (secs_of_day % 3600) / 60,
        secs_of_day % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with_alias(alias: &str) -> Environment {
        Environment {
            id: "e-1".to_string(),
            name: "blue".to_string(),
            alias: alias.to_string(),
            endpoint_url: None,
            status: EnvironmentStatus::Ready,
            health: HealthColor::Green,
            version_label: None,
            created_at: 0,
        }
    }

    #[test]
    fn health_colors_are_ordered() {
        assert!(HealthColor::Grey < HealthColor::Red);
        assert!(HealthColor::Red < HealthColor::Yellow);
        assert!(HealthColor::Yellow < HealthColor::Green);
    }

    #[test]
    fn health_color_parses_case_insensitively() {
        assert_eq!("green".parse::<HealthColor>(), Ok(HealthColor::Green));
        assert_eq!("Gray".parse::<HealthColor>(), Ok(HealthColor::Grey));
        assert!("purple".parse::<HealthColor>().is_err());
    }

    #[test]
    fn transitional_statuses_map_to_updating() {
        assert_eq!(
            "LinkingTo".parse::<EnvironmentStatus>(),
            Ok(EnvironmentStatus::Updating)
        );
        assert_eq!(
            "Aborting".parse::<EnvironmentStatus>(),
            Ok(EnvironmentStatus::Updating)
        );
        assert!("Exploded".parse::<EnvironmentStatus>().is_err());
    }

    #[test]
    fn alias_prefix_strips_domain() {
        let env = env_with_alias("my-app.us-west-2.elasticbeanstalk.com");
        assert_eq!(
            env.alias_prefix("us-west-2.elasticbeanstalk.com"),
            Some("my-app")
        );
        assert_eq!(env.alias_prefix("eu-west-1.elasticbeanstalk.com"), None);
    }

    #[test]
    fn bundle_location_splits_on_first_slash() {
        let loc: BundleLocation = "bucket/app/v1.zip".parse().unwrap();
        assert_eq!(loc.bucket, "bucket");
        assert_eq!(loc.key, "app/v1.zip");
        assert!("no-key".parse::<BundleLocation>().is_err());
    }

    #[test]
    fn rule_action_serializes_with_type_tag() {
        let json = serde_json::to_value(RuleAction::forward("tg-1")).unwrap();
        assert_eq!(json["type"], "forward");
        assert_eq!(json["target_pool_arn"], "tg-1");
    }

    #[test]
    fn event_display_uses_utc_clock() {
        let event = ProviderEvent {
            timestamp: (3600 + 2 * 60 + 3) * 1000,
            severity: EventSeverity::Info,
            environment_name: "blue".to_string(),
            message: "createEnvironment is starting.".to_string(),
        };
        assert_eq!(
            event.to_string(),
            "01:02:03 INFO blue: createEnvironment is starting."
        );
    }

    #[test]
    fn only_error_and_fatal_are_fatal() {
        assert!(!EventSeverity::Warn.is_fatal());
        assert!(EventSeverity::Error.is_fatal());
        assert!(EventSeverity::Fatal.is_fatal());
    }
}
