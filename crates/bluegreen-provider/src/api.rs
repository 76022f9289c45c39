//! Collaborator traits for the hosting platform.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use bluegreen_core::{BundleLocation, OptionSetting, ProviderResult, RuleAction};

use crate::wire::{
    AutoScalingGroupDescription, EnvironmentDescription, EventDescription, ListenerDescription,
    ResourceDescription, RuleDescription, TagDescription, TargetPoolDescription,
    VersionDescription,
};

/// Filter for `describe_environments`. Empty `names`/`ids` mean "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribeEnvironments {
    pub application: String,
    pub names: Vec<String>,
    pub ids: Vec<String>,
    pub include_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEnvironment {
    pub application: String,
    pub name: String,
    /// Requested alias prefix; the platform appends its domain.
    pub alias_prefix: Option<String>,
    pub version_label: Option<String>,
    pub template: Option<String>,
    pub platform_branch: Option<String>,
    pub option_settings: Vec<OptionSetting>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEnvironment {
    pub environment_id: String,
    pub version_label: Option<String>,
    pub template: Option<String>,
    pub option_settings: Vec<OptionSetting>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVersion {
    pub application: String,
    pub label: String,
    pub description: Option<String>,
    pub source_bundle: Option<BundleLocation>,
}

/// Environment lifecycle, events, alias swap and termination protection.
#[async_trait]
pub trait EnvironmentApi: Send + Sync {
    async fn describe_environments(
        &self,
        query: &DescribeEnvironments,
    ) -> ProviderResult<Vec<EnvironmentDescription>>;

    async fn describe_environment_resources(
        &self,
        environment_id: &str,
    ) -> ProviderResult<ResourceDescription>;

    async fn create_environment(
        &self,
        request: &CreateEnvironment,
    ) -> ProviderResult<EnvironmentDescription>;

    async fn update_environment(
        &self,
        request: &UpdateEnvironment,
    ) -> ProviderResult<EnvironmentDescription>;

    async fn terminate_environment(
        &self,
        environment_id: &str,
    ) -> ProviderResult<EnvironmentDescription>;

    /// Atomically exchange the aliases of two environments.
    async fn swap_environment_aliases(
        &self,
        source_id: &str,
        destination_id: &str,
    ) -> ProviderResult<()>;

    /// Events for an environment with a timestamp strictly after `since`
    /// (Unix millis). Order is unspecified.
    async fn describe_events(
        &self,
        environment_id: &str,
        since: u64,
    ) -> ProviderResult<Vec<EventDescription>>;

    async fn set_termination_protection(
        &self,
        environment_id: &str,
        protected: bool,
    ) -> ProviderResult<()>;
}

/// Listeners, rules, tags, backend pools and autoscaling groups.
#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    async fn describe_listeners(
        &self,
        load_balancer_arn: &str,
    ) -> ProviderResult<Vec<ListenerDescription>>;

    async fn describe_rules(&self, listener_arn: &str) -> ProviderResult<Vec<RuleDescription>>;

    async fn describe_tags(&self, resource_arns: &[String]) -> ProviderResult<Vec<TagDescription>>;

    /// Replace a rule's full action list. Conditions are left untouched.
    async fn modify_rule(&self, rule_arn: &str, actions: &[RuleAction]) -> ProviderResult<()>;

    async fn describe_target_pools(
        &self,
        pool_arns: &[String],
    ) -> ProviderResult<Vec<TargetPoolDescription>>;

    async fn describe_autoscaling_groups(
        &self,
        names: &[String],
    ) -> ProviderResult<Vec<AutoScalingGroupDescription>>;
}

/// Application version registry. Uploading bundles is not part of it.
#[async_trait]
pub trait ArtifactApi: Send + Sync {
    async fn describe_version(
        &self,
        application: &str,
        label: &str,
    ) -> ProviderResult<Option<VersionDescription>>;

    async fn create_version(&self, request: &CreateVersion) -> ProviderResult<VersionDescription>;
}
