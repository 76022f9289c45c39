//! Validated client context passed explicitly through the engine.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use bluegreen_core::{
    ApplicationVersion, AutoScalingGroup, Environment, EnvironmentResources, Listener,
    ProviderError, ProviderEvent, ProviderResult, RoutingRule, RuleAction, Tag, TargetPool,
};

use crate::api::{
    ArtifactApi, CreateEnvironment, CreateVersion, DescribeEnvironments, EnvironmentApi,
    LoadBalancerApi, UpdateEnvironment,
};

/// One implementation of each collaborator, constructed once per run.
#[derive(Clone)]
pub struct Clients {
    environments: Arc<dyn EnvironmentApi>,
    load_balancers: Arc<dyn LoadBalancerApi>,
    artifacts: Arc<dyn ArtifactApi>,
}

impl Clients {
    pub fn new(
        environments: Arc<dyn EnvironmentApi>,
        load_balancers: Arc<dyn LoadBalancerApi>,
        artifacts: Arc<dyn ArtifactApi>,
    ) -> Self {
        Self {
            environments,
            load_balancers,
            artifacts,
        }
    }

    /// Use a single platform implementation for every collaborator.
    pub fn from_platform<P>(platform: Arc<P>) -> Self
    where
        P: EnvironmentApi + LoadBalancerApi + ArtifactApi + 'static,
    {
        Self {
            environments: platform.clone(),
            load_balancers: platform.clone(),
            artifacts: platform,
        }
    }

    // ── Environments ───────────────────────────────────────────────

    /// Live environments of `application` with one of the given names.
    pub async fn describe_environments(
        &self,
        application: &str,
        names: &[String],
    ) -> ProviderResult<Vec<Environment>> {
        const OP: &str = "DescribeEnvironments";
        let query = DescribeEnvironments {
            application: application.to_string(),
            names: names.to_vec(),
            ids: Vec::new(),
            include_deleted: false,
        };
        let raw = self.environments.describe_environments(&query).await?;
        let envs = raw
            .into_iter()
            .map(|d| d.validate(OP))
            .collect::<ProviderResult<Vec<_>>>()?;
        debug!(%application, found = envs.len(), "environments described");
        Ok(envs)
    }

    /// Re-read one environment by id, including terminated ones.
    ///
    /// Returns `None` once the platform has forgotten the environment.
    pub async fn describe_environment(&self, environment_id: &str) -> ProviderResult<Option<Environment>> {
        const OP: &str = "DescribeEnvironments";
        let query = DescribeEnvironments {
            ids: vec![environment_id.to_string()],
            include_deleted: true,
            ..Default::default()
        };
        let raw = self.environments.describe_environments(&query).await?;
        match raw.into_iter().next() {
            Some(d) => d.validate(OP).map(Some),
            None => Ok(None),
        }
    }

    pub async fn environment_resources(
        &self,
        environment_id: &str,
    ) -> ProviderResult<EnvironmentResources> {
        self.environments
            .describe_environment_resources(environment_id)
            .await?
            .validate("DescribeEnvironmentResources")
    }

    pub async fn create_environment(&self, request: &CreateEnvironment) -> ProviderResult<Environment> {
        self.environments
            .create_environment(request)
            .await?
            .validate("CreateEnvironment")
    }

    pub async fn update_environment(&self, request: &UpdateEnvironment) -> ProviderResult<Environment> {
        self.environments
            .update_environment(request)
            .await?
            .validate("UpdateEnvironment")
    }

    pub async fn terminate_environment(&self, environment_id: &str) -> ProviderResult<Environment> {
        self.environments
            .terminate_environment(environment_id)
            .await?
            .validate("TerminateEnvironment")
    }

    pub async fn swap_aliases(&self, source_id: &str, destination_id: &str) -> ProviderResult<()> {
        self.environments
            .swap_environment_aliases(source_id, destination_id)
            .await
    }

    /// Events newer than `since`, oldest first.
    pub async fn events_since(&self, environment_id: &str, since: u64) -> ProviderResult<Vec<ProviderEvent>> {
        let raw = self.environments.describe_events(environment_id, since).await?;
        let mut events = raw
            .into_iter()
            .map(|d| d.validate("DescribeEvents"))
            .collect::<ProviderResult<Vec<_>>>()?;
        events.retain(|e| e.timestamp > since);
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    pub async fn set_termination_protection(
        &self,
        environment_id: &str,
        protected: bool,
    ) -> ProviderResult<()> {
        self.environments
            .set_termination_protection(environment_id, protected)
            .await
    }

    // ── Load balancing ─────────────────────────────────────────────

    pub async fn listeners(&self, load_balancer_arn: &str) -> ProviderResult<Vec<Listener>> {
        self.load_balancers
            .describe_listeners(load_balancer_arn)
            .await?
            .into_iter()
            .map(|d| d.validate("DescribeListeners"))
            .collect()
    }

    pub async fn rules(&self, listener: &Listener) -> ProviderResult<Vec<RoutingRule>> {
        self.load_balancers
            .describe_rules(&listener.arn)
            .await?
            .into_iter()
            .map(|d| d.validate("DescribeRules", &listener.arn))
            .collect()
    }

    /// Tags keyed by resource arn. Resources without tags map to an empty list.
    pub async fn tags(&self, resource_arns: &[String]) -> ProviderResult<HashMap<String, Vec<Tag>>> {
        let mut by_arn: HashMap<String, Vec<Tag>> = resource_arns
            .iter()
            .map(|arn| (arn.clone(), Vec::new()))
            .collect();
        if resource_arns.is_empty() {
            return Ok(by_arn);
        }
        for desc in self.load_balancers.describe_tags(resource_arns).await? {
            let arn = desc.resource_arn.ok_or(ProviderError::MissingField {
                operation: "DescribeTags",
                field: "ResourceArn",
            })?;
            by_arn.entry(arn).or_default().extend(desc.tags.unwrap_or_default());
        }
        Ok(by_arn)
    }

    pub async fn modify_rule(&self, rule_arn: &str, actions: &[RuleAction]) -> ProviderResult<()> {
        self.load_balancers.modify_rule(rule_arn, actions).await
    }

    pub async fn target_pools(&self, pool_arns: &[String]) -> ProviderResult<Vec<TargetPool>> {
        if pool_arns.is_empty() {
            return Ok(Vec::new());
        }
        self.load_balancers
            .describe_target_pools(pool_arns)
            .await?
            .into_iter()
            .map(|d| d.validate("DescribeTargetGroups"))
            .collect()
    }

    pub async fn autoscaling_groups(&self, names: &[String]) -> ProviderResult<Vec<AutoScalingGroup>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        self.load_balancers
            .describe_autoscaling_groups(names)
            .await?
            .into_iter()
            .map(|d| d.validate("DescribeAutoScalingGroups"))
            .collect()
    }

    // ── Versions ───────────────────────────────────────────────────

    pub async fn find_version(
        &self,
        application: &str,
        label: &str,
    ) -> ProviderResult<Option<ApplicationVersion>> {
        match self.artifacts.describe_version(application, label).await? {
            Some(d) => d.validate("DescribeApplicationVersions").map(Some),
            None => Ok(None),
        }
    }

    pub async fn create_version(&self, request: &CreateVersion) -> ProviderResult<ApplicationVersion> {
        self.artifacts
            .create_version(request)
            .await?
            .validate("CreateApplicationVersion")
    }
}
