//! Sandbox: a simulated hosting platform.
//!
//! Implements every collaborator trait from `bluegreen-provider` on top of
//! [`SandboxStore`]. Transitional statuses settle after a configurable
//! number of describe polls, so a waiter sees the same Launching → Ready
//! and Terminating → Terminated progressions a real platform reports.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info};

use bluegreen_core::{
    ApplicationVersion, AutoScalingGroup, Environment, EnvironmentStatus, EventSeverity,
    HealthColor, OptionSetting, ProviderError, ProviderEvent, ProviderResult, RoutingRule,
    RuleAction, SHARED_LB_NAMESPACE, SHARED_LB_OPTION, TargetPool, epoch_millis,
};
use bluegreen_provider::wire::*;
use bluegreen_provider::{
    ArtifactApi, CreateEnvironment, CreateVersion, DescribeEnvironments, EnvironmentApi,
    LoadBalancerApi, UpdateEnvironment,
};

use crate::error::SandboxResult;
use crate::records::*;
use crate::store::SandboxStore;
use crate::tables::*;

/// Tunables for the simulation.
#[derive(Debug, Clone)]
pub struct SandboxProfile {
    /// Describe polls before a transitional status settles.
    pub settle_polls: u32,
    /// Health of a freshly settled environment.
    pub default_health: HealthColor,
    /// Per-version health overrides.
    pub version_health: HashMap<String, HealthColor>,
    /// Versions whose deployment emits an ERROR event and settles Red.
    pub failing_versions: HashSet<String>,
    pub alias_domain: String,
    /// Port of the backend pool created for each environment.
    pub pool_port: u16,
}

impl Default for SandboxProfile {
    fn default() -> Self {
        Self {
            settle_polls: 2,
            default_health: HealthColor::Green,
            version_health: HashMap::new(),
            failing_versions: HashSet::new(),
            alias_domain: "us-west-2.elasticbeanstalk.com".to_string(),
            pool_port: 80,
        }
    }
}

impl SandboxProfile {
    fn settled_health(&self, version: Option<&str>) -> HealthColor {
        match version {
            Some(v) if self.failing_versions.contains(v) => HealthColor::Red,
            Some(v) => self
                .version_health
                .get(v)
                .copied()
                .unwrap_or(self.default_health),
            None => self.default_health,
        }
    }
}

/// What to provision for a new environment.
pub(crate) struct Provision<'a> {
    pub application: &'a str,
    pub name: &'a str,
    pub alias_prefix: Option<&'a str>,
    pub version_label: Option<&'a str>,
    pub load_balancer: Option<&'a str>,
    pub pool_arn: Option<&'a str>,
    pub status: EnvironmentStatus,
    pub health: HealthColor,
    pub protected: bool,
}

#[derive(Clone)]
pub struct Sandbox {
    store: SandboxStore,
    profile: SandboxProfile,
    calls: Arc<Mutex<Vec<ProviderCall>>>,
}

impl Sandbox {
    pub fn open(path: &Path) -> SandboxResult<Self> {
        Ok(Self::with_store(SandboxStore::open(path)?))
    }

    pub fn open_in_memory() -> SandboxResult<Self> {
        Ok(Self::with_store(SandboxStore::open_in_memory()?))
    }

    fn with_store(store: SandboxStore) -> Self {
        Self {
            store,
            profile: SandboxProfile::default(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_profile(mut self, profile: SandboxProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn profile(&self) -> &SandboxProfile {
        &self.profile
    }

    pub(crate) fn store(&self) -> &SandboxStore {
        &self.store
    }

    /// Mutating calls received so far, oldest first.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    fn log_call(&self, call: ProviderCall) {
        debug!(?call, "sandbox call");
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
    }

    // ── Inspection helpers ─────────────────────────────────────────

    /// Current record of an environment without advancing the simulation.
    pub fn environment(&self, environment_id: &str) -> SandboxResult<Option<EnvironmentRecord>> {
        self.store.get(ENVIRONMENTS, environment_id)
    }

    pub fn environments(&self) -> SandboxResult<Vec<EnvironmentRecord>> {
        self.store.list(ENVIRONMENTS)
    }

    pub fn put_environment(&self, record: &EnvironmentRecord) -> SandboxResult<()> {
        self.store.put(ENVIRONMENTS, &record.environment.id, record)
    }

    /// Force an environment's current health (and the health it settles to).
    pub fn set_health(&self, environment_id: &str, health: HealthColor) -> ProviderResult<()> {
        let mut record = self.require(environment_id)?;
        record.environment.health = health;
        record.pending_health = health;
        Ok(self.put_environment(&record)?)
    }

    /// Force an environment's status; it settles after the profile's poll count.
    pub fn set_status(&self, environment_id: &str, status: EnvironmentStatus) -> ProviderResult<()> {
        let mut record = self.require(environment_id)?;
        record.environment.status = status;
        record.pending_polls = self.profile.settle_polls;
        Ok(self.put_environment(&record)?)
    }

    /// Record an event for an environment. Returns its timestamp.
    pub fn push_event(
        &self,
        environment_id: &str,
        severity: EventSeverity,
        message: &str,
    ) -> ProviderResult<u64> {
        let record = self.require(environment_id)?;
        Ok(self.record_event(&record.environment, severity, message)?)
    }

    pub fn rule(&self, rule_arn: &str) -> SandboxResult<Option<RoutingRule>> {
        Ok(self
            .store
            .get::<RuleRecord>(RULES, rule_arn)?
            .map(|record| record.rule))
    }

    pub fn rules(&self) -> SandboxResult<Vec<RuleRecord>> {
        self.store.list(RULES)
    }

    // ── Simulation ─────────────────────────────────────────────────

    fn require(&self, environment_id: &str) -> ProviderResult<EnvironmentRecord> {
        self.environment(environment_id)?
            .ok_or_else(|| ProviderError::NotFound(format!("environment {environment_id}")))
    }

    fn record_event(
        &self,
        env: &Environment,
        severity: EventSeverity,
        message: &str,
    ) -> SandboxResult<u64> {
        let timestamp = self.store.next_timestamp(epoch_millis())?;
        let record = EventRecord {
            environment_id: env.id.clone(),
            event: ProviderEvent {
                timestamp,
                severity,
                environment_name: env.name.clone(),
                message: message.to_string(),
            },
        };
        let key = format!("{}:{timestamp:020}", env.id);
        self.store.put(EVENTS, &key, &record)?;
        Ok(timestamp)
    }

    /// Advance one describe poll.
    fn tick(&self, mut record: EnvironmentRecord) -> SandboxResult<EnvironmentRecord> {
        if !record.is_transitional() {
            return Ok(record);
        }
        record.pending_polls = record.pending_polls.saturating_sub(1);
        if record.pending_polls == 0 {
            let message = match record.environment.status {
                EnvironmentStatus::Terminating => {
                    record.environment.status = EnvironmentStatus::Terminated;
                    record.environment.health = HealthColor::Grey;
                    "terminateEnvironment completed successfully."
                }
                EnvironmentStatus::Launching => {
                    record.environment.status = EnvironmentStatus::Ready;
                    record.environment.health = record.pending_health;
                    "createEnvironment completed successfully."
                }
                _ => {
                    record.environment.status = EnvironmentStatus::Ready;
                    record.environment.health = record.pending_health;
                    "Environment update completed successfully."
                }
            };
            info!(
                environment = %record.environment.name,
                status = %record.environment.status,
                health = %record.environment.health,
                "sandbox environment settled"
            );
            self.record_event(&record.environment, EventSeverity::Info, message)?;
        }
        self.put_environment(&record)?;
        Ok(record)
    }

    fn live_alias_taken(&self, alias: &str) -> SandboxResult<bool> {
        Ok(self
            .environments()?
            .iter()
            .any(|r| r.is_live() && r.environment.alias == alias))
    }

    fn load_balancer_exists(&self, arn: &str) -> SandboxResult<bool> {
        Ok(self
            .store
            .list::<ListenerRecord>(LISTENERS)?
            .iter()
            .any(|l| l.load_balancer_arn == arn))
    }

    /// Create an environment record with its autoscaling group and pool.
    pub(crate) fn provision(&self, provision: Provision<'_>) -> ProviderResult<EnvironmentRecord> {
        let alias = format!(
            "{}.{}",
            provision.alias_prefix.unwrap_or(provision.name),
            self.profile.alias_domain
        );
        if self.live_alias_taken(&alias)? {
            return Err(ProviderError::Conflict(format!("alias {alias} is already in use")));
        }

        let id = format!("e-{:06}", self.store.next_counter("next_id")?);
        let load_balancer = match provision.load_balancer {
            Some(arn) => arn.to_string(),
            None => format!("arn:sandbox:elb:loadbalancer/app/awseb-{id}"),
        };
        let pool_arn = match provision.pool_arn {
            Some(arn) => arn.to_string(),
            None => format!("arn:sandbox:elb:targetgroup/awseb-{id}-{}", self.profile.pool_port),
        };
        let autoscaling_group = format!("awseb-{id}-asg");

        self.store.put(
            POOLS,
            &pool_arn,
            &TargetPool {
                arn: pool_arn.clone(),
                port: self.profile.pool_port,
            },
        )?;
        self.store.put(
            GROUPS,
            &autoscaling_group,
            &AutoScalingGroup {
                name: autoscaling_group.clone(),
                target_pool_arns: vec![pool_arn],
            },
        )?;

        let record = EnvironmentRecord {
            application: provision.application.to_string(),
            environment: Environment {
                id: id.clone(),
                name: provision.name.to_string(),
                alias,
                endpoint_url: Some(format!("awseb-{id}.sandbox.elb.local")),
                status: provision.status,
                health: provision.health,
                version_label: provision.version_label.map(str::to_string),
                created_at: epoch_millis(),
            },
            protected: provision.protected,
            pending_polls: self.profile.settle_polls,
            pending_health: self.profile.settled_health(provision.version_label),
            load_balancer,
            autoscaling_group,
        };
        self.put_environment(&record)?;
        Ok(record)
    }

    fn require_version(&self, application: &str, label: Option<&str>) -> ProviderResult<()> {
        if let Some(label) = label {
            let key = format!("{application}/{label}");
            if self.store.get::<ApplicationVersion>(VERSIONS, &key)?.is_none() {
                return Err(ProviderError::NotFound(format!("application version {label}")));
            }
        }
        Ok(())
    }

    fn record_deploy_events(&self, env: &Environment, operation: &str) -> SandboxResult<()> {
        self.record_event(env, EventSeverity::Info, &format!("{operation} is starting."))?;
        if let Some(label) = &env.version_label
            && self.profile.failing_versions.contains(label)
        {
            self.record_event(env, EventSeverity::Error, "Failed to deploy application.")?;
        }
        Ok(())
    }
}

fn shared_load_balancer(settings: &[OptionSetting]) -> Option<&str> {
    settings
        .iter()
        .find(|s| s.namespace == SHARED_LB_NAMESPACE && s.option_name == SHARED_LB_OPTION)
        .map(|s| s.value.as_str())
}

// ── EnvironmentApi ─────────────────────────────────────────────────

#[async_trait]
impl EnvironmentApi for Sandbox {
    async fn describe_environments(
        &self,
        query: &DescribeEnvironments,
    ) -> ProviderResult<Vec<EnvironmentDescription>> {
        let mut out = Vec::new();
        for record in self.environments()? {
            let env = &record.environment;
            if (!query.application.is_empty() && record.application != query.application)
                || (!query.names.is_empty() && !query.names.contains(&env.name))
                || (!query.ids.is_empty() && !query.ids.contains(&env.id))
            {
                continue;
            }
            let record = self.tick(record)?;
            if record.is_live() || query.include_deleted {
                out.push(EnvironmentDescription::from(&record.environment));
            }
        }
        Ok(out)
    }

    async fn describe_environment_resources(
        &self,
        environment_id: &str,
    ) -> ProviderResult<ResourceDescription> {
        let record = self.require(environment_id)?;
        Ok(ResourceDescription {
            environment_id: Some(record.environment.id),
            load_balancers: Some(vec![record.load_balancer]),
            autoscaling_groups: Some(vec![record.autoscaling_group]),
        })
    }

    async fn create_environment(
        &self,
        request: &CreateEnvironment,
    ) -> ProviderResult<EnvironmentDescription> {
        const OP: &str = "CreateEnvironment";
        if request.platform_branch.is_none() && request.template.is_none() {
            return Err(ProviderError::api(OP, "a platform branch or template is required"));
        }
        let duplicate = self.environments()?.into_iter().any(|r| {
            r.is_live() && r.application == request.application && r.environment.name == request.name
        });
        if duplicate {
            return Err(ProviderError::Conflict(format!(
                "environment {} already exists",
                request.name
            )));
        }
        self.require_version(&request.application, request.version_label.as_deref())?;

        let load_balancer = shared_load_balancer(&request.option_settings);
        if let Some(arn) = load_balancer
            && !self.load_balancer_exists(arn)?
        {
            return Err(ProviderError::NotFound(format!("load balancer {arn}")));
        }

        let record = self.provision(Provision {
            application: &request.application,
            name: &request.name,
            alias_prefix: request.alias_prefix.as_deref(),
            version_label: request.version_label.as_deref(),
            load_balancer,
            pool_arn: None,
            status: EnvironmentStatus::Launching,
            health: HealthColor::Grey,
            protected: false,
        })?;
        self.log_call(ProviderCall::CreateEnvironment {
            name: record.environment.name.clone(),
            alias: record.environment.alias.clone(),
        });
        self.record_deploy_events(&record.environment, "createEnvironment")?;
        Ok(EnvironmentDescription::from(&record.environment))
    }

    async fn update_environment(
        &self,
        request: &UpdateEnvironment,
    ) -> ProviderResult<EnvironmentDescription> {
        let mut record = self.require(&request.environment_id)?;
        if !record.environment.is_ready() {
            return Err(ProviderError::Conflict(format!(
                "environment {} is {}, it must be Ready to update",
                record.environment.name, record.environment.status
            )));
        }
        self.require_version(&record.application, request.version_label.as_deref())?;

        if let Some(label) = &request.version_label {
            record.environment.version_label = Some(label.clone());
        }
        record.environment.status = EnvironmentStatus::Updating;
        record.environment.health = HealthColor::Grey;
        record.pending_polls = self.profile.settle_polls;
        record.pending_health = self
            .profile
            .settled_health(record.environment.version_label.as_deref());
        self.put_environment(&record)?;

        self.log_call(ProviderCall::UpdateEnvironment {
            environment_id: record.environment.id.clone(),
            version_label: request.version_label.clone(),
        });
        self.record_deploy_events(&record.environment, "updateEnvironment")?;
        Ok(EnvironmentDescription::from(&record.environment))
    }

    async fn terminate_environment(
        &self,
        environment_id: &str,
    ) -> ProviderResult<EnvironmentDescription> {
        let mut record = self.require(environment_id)?;
        if record.protected {
            return Err(ProviderError::Conflict(format!(
                "environment {} has termination protection enabled",
                record.environment.name
            )));
        }
        if matches!(
            record.environment.status,
            EnvironmentStatus::Terminating | EnvironmentStatus::Terminated
        ) {
            return Err(ProviderError::Conflict(format!(
                "environment {} is already {}",
                record.environment.name, record.environment.status
            )));
        }
        record.environment.status = EnvironmentStatus::Terminating;
        record.pending_polls = self.profile.settle_polls;
        self.put_environment(&record)?;

        self.log_call(ProviderCall::TerminateEnvironment {
            environment_id: environment_id.to_string(),
        });
        self.record_event(
            &record.environment,
            EventSeverity::Info,
            "terminateEnvironment is starting.",
        )?;
        Ok(EnvironmentDescription::from(&record.environment))
    }

    async fn swap_environment_aliases(
        &self,
        source_id: &str,
        destination_id: &str,
    ) -> ProviderResult<()> {
        let mut source = self.require(source_id)?;
        let mut destination = self.require(destination_id)?;
        for record in [&source, &destination] {
            if !record.environment.is_ready() {
                return Err(ProviderError::Conflict(format!(
                    "environment {} is {}, it must be Ready to swap",
                    record.environment.name, record.environment.status
                )));
            }
        }

        std::mem::swap(&mut source.environment.alias, &mut destination.environment.alias);
        for record in [&mut source, &mut destination] {
            record.environment.status = EnvironmentStatus::Updating;
            record.pending_polls = self.profile.settle_polls;
            record.pending_health = record.environment.health;
            self.put_environment(record)?;
        }

        self.log_call(ProviderCall::SwapAliases {
            source_id: source_id.to_string(),
            destination_id: destination_id.to_string(),
        });
        let message = format!(
            "Completed swapping CNAMEs for environments '{}' and '{}'.",
            source.environment.name, destination.environment.name
        );
        self.record_event(&source.environment, EventSeverity::Info, &message)?;
        self.record_event(&destination.environment, EventSeverity::Info, &message)?;
        Ok(())
    }

    async fn describe_events(
        &self,
        environment_id: &str,
        since: u64,
    ) -> ProviderResult<Vec<EventDescription>> {
        let records: Vec<EventRecord> = self
            .store
            .list_prefix(EVENTS, &format!("{environment_id}:"))?;
        Ok(records
            .into_iter()
            .filter(|r| r.event.timestamp > since)
            .map(|r| EventDescription {
                event_date: Some(r.event.timestamp),
                severity: Some(r.event.severity.label().to_string()),
                environment_name: Some(r.event.environment_name),
                message: Some(r.event.message),
            })
            .collect())
    }

    async fn set_termination_protection(
        &self,
        environment_id: &str,
        protected: bool,
    ) -> ProviderResult<()> {
        let mut record = self.require(environment_id)?;
        record.protected = protected;
        self.put_environment(&record)?;
        self.log_call(ProviderCall::SetTerminationProtection {
            environment_id: environment_id.to_string(),
            protected,
        });
        Ok(())
    }
}

// ── LoadBalancerApi ────────────────────────────────────────────────

#[async_trait]
impl LoadBalancerApi for Sandbox {
    async fn describe_listeners(
        &self,
        load_balancer_arn: &str,
    ) -> ProviderResult<Vec<ListenerDescription>> {
        let listeners: Vec<ListenerRecord> = self.store.list(LISTENERS)?;
        Ok(listeners
            .into_iter()
            .filter(|l| l.load_balancer_arn == load_balancer_arn)
            .map(|l| ListenerDescription {
                listener_arn: Some(l.listener.arn),
                port: Some(l.listener.port),
            })
            .collect())
    }

    async fn describe_rules(&self, listener_arn: &str) -> ProviderResult<Vec<RuleDescription>> {
        let mut rules: Vec<RoutingRule> = self
            .rules()?
            .into_iter()
            .map(|r| r.rule)
            .filter(|r| r.listener_arn == listener_arn)
            .collect();
        rules.sort_by_key(|r| (r.is_default, r.priority.parse::<u32>().unwrap_or(u32::MAX)));
        Ok(rules
            .into_iter()
            .map(|r| RuleDescription {
                rule_arn: Some(r.arn),
                priority: Some(r.priority),
                is_default: Some(r.is_default),
                conditions: Some(r.conditions),
                actions: Some(r.actions),
            })
            .collect())
    }

    async fn describe_tags(&self, resource_arns: &[String]) -> ProviderResult<Vec<TagDescription>> {
        let mut out = Vec::new();
        for arn in resource_arns {
            if let Some(record) = self.store.get::<RuleRecord>(RULES, arn)? {
                out.push(TagDescription {
                    resource_arn: Some(arn.clone()),
                    tags: Some(record.tags),
                });
            }
        }
        Ok(out)
    }

    async fn modify_rule(&self, rule_arn: &str, actions: &[RuleAction]) -> ProviderResult<()> {
        let mut record: RuleRecord = self
            .store
            .get(RULES, rule_arn)?
            .ok_or_else(|| ProviderError::NotFound(format!("rule {rule_arn}")))?;
        for pool in actions.iter().filter_map(RuleAction::forward_target) {
            if self.store.get::<TargetPool>(POOLS, pool)?.is_none() {
                return Err(ProviderError::NotFound(format!("target group {pool}")));
            }
        }
        record.rule.actions = actions.to_vec();
        self.store.put(RULES, rule_arn, &record)?;
        self.log_call(ProviderCall::ModifyRule {
            rule_arn: rule_arn.to_string(),
            actions: actions.to_vec(),
        });
        Ok(())
    }

    async fn describe_target_pools(
        &self,
        pool_arns: &[String],
    ) -> ProviderResult<Vec<TargetPoolDescription>> {
        let mut out = Vec::new();
        for arn in pool_arns {
            let pool: TargetPool = self
                .store
                .get(POOLS, arn)?
                .ok_or_else(|| ProviderError::NotFound(format!("target group {arn}")))?;
            out.push(TargetPoolDescription {
                target_group_arn: Some(pool.arn),
                port: Some(pool.port),
            });
        }
        Ok(out)
    }

    async fn describe_autoscaling_groups(
        &self,
        names: &[String],
    ) -> ProviderResult<Vec<AutoScalingGroupDescription>> {
        let mut out = Vec::new();
        for name in names {
            if let Some(group) = self.store.get::<AutoScalingGroup>(GROUPS, name)? {
                out.push(AutoScalingGroupDescription {
                    auto_scaling_group_name: Some(group.name),
                    target_group_arns: Some(group.target_pool_arns),
                });
            }
        }
        Ok(out)
    }
}

// ── ArtifactApi ────────────────────────────────────────────────────

fn version_description(version: ApplicationVersion) -> VersionDescription {
    VersionDescription {
        application_name: Some(version.application),
        version_label: Some(version.label),
        description: version.description,
        source_bundle: version.source_bundle,
    }
}

#[async_trait]
impl ArtifactApi for Sandbox {
    async fn describe_version(
        &self,
        application: &str,
        label: &str,
    ) -> ProviderResult<Option<VersionDescription>> {
        let version: Option<ApplicationVersion> =
            self.store.get(VERSIONS, &format!("{application}/{label}"))?;
        Ok(version.map(version_description))
    }

    async fn create_version(&self, request: &CreateVersion) -> ProviderResult<VersionDescription> {
        let key = format!("{}/{}", request.application, request.label);
        if self.store.get::<ApplicationVersion>(VERSIONS, &key)?.is_some() {
            return Err(ProviderError::Conflict(format!(
                "application version {} already exists",
                request.label
            )));
        }
        let version = ApplicationVersion {
            application: request.application.clone(),
            label: request.label.clone(),
            description: request.description.clone(),
            source_bundle: request.source_bundle.clone(),
        };
        self.store.put(VERSIONS, &key, &version)?;
        self.log_call(ProviderCall::CreateVersion {
            label: request.label.clone(),
        });
        Ok(version_description(version))
    }
}
