//! JSON seed files describing pre-existing sandbox resources.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use bluegreen_core::{
    EnvironmentStatus, HealthColor, Listener, ProviderResult, RoutingRule, RuleAction,
    RuleCondition, Tag,
};

use crate::platform::{Provision, Sandbox};
use crate::records::{ListenerRecord, RuleRecord};
use crate::tables::{LISTENERS, RULES};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxSeed {
    #[serde(default)]
    pub load_balancers: Vec<SeedLoadBalancer>,
    #[serde(default)]
    pub environments: Vec<SeedEnvironment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedLoadBalancer {
    pub arn: String,
    #[serde(default)]
    pub listeners: Vec<SeedListener>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedListener {
    pub arn: String,
    pub port: u16,
    #[serde(default)]
    pub rules: Vec<SeedRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRule {
    pub arn: String,
    pub priority: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    #[serde(default)]
    pub actions: Vec<RuleAction>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// An environment that already exists when the run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEnvironment {
    pub application: String,
    pub name: String,
    pub alias_prefix: String,
    pub version_label: Option<String>,
    #[serde(default = "default_status")]
    pub status: EnvironmentStatus,
    #[serde(default = "default_health")]
    pub health: HealthColor,
    /// Attach to this shared load balancer instead of a dedicated one.
    pub load_balancer: Option<String>,
    /// Fixed arn for the environment's backend pool.
    pub pool_arn: Option<String>,
    #[serde(default)]
    pub protected: bool,
}

fn default_status() -> EnvironmentStatus {
    EnvironmentStatus::Ready
}

fn default_health() -> HealthColor {
    HealthColor::Green
}

/// Environment ids assigned while seeding, by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub environment_ids: BTreeMap<String, String>,
}

impl SandboxSeed {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Sandbox {
    /// Load balancers first, so seeded environments can attach to them.
    pub fn seed(&self, seed: &SandboxSeed) -> ProviderResult<SeedReport> {
        for lb in &seed.load_balancers {
            for listener in &lb.listeners {
                self.store().put(
                    LISTENERS,
                    &listener.arn,
                    &ListenerRecord {
                        load_balancer_arn: lb.arn.clone(),
                        listener: Listener {
                            arn: listener.arn.clone(),
                            port: listener.port,
                        },
                    },
                )?;
                for rule in &listener.rules {
                    let record = RuleRecord {
                        rule: RoutingRule {
                            arn: rule.arn.clone(),
                            listener_arn: listener.arn.clone(),
                            priority: rule.priority.clone(),
                            is_default: rule.is_default,
                            conditions: rule.conditions.clone(),
                            actions: rule.actions.clone(),
                        },
                        tags: rule
                            .tags
                            .iter()
                            .map(|(key, value)| Tag {
                                key: key.clone(),
                                value: value.clone(),
                            })
                            .collect(),
                    };
                    self.store().put(RULES, &rule.arn, &record)?;
                }
            }
            info!(load_balancer = %lb.arn, listeners = lb.listeners.len(), "seeded load balancer");
        }

        let mut report = SeedReport::default();
        for env in &seed.environments {
            let mut record = self.provision(Provision {
                application: &env.application,
                name: &env.name,
                alias_prefix: Some(&env.alias_prefix),
                version_label: env.version_label.as_deref(),
                load_balancer: env.load_balancer.as_deref(),
                pool_arn: env.pool_arn.as_deref(),
                status: env.status,
                health: env.health,
                protected: env.protected,
            })?;
            // Seeded environments keep their declared health once settled.
            record.pending_health = env.health;
            self.put_environment(&record)?;
            info!(environment = %env.name, id = %record.environment.id, "seeded environment");
            report
                .environment_ids
                .insert(env.name.clone(), record.environment.id);
        }
        Ok(report)
    }
}
