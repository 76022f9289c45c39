//! Sandbox fixtures shared by the unit tests.

use std::sync::Arc;

use bluegreen_core::config::EnvironmentsConfig;
use bluegreen_core::{DeployConfig, DeploymentStrategy, HealthColor, RuleAction};
use bluegreen_provider::Clients;
use bluegreen_sandbox::{
    Sandbox, SandboxSeed, SeedEnvironment, SeedListener, SeedLoadBalancer, SeedRule,
};

use crate::context::Context;

pub const DOMAIN: &str = "us-west-2.elasticbeanstalk.com";
pub const SHARED_LB: &str = "arn:sandbox:elb:loadbalancer/app/shared-alb";

pub fn config(strategy: DeploymentStrategy) -> DeployConfig {
    let mut config = DeployConfig::scaffold("shop", strategy);
    config.version.label = None;
    config
}

pub fn single_environments(name: &str, alias: &str) -> EnvironmentsConfig {
    EnvironmentsConfig {
        single: Some(name.to_string()),
        single_alias: Some(alias.to_string()),
        ..Default::default()
    }
}

pub fn sandbox() -> Arc<Sandbox> {
    Arc::new(Sandbox::open_in_memory().unwrap())
}

pub fn context(config: DeployConfig, sandbox: &Arc<Sandbox>) -> Context {
    Context::new(config, Clients::from_platform(sandbox.clone())).unwrap()
}

pub fn seed_env(name: &str, alias: &str, health: HealthColor) -> SeedEnvironment {
    SeedEnvironment {
        application: "shop".to_string(),
        name: name.to_string(),
        alias_prefix: alias.to_string(),
        version_label: None,
        status: bluegreen_core::EnvironmentStatus::Ready,
        health,
        load_balancer: None,
        pool_arn: None,
        protected: false,
    }
}

/// Environments `(name, alias, pool)` on one shared load balancer, with
/// tagged rules `(arn, alias, forwarded pool)` on its port 80 listener.
pub fn shared_seed<const E: usize, const R: usize>(
    envs: [(&str, &str, &str); E],
    rules: [(&str, &str, &str); R],
) -> SandboxSeed {
    SandboxSeed {
        load_balancers: vec![SeedLoadBalancer {
            arn: SHARED_LB.to_string(),
            listeners: vec![SeedListener {
                arn: "listener-80".to_string(),
                port: 80,
                rules: rules
                    .iter()
                    .enumerate()
                    .map(|(i, (arn, alias, pool))| SeedRule {
                        arn: arn.to_string(),
                        priority: (i + 1).to_string(),
                        is_default: false,
                        conditions: Vec::new(),
                        actions: vec![RuleAction::forward(pool)],
                        tags: [("bluegreen:target_alias".to_string(), alias.to_string())]
                            .into_iter()
                            .collect(),
                    })
                    .collect(),
            }],
        }],
        environments: envs
            .iter()
            .map(|(name, alias, pool)| SeedEnvironment {
                load_balancer: Some(SHARED_LB.to_string()),
                pool_arn: Some(pool.to_string()),
                ..seed_env(name, alias, HealthColor::Green)
            })
            .collect(),
    }
}
