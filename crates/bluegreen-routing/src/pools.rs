//! Backend pool resolution.
//!
//! An environment reaches its pools through two hops: its resources name
//! an autoscaling group, and the group lists the pools it registers
//! instances into.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use bluegreen_core::{Environment, OrchestrationError, OrchestrationResult, TargetPool};
use bluegreen_provider::Clients;

/// An environment with its load balancer and backend pools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentBackend {
    pub environment: Environment,
    pub load_balancer: String,
    pub pools: Vec<TargetPool>,
}

pub async fn resolve_backend(
    clients: &Clients,
    env: &Environment,
) -> OrchestrationResult<EnvironmentBackend> {
    let resources = clients.environment_resources(&env.id).await?;

    let load_balancer = match resources.load_balancers.as_slice() {
        [lb] => lb.clone(),
        other => {
            return Err(OrchestrationError::invariant(format!(
                "environment {} has {} load balancers, expected exactly one",
                env.name,
                other.len()
            )));
        }
    };

    let groups = clients
        .autoscaling_groups(&resources.autoscaling_groups)
        .await?;
    if groups.is_empty() {
        return Err(OrchestrationError::invariant(format!(
            "environment {} has no autoscaling group",
            env.name
        )));
    }

    let pool_arns: BTreeSet<String> = groups
        .iter()
        .flat_map(|g| g.target_pool_arns.iter().cloned())
        .collect();
    if pool_arns.is_empty() {
        return Err(OrchestrationError::invariant(format!(
            "environment {} has no backend pool",
            env.name
        )));
    }
    let pool_arns: Vec<String> = pool_arns.into_iter().collect();
    let pools = clients.target_pools(&pool_arns).await?;

    debug!(
        environment = %env.name,
        load_balancer = %load_balancer,
        pools = pools.len(),
        "resolved backend"
    );
    Ok(EnvironmentBackend {
        environment: env.clone(),
        load_balancer,
        pools,
    })
}

/// The one load balancer every backend shares.
pub fn shared_load_balancer(backends: &[EnvironmentBackend]) -> OrchestrationResult<&str> {
    let distinct: BTreeSet<&str> = backends.iter().map(|b| b.load_balancer.as_str()).collect();
    let mut iter = distinct.iter();
    match (iter.next(), iter.next()) {
        (Some(lb), None) => Ok(*lb),
        (None, _) => Err(OrchestrationError::invariant(
            "no shared load balancer: no environment backends resolved",
        )),
        (Some(_), Some(_)) => Err(OrchestrationError::invariant(format!(
            "environments use {} different load balancers: {}",
            distinct.len(),
            distinct.iter().copied().collect::<Vec<_>>().join(", ")
        ))),
    }
}

/// `(alias prefix, port) → pool arn` for the environments eligible to serve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolIndex {
    targets: BTreeMap<(String, u16), String>,
    aliases: BTreeSet<String>,
}

impl PoolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every backend under its environment's alias prefix.
    ///
    /// Each prefix must be one of `allowed_aliases`.
    pub fn from_backends<'a>(
        backends: impl IntoIterator<Item = &'a EnvironmentBackend>,
        alias_domain: &str,
        allowed_aliases: &[&str],
    ) -> OrchestrationResult<Self> {
        let mut index = Self::new();
        for backend in backends {
            let env = &backend.environment;
            let alias = env
                .alias_prefix(alias_domain)
                .filter(|prefix| allowed_aliases.contains(prefix))
                .ok_or_else(|| {
                    OrchestrationError::invariant(format!(
                        "environment {} has alias {}, expected one of {}",
                        env.name,
                        env.alias,
                        allowed_aliases.join(", ")
                    ))
                })?;
            for pool in &backend.pools {
                index.insert(alias, pool.port, &pool.arn)?;
            }
        }
        Ok(index)
    }

    /// Add a mapping. Two different pools for one `(alias, port)` is an error.
    pub fn insert(&mut self, alias: &str, port: u16, pool_arn: &str) -> OrchestrationResult<()> {
        let key = (alias.to_string(), port);
        if let Some(existing) = self.targets.get(&key) {
            if existing == pool_arn {
                return Ok(());
            }
            return Err(OrchestrationError::invariant(format!(
                "alias {alias} port {port} maps to both {existing} and {pool_arn}"
            )));
        }
        self.targets.insert(key, pool_arn.to_string());
        self.aliases.insert(alias.to_string());
        Ok(())
    }

    pub fn get(&self, alias: &str, port: u16) -> Option<&str> {
        self.targets
            .get(&(alias.to_string(), port))
            .map(String::as_str)
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.contains(alias)
    }
}
