//! Environment resolver.
//!
//! Finds the configured environments and decides which one is production.
//! With [`DeploymentStrategy::AliasSwap`] the public alias decides; with
//! [`DeploymentStrategy::SharedRoutingTable`] the shared listener's tagged
//! rules decide, falling back to the alias for an environment no managed
//! rule forwards to yet (a freshly created staging slot).

use tracing::{debug, info, warn};

use bluegreen_core::config::SlotLayout;
use bluegreen_core::{
    DeploymentStrategy, Environment, OrchestrationError, OrchestrationResult, Role,
};
use bluegreen_routing::{aliases_forwarding_to, load_rules, resolve_backend, shared_load_balancer};

use crate::context::Context;

/// Load balancers the platform creates per environment. They cannot be shared.
const DEDICATED_LB_MARKER: &str = ":loadbalancer/app/awseb";

/// The environments of this run, by role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Pair {
        production: Option<Environment>,
        staging: Option<Environment>,
    },
    Single(Option<Environment>),
}

impl Resolved {
    /// The slot this run deploys to.
    ///
    /// For a pair this is staging, but only while a production environment
    /// exists; without production the target is absent and gets created.
    pub fn target(&self) -> Option<&Environment> {
        match self {
            Resolved::Pair {
                production: Some(_),
                staging,
            } => staging.as_ref(),
            Resolved::Pair { production: None, .. } => None,
            Resolved::Single(env) => env.as_ref(),
        }
    }

    pub fn production(&self) -> Option<&Environment> {
        match self {
            Resolved::Pair { production, .. } => production.as_ref(),
            Resolved::Single(_) => None,
        }
    }

    pub fn staging(&self) -> Option<&Environment> {
        match self {
            Resolved::Pair { staging, .. } => staging.as_ref(),
            Resolved::Single(_) => None,
        }
    }
}

pub async fn resolve(ctx: &Context) -> OrchestrationResult<Resolved> {
    let layout = ctx.layout()?;
    let envs = ctx
        .clients
        .describe_environments(&ctx.config.application, &layout.names())
        .await?;

    let (production_alias, staging_alias) = match layout {
        SlotLayout::Single { name, .. } => {
            let env = envs.into_iter().find(|e| e.name == name);
            debug!(environment = %name, found = env.is_some(), "resolved single environment");
            return Ok(Resolved::Single(env));
        }
        SlotLayout::Pair {
            production_alias,
            staging_alias,
            ..
        } => (production_alias, staging_alias),
    };

    if envs.is_empty() {
        info!(application = %ctx.config.application, "no environments exist yet");
        return Ok(Resolved::Pair {
            production: None,
            staging: None,
        });
    }

    let roles = match ctx.strategy() {
        DeploymentStrategy::AliasSwap => envs
            .iter()
            .map(|env| role_by_alias(ctx, env, production_alias, staging_alias))
            .collect::<OrchestrationResult<Vec<_>>>()?,
        DeploymentStrategy::SharedRoutingTable => {
            roles_by_routing(ctx, &envs, production_alias, staging_alias).await?
        }
    };

    let resolved = assign(envs.into_iter().zip(roles))?;
    info!(
        production = resolved.production().map(|e| e.name.as_str()).unwrap_or("-"),
        staging = resolved.staging().map(|e| e.name.as_str()).unwrap_or("-"),
        strategy = %ctx.strategy(),
        "resolved environments"
    );
    Ok(resolved)
}

fn role_by_alias(
    ctx: &Context,
    env: &Environment,
    production_alias: &str,
    staging_alias: &str,
) -> OrchestrationResult<Role> {
    if env.alias == ctx.config.alias_fqdn(production_alias) {
        Ok(Role::Production)
    } else if env.alias == ctx.config.alias_fqdn(staging_alias) {
        Ok(Role::Staging)
    } else {
        Err(OrchestrationError::configuration(format!(
            "environment {} has alias {}, expected {} or {}",
            env.name,
            env.alias,
            ctx.config.alias_fqdn(production_alias),
            ctx.config.alias_fqdn(staging_alias)
        )))
    }
}

async fn roles_by_routing(
    ctx: &Context,
    envs: &[Environment],
    production_alias: &str,
    staging_alias: &str,
) -> OrchestrationResult<Vec<Role>> {
    let mut backends = Vec::with_capacity(envs.len());
    for env in envs {
        backends.push(resolve_backend(&ctx.clients, env).await?);
    }
    let load_balancer = shared_load_balancer(&backends)?;
    if load_balancer.contains(DEDICATED_LB_MARKER) {
        return Err(OrchestrationError::invariant(format!(
            "load balancer {load_balancer} is dedicated to one environment and cannot be shared"
        )));
    }
    let rules = load_rules(&ctx.clients, load_balancer, &ctx.config.routing).await?;
    let domain = ctx.alias_domain();

    let mut roles = Vec::with_capacity(backends.len());
    for backend in &backends {
        let env = &backend.environment;
        let forwarding: Vec<String> = aliases_forwarding_to(&rules, &backend.pools)
            .into_iter()
            .filter(|alias| alias == production_alias || alias == staging_alias)
            .collect();

        let alias = match forwarding.as_slice() {
            [alias] => alias.as_str(),
            [] => {
                let alias = env
                    .alias_prefix(&domain)
                    .filter(|prefix| *prefix == production_alias || *prefix == staging_alias)
                    .ok_or_else(|| {
                        OrchestrationError::invariant(format!(
                            "no routing rule forwards to environment {} and its alias {} is not managed",
                            env.name, env.alias
                        ))
                    })?;
                warn!(
                    environment = %env.name,
                    %alias,
                    "no routing rule forwards to environment, classifying by alias"
                );
                alias
            }
            _ => {
                return Err(OrchestrationError::invariant(format!(
                    "routing rules for both {production_alias} and {staging_alias} forward to environment {}",
                    env.name
                )));
            }
        };
        roles.push(if alias == production_alias {
            Role::Production
        } else {
            Role::Staging
        });
    }
    Ok(roles)
}

fn assign(classified: impl IntoIterator<Item = (Environment, Role)>) -> OrchestrationResult<Resolved> {
    let mut production: Option<Environment> = None;
    let mut staging: Option<Environment> = None;

    for (env, role) in classified {
        let (slot, label) = match role {
            Role::Production => (&mut production, "production"),
            Role::Staging | Role::Single => (&mut staging, "staging"),
        };
        if let Some(existing) = slot.as_ref() {
            return Err(OrchestrationError::invariant(format!(
                "environments {} and {} both resolve to {label}",
                existing.name, env.name
            )));
        }
        *slot = Some(env);
    }
    Ok(Resolved::Pair {
        production,
        staging,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use bluegreen_core::HealthColor;
    use bluegreen_sandbox::SandboxSeed;

    use crate::testing::*;

    #[tokio::test]
    async fn no_environments_resolve_empty() {
        let sandbox = sandbox();
        let ctx = context(config(DeploymentStrategy::AliasSwap), &sandbox);

        let resolved = resolve(&ctx).await.unwrap();
        assert_eq!(
            resolved,
            Resolved::Pair {
                production: None,
                staging: None
            }
        );
        assert!(resolved.target().is_none());
    }

    #[tokio::test]
    async fn aliases_decide_roles() {
        let sandbox = sandbox();
        sandbox
            .seed(&SandboxSeed {
                load_balancers: Vec::new(),
                environments: vec![
                    seed_env("shop-blue", "shop", HealthColor::Green),
                    seed_env("shop-green", "shop-staging", HealthColor::Green),
                ],
            })
            .unwrap();
        let ctx = context(config(DeploymentStrategy::AliasSwap), &sandbox);

        let resolved = resolve(&ctx).await.unwrap();
        assert_eq!(resolved.production().unwrap().name, "shop-blue");
        assert_eq!(resolved.staging().unwrap().name, "shop-green");
        assert_eq!(resolved.target().unwrap().name, "shop-green");
    }

    #[tokio::test]
    async fn unexpected_alias_is_configuration_error() {
        let sandbox = sandbox();
        sandbox
            .seed(&SandboxSeed {
                load_balancers: Vec::new(),
                environments: vec![seed_env("shop-blue", "somebody-else", HealthColor::Green)],
            })
            .unwrap();
        let ctx = context(config(DeploymentStrategy::AliasSwap), &sandbox);

        let err = resolve(&ctx).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Configuration(_)));
    }

    #[tokio::test]
    async fn staging_without_production_is_not_a_target() {
        let sandbox = sandbox();
        sandbox
            .seed(&SandboxSeed {
                load_balancers: Vec::new(),
                environments: vec![seed_env("shop-green", "shop-staging", HealthColor::Green)],
            })
            .unwrap();
        let ctx = context(config(DeploymentStrategy::AliasSwap), &sandbox);

        let resolved = resolve(&ctx).await.unwrap();
        assert!(resolved.production().is_none());
        assert!(resolved.target().is_none());
    }

    #[tokio::test]
    async fn routing_rules_decide_roles() {
        let sandbox = sandbox();
        // Aliases say blue is staging; the rules say it serves production.
        sandbox
            .seed(&shared_seed(
                [("shop-blue", "shop-staging", "tg-blue"), ("shop-green", "shop", "tg-green")],
                [("rule-prod", "shop", "tg-blue"), ("rule-stage", "shop-staging", "tg-green")],
            ))
            .unwrap();
        let ctx = context(config(DeploymentStrategy::SharedRoutingTable), &sandbox);

        let resolved = resolve(&ctx).await.unwrap();
        assert_eq!(resolved.production().unwrap().name, "shop-blue");
        assert_eq!(resolved.staging().unwrap().name, "shop-green");
    }

    #[tokio::test]
    async fn unrouted_environment_falls_back_to_alias() {
        let sandbox = sandbox();
        sandbox
            .seed(&shared_seed(
                [("shop-blue", "shop", "tg-blue"), ("shop-green", "shop-staging", "tg-green")],
                [("rule-prod", "shop", "tg-blue"), ("rule-stage", "shop-staging", "tg-missing")],
            ))
            .unwrap();
        let ctx = context(config(DeploymentStrategy::SharedRoutingTable), &sandbox);

        let resolved = resolve(&ctx).await.unwrap();
        assert_eq!(resolved.production().unwrap().name, "shop-blue");
        assert_eq!(resolved.staging().unwrap().name, "shop-green");
    }

    #[tokio::test]
    async fn both_rules_forwarding_to_one_environment_is_invariant_violation() {
        let sandbox = sandbox();
        sandbox
            .seed(&shared_seed(
                [("shop-blue", "shop", "tg-blue"), ("shop-green", "shop-staging", "tg-green")],
                [("rule-prod", "shop", "tg-blue"), ("rule-stage", "shop-staging", "tg-blue")],
            ))
            .unwrap();
        let ctx = context(config(DeploymentStrategy::SharedRoutingTable), &sandbox);

        let err = resolve(&ctx).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn separate_load_balancers_are_invariant_violation() {
        let sandbox = sandbox();
        sandbox
            .seed(&SandboxSeed {
                load_balancers: Vec::new(),
                environments: vec![
                    seed_env("shop-blue", "shop", HealthColor::Green),
                    seed_env("shop-green", "shop-staging", HealthColor::Green),
                ],
            })
            .unwrap();
        let ctx = context(config(DeploymentStrategy::SharedRoutingTable), &sandbox);

        let err = resolve(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("different load balancers"));
    }

    #[tokio::test]
    async fn dedicated_load_balancer_cannot_be_shared() {
        let sandbox = sandbox();
        sandbox
            .seed(&SandboxSeed {
                load_balancers: Vec::new(),
                environments: vec![seed_env("shop-blue", "shop", HealthColor::Green)],
            })
            .unwrap();
        let ctx = context(config(DeploymentStrategy::SharedRoutingTable), &sandbox);

        let err = resolve(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("cannot be shared"));
    }

    #[tokio::test]
    async fn single_layout_finds_named_environment() {
        let sandbox = sandbox();
        sandbox
            .seed(&SandboxSeed {
                load_balancers: Vec::new(),
                environments: vec![seed_env("tool-env", "tool", HealthColor::Green)],
            })
            .unwrap();
        let mut config = config(DeploymentStrategy::AliasSwap);
        config.environments = single_environments("tool-env", "tool");
        let ctx = context(config, &sandbox);

        let resolved = resolve(&ctx).await.unwrap();
        assert_eq!(resolved.target().unwrap().name, "tool-env");
        assert!(resolved.production().is_none());
    }

    #[test]
    fn duplicate_roles_are_rejected() {
        let env = |name: &str| Environment {
            id: format!("e-{name}"),
            name: name.to_string(),
            alias: format!("shop.{DOMAIN}"),
            endpoint_url: None,
            status: bluegreen_core::EnvironmentStatus::Ready,
            health: HealthColor::Green,
            version_label: None,
            created_at: 0,
        };
        let err = assign([(env("a"), Role::Production), (env("b"), Role::Production)]).unwrap_err();
        assert!(err.to_string().contains("both resolve to production"));
    }
}
