//! Promotion engine.
//!
//! Alias swap exchanges the two environments' public aliases. The shared
//! routing table strategy swaps too when both slots exist and staging is
//! healthy but does not yet hold the production alias, then rewrites the
//! shared listener's tagged rules so each forwards to the pool of the
//! environment now holding its alias.

use serde::Serialize;
use tracing::{info, warn};

use bluegreen_core::config::SlotLayout;
use bluegreen_core::{
    DeploymentStrategy, Environment, OrchestrationError, OrchestrationResult, epoch_millis,
};
use bluegreen_health::{Decision, classify};
use bluegreen_routing::{
    PoolIndex, RewriteStats, apply, load_rules, plan_rewrites, resolve_backend,
    shared_load_balancer,
};

use crate::context::Context;
use crate::resolver::{Resolved, resolve};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    SingleEnvironment,
    CounterpartMissing,
    NoAcceptableCandidates,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Promotion {
    Skipped {
        reason: SkipReason,
    },
    Swapped {
        production: String,
        staging: String,
    },
    Rewritten {
        swapped: bool,
        rewritten: u32,
        forwarded: u32,
        unavailable: u32,
    },
}

/// Promote the freshly deployed slot. Re-reads the environments first.
pub async fn promote(ctx: &Context) -> OrchestrationResult<Promotion> {
    let resolved = resolve(ctx).await?;
    match ctx.strategy() {
        DeploymentStrategy::AliasSwap => match &resolved {
            Resolved::Single(_) => {
                warn!("cannot swap aliases with a single environment");
                Ok(Promotion::Skipped {
                    reason: SkipReason::SingleEnvironment,
                })
            }
            Resolved::Pair {
                production: Some(production),
                staging: Some(staging),
            } => {
                swap_aliases(ctx, production, staging).await?;
                Ok(Promotion::Swapped {
                    production: staging.name.clone(),
                    staging: production.name.clone(),
                })
            }
            Resolved::Pair { .. } => {
                warn!("cannot swap aliases without both environments");
                Ok(Promotion::Skipped {
                    reason: SkipReason::CounterpartMissing,
                })
            }
        },
        DeploymentStrategy::SharedRoutingTable => {
            let swapped = match (resolved.production(), resolved.staging()) {
                (Some(production), Some(staging)) => {
                    swap_before_rewrite(ctx, production, staging).await?
                }
                _ => false,
            };
            match rewrite_routing(ctx).await? {
                Some(stats) => Ok(Promotion::Rewritten {
                    swapped,
                    rewritten: stats.rewritten,
                    forwarded: stats.forwarded,
                    unavailable: stats.unavailable,
                }),
                None => Ok(Promotion::Skipped {
                    reason: SkipReason::NoAcceptableCandidates,
                }),
            }
        }
    }
}

/// Swap `staging` into production once both are Ready and staging is healthy.
async fn swap_aliases(
    ctx: &Context,
    production: &Environment,
    staging: &Environment,
) -> OrchestrationResult<()> {
    let minimum = ctx.minimum_health();
    let (production, staging) = ready_pair(ctx, production, staging).await?;
    if classify(staging.status, staging.health, minimum) != Decision::Acceptable {
        return Err(OrchestrationError::UnhealthyTarget(format!(
            "environment {} is {} (minimum {minimum}), not swapping aliases",
            staging.name, staging.health
        )));
    }
    exchange_aliases(ctx, &production, &staging).await
}

/// Swap ahead of a rules rewrite. Returns whether the aliases moved.
///
/// Staging that already holds the production alias, or sits below the
/// health threshold, keeps its alias and only the rules are rewritten.
async fn swap_before_rewrite(
    ctx: &Context,
    production: &Environment,
    staging: &Environment,
) -> OrchestrationResult<bool> {
    let holds_production = match ctx.layout()? {
        SlotLayout::Pair {
            production_alias, ..
        } => staging.alias == ctx.config.alias_fqdn(production_alias),
        SlotLayout::Single { .. } => false,
    };
    if holds_production {
        info!(
            environment = %staging.name,
            alias = %staging.alias,
            "already holds the production alias, not swapping"
        );
        return Ok(false);
    }

    let minimum = ctx.minimum_health();
    let (production, staging) = ready_pair(ctx, production, staging).await?;
    if classify(staging.status, staging.health, minimum) != Decision::Acceptable {
        warn!(
            environment = %staging.name,
            health = %staging.health,
            %minimum,
            "below health threshold, not swapping aliases"
        );
        return Ok(false);
    }
    exchange_aliases(ctx, &production, &staging).await?;
    Ok(true)
}

/// Fresh copies of both environments, waiting for Ready when either is not.
async fn ready_pair(
    ctx: &Context,
    production: &Environment,
    staging: &Environment,
) -> OrchestrationResult<(Environment, Environment)> {
    if production.is_ready() && staging.is_ready() {
        return Ok((production.clone(), staging.clone()));
    }
    info!("environments not yet Ready, waiting before swap");
    let ready = ctx
        .waiter
        .until_all_ready(&[production, staging], epoch_millis())
        .await?;
    match <[Environment; 2]>::try_from(ready) {
        Ok([production, staging]) => Ok((production, staging)),
        Err(_) => Err(OrchestrationError::invariant(
            "waiting for two environments returned a different count",
        )),
    }
}

async fn exchange_aliases(
    ctx: &Context,
    production: &Environment,
    staging: &Environment,
) -> OrchestrationResult<()> {
    info!(
        from = %staging.name,
        to = %production.name,
        alias = %production.alias,
        "swapping aliases"
    );
    let since = epoch_millis();
    ctx.clients.swap_aliases(&staging.id, &production.id).await?;
    ctx.waiter
        .until_all_ready(&[staging, production], since)
        .await?;
    Ok(())
}

/// Point every managed rule at the pool of the environment holding its alias.
///
/// Only Acceptable environments are candidates. `None` when there are none.
async fn rewrite_routing(ctx: &Context) -> OrchestrationResult<Option<RewriteStats>> {
    let layout = ctx.layout()?;
    let minimum = ctx.minimum_health();
    let envs = ctx
        .clients
        .describe_environments(&ctx.config.application, &layout.names())
        .await?;

    let mut backends = Vec::new();
    for env in &envs {
        if classify(env.status, env.health, minimum) != Decision::Acceptable {
            info!(
                environment = %env.name,
                status = %env.status,
                health = %env.health,
                "skipping environment for routing"
            );
            continue;
        }
        backends.push(resolve_backend(&ctx.clients, env).await?);
    }
    if backends.is_empty() {
        warn!("no acceptable environments to route to, leaving rules unchanged");
        return Ok(None);
    }

    let load_balancer = shared_load_balancer(&backends)?;
    let aliases = layout.aliases();
    let index = PoolIndex::from_backends(&backends, &ctx.alias_domain(), &aliases)?;
    let rules = load_rules(&ctx.clients, load_balancer, &ctx.config.routing).await?;
    let rewrites = plan_rewrites(&rules, &index, &aliases)?;
    if rewrites.is_empty() {
        info!(%load_balancer, "routing rules already up to date");
    }
    let stats = apply(&ctx.clients, &rewrites).await?;
    info!(
        %load_balancer,
        rewritten = stats.rewritten,
        forwarded = stats.forwarded,
        unavailable = stats.unavailable,
        "routing rules updated"
    );
    Ok(Some(stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    use bluegreen_core::{HealthColor, RuleAction};
    use bluegreen_sandbox::{ProviderCall, SandboxSeed};

    use crate::testing::*;

    #[tokio::test(start_paused = true)]
    async fn swap_moves_production_alias() {
        let sandbox = sandbox();
        let report = sandbox
            .seed(&SandboxSeed {
                load_balancers: Vec::new(),
                environments: vec![
                    seed_env("shop-blue", "shop", HealthColor::Green),
                    seed_env("shop-green", "shop-staging", HealthColor::Green),
                ],
            })
            .unwrap();
        let ctx = context(config(DeploymentStrategy::AliasSwap), &sandbox);

        let promotion = promote(&ctx).await.unwrap();
        assert_eq!(
            promotion,
            Promotion::Swapped {
                production: "shop-green".to_string(),
                staging: "shop-blue".to_string()
            }
        );
        let green = sandbox
            .environment(&report.environment_ids["shop-green"])
            .unwrap()
            .unwrap();
        assert_eq!(green.environment.alias, format!("shop.{DOMAIN}"));
    }

    #[tokio::test(start_paused = true)]
    async fn unhealthy_staging_is_never_swapped() {
        let sandbox = sandbox();
        sandbox
            .seed(&SandboxSeed {
                load_balancers: Vec::new(),
                environments: vec![
                    seed_env("shop-blue", "shop", HealthColor::Green),
                    seed_env("shop-green", "shop-staging", HealthColor::Yellow),
                ],
            })
            .unwrap();
        let ctx = context(config(DeploymentStrategy::AliasSwap), &sandbox);

        let err = promote(&ctx).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::UnhealthyTarget(_)));
        assert!(sandbox.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn lone_production_is_not_swapped() {
        let sandbox = sandbox();
        sandbox
            .seed(&SandboxSeed {
                load_balancers: Vec::new(),
                environments: vec![seed_env("shop-blue", "shop", HealthColor::Green)],
            })
            .unwrap();
        let ctx = context(config(DeploymentStrategy::AliasSwap), &sandbox);

        assert_eq!(
            promote(&ctx).await.unwrap(),
            Promotion::Skipped {
                reason: SkipReason::CounterpartMissing
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shared_staging_already_holding_production_alias_keeps_it() {
        let sandbox = sandbox();
        let report = sandbox
            .seed(&shared_seed(
                [
                    ("shop-blue", "shop-staging", "tg-blue"),
                    ("shop-green", "shop", "tg-green"),
                ],
                [
                    ("rule-prod", "shop", "tg-blue"),
                    ("rule-stage", "shop-staging", "tg-green"),
                ],
            ))
            .unwrap();
        let ctx = context(config(DeploymentStrategy::SharedRoutingTable), &sandbox);

        assert_eq!(
            promote(&ctx).await.unwrap(),
            Promotion::Rewritten {
                swapped: false,
                rewritten: 2,
                forwarded: 2,
                unavailable: 0
            }
        );
        assert!(
            !sandbox
                .calls()
                .iter()
                .any(|c| matches!(c, ProviderCall::SwapAliases { .. }))
        );
        let green = sandbox
            .environment(&report.environment_ids["shop-green"])
            .unwrap()
            .unwrap();
        assert_eq!(green.environment.alias, format!("shop.{DOMAIN}"));
        assert_eq!(
            sandbox.rule("rule-prod").unwrap().unwrap().actions,
            vec![RuleAction::forward("tg-green")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unhealthy_shared_staging_is_routed_around() {
        let sandbox = sandbox();
        let report = sandbox
            .seed(&shared_seed(
                [
                    ("shop-blue", "shop", "tg-blue"),
                    ("shop-green", "shop-staging", "tg-green"),
                ],
                [
                    ("rule-prod", "shop", "tg-blue"),
                    ("rule-stage", "shop-staging", "tg-green"),
                ],
            ))
            .unwrap();
        sandbox
            .set_health(&report.environment_ids["shop-green"], HealthColor::Yellow)
            .unwrap();
        let ctx = context(config(DeploymentStrategy::SharedRoutingTable), &sandbox);

        assert_eq!(
            promote(&ctx).await.unwrap(),
            Promotion::Rewritten {
                swapped: false,
                rewritten: 1,
                forwarded: 0,
                unavailable: 1
            }
        );
        assert_eq!(
            sandbox.rule("rule-prod").unwrap().unwrap().actions,
            vec![RuleAction::forward("tg-blue")]
        );
        assert_eq!(
            sandbox.rule("rule-stage").unwrap().unwrap().actions,
            vec![RuleAction::unavailable()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn single_slot_routing_marks_missing_alias_unavailable() {
        let sandbox = sandbox();
        sandbox
            .seed(&shared_seed(
                [("tool-env", "tool", "tg-tool")],
                [("rule-tool", "tool", "tg-old"), ("rule-other", "other", "tg-x")],
            ))
            .unwrap();
        let mut config = config(DeploymentStrategy::SharedRoutingTable);
        config.environments = single_environments("tool-env", "tool");
        let ctx = context(config, &sandbox);

        let promotion = promote(&ctx).await.unwrap();
        assert_eq!(
            promotion,
            Promotion::Rewritten {
                swapped: false,
                rewritten: 1,
                forwarded: 1,
                unavailable: 0
            }
        );
        assert_eq!(
            sandbox.rule("rule-tool").unwrap().unwrap().actions,
            vec![RuleAction::forward("tg-tool")]
        );
        assert_eq!(
            sandbox.rule("rule-other").unwrap().unwrap().actions,
            vec![RuleAction::forward("tg-x")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn no_acceptable_candidates_is_a_warning() {
        let sandbox = sandbox();
        let report = sandbox
            .seed(&shared_seed(
                [("tool-env", "tool", "tg-tool")],
                [("rule-tool", "tool", "tg-tool")],
            ))
            .unwrap();
        sandbox
            .set_health(&report.environment_ids["tool-env"], HealthColor::Red)
            .unwrap();
        let mut config = config(DeploymentStrategy::SharedRoutingTable);
        config.environments = single_environments("tool-env", "tool");
        let ctx = context(config, &sandbox);

        assert_eq!(
            promote(&ctx).await.unwrap(),
            Promotion::Skipped {
                reason: SkipReason::NoAcceptableCandidates
            }
        );
        assert!(
            !sandbox
                .calls()
                .iter()
                .any(|c| matches!(c, ProviderCall::ModifyRule { .. }))
        );
    }
}
