//! Target reconciliation loop.
//!
//! Drives the target slot until it is either absent or Ready and healthy
//! enough to deploy onto:
//!
//! ```text
//!   Absent ──────────────────────────────────────────────► return None
//!   Terminating ─(wait)─► Terminated ─► Absent
//!   Launching/Updating ─(wait)─► Ready | Terminating
//!   Ready, below threshold ─(detach, terminate, wait)─► Absent
//!   Ready, acceptable ───────────────────────────────────► return env
//! ```
//!
//! Every step is recorded as a [`Transition`]. The loop is bounded by the
//! provider's own state changes and each wait's maximum duration.

use serde::Serialize;
use tracing::{debug, info, warn};

use bluegreen_core::{
    DeploymentStrategy, Environment, EnvironmentStatus, HealthColor, OrchestrationError,
    OrchestrationResult, epoch_millis,
};
use bluegreen_health::{AwaitTarget, Decision, classify};
use bluegreen_routing::{load_rules, plan_detach, resolve_backend};

use crate::context::Context;
use crate::flow::{ExitReason, Flow};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum Transition {
    Absent,
    AwaitReady { environment: String },
    AwaitTermination { environment: String },
    DetachRouting { environment: String, rules: u32 },
    Terminate { environment: String, health: HealthColor },
    Accepted { environment: String },
}

pub struct Reconciler<'a> {
    ctx: &'a Context,
    transitions: Vec<Transition>,
}

impl<'a> Reconciler<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self {
            ctx,
            transitions: Vec::new(),
        }
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn into_transitions(self) -> Vec<Transition> {
        self.transitions
    }

    fn record(&mut self, transition: Transition) {
        debug!(?transition, "reconcile transition");
        self.transitions.push(transition);
    }

    /// Bring `target` to a deployable state.
    ///
    /// Returns the environment when it is Ready and at or above the health
    /// threshold, or `None` once the slot is empty.
    pub async fn reconcile(
        &mut self,
        target: Option<Environment>,
    ) -> OrchestrationResult<Option<Environment>> {
        let ctx = self.ctx;
        let minimum = ctx.minimum_health();
        let wait = &ctx.config.wait;
        let mut current = target;

        loop {
            let Some(env) = current.take() else {
                self.record(Transition::Absent);
                return Ok(None);
            };

            match classify(env.status, env.health, minimum) {
                Decision::AwaitStatus(AwaitTarget::Terminated) => {
                    if env.status == EnvironmentStatus::Terminated {
                        continue;
                    }
                    if !wait.termination {
                        return Err(OrchestrationError::Timeout(format!(
                            "environment {} is terminating, not waiting",
                            env.name
                        )));
                    }
                    info!(environment = %env.name, "waiting for environment to terminate");
                    self.record(Transition::AwaitTermination {
                        environment: env.name.clone(),
                    });
                    ctx.waiter.until_terminated(&env, epoch_millis()).await?;
                }
                Decision::AwaitStatus(AwaitTarget::Ready) => {
                    if !wait.readiness {
                        return Err(OrchestrationError::Timeout(format!(
                            "environment {} is {} and not ready, not waiting",
                            env.name, env.status
                        )));
                    }
                    info!(environment = %env.name, status = %env.status, "waiting for environment to become Ready");
                    self.record(Transition::AwaitReady {
                        environment: env.name.clone(),
                    });
                    current = ctx.waiter.until_ready(&env, epoch_millis()).await?;
                }
                Decision::BelowThreshold => {
                    if !ctx.config.features.terminate_unhealthy_environment {
                        return Err(OrchestrationError::UnhealthyTarget(format!(
                            "environment {} is {} (minimum {minimum}) and termination is disabled",
                            env.name, env.health
                        )));
                    }
                    warn!(
                        environment = %env.name,
                        health = %env.health,
                        %minimum,
                        "environment is below the health threshold, replacing it"
                    );
                    self.terminate(&env).await?;
                }
                Decision::Acceptable => {
                    info!(environment = %env.name, health = %env.health, "target environment is ready");
                    self.record(Transition::Accepted {
                        environment: env.name.clone(),
                    });
                    return Ok(Some(env));
                }
            }
        }
    }

    /// Wait for a deployment started at `since` to finish.
    ///
    /// Health is not judged here; promotion checks it.
    pub async fn await_deployment(&mut self, env: &Environment, since: u64) -> OrchestrationResult<Flow> {
        if !self.ctx.config.wait.deployment {
            info!(environment = %env.name, "not waiting for deployment to finish");
            return Ok(Flow::exit(ExitReason::NotWaiting, Some(env.clone())));
        }

        self.record(Transition::AwaitReady {
            environment: env.name.clone(),
        });
        match self.ctx.waiter.until_ready(env, since).await? {
            Some(current) if current.is_ready() => {
                info!(
                    environment = %current.name,
                    health = %current.health,
                    version = current.version_label.as_deref().unwrap_or("-"),
                    "deployment finished"
                );
                Ok(Flow::Continue(current))
            }
            Some(current) => Err(OrchestrationError::UnhealthyTarget(format!(
                "environment {} is {} after deployment",
                current.name, current.status
            ))),
            None => Err(OrchestrationError::UnhealthyTarget(format!(
                "environment {} disappeared during deployment",
                env.name
            ))),
        }
    }

    async fn terminate(&mut self, env: &Environment) -> OrchestrationResult<()> {
        let ctx = self.ctx;
        if ctx.config.features.disable_termination_protection {
            info!(environment = %env.name, "disabling termination protection");
            ctx.clients.set_termination_protection(&env.id, false).await?;
        }
        if ctx.strategy() == DeploymentStrategy::SharedRoutingTable {
            self.detach_routing(env).await?;
        }

        let since = epoch_millis();
        ctx.clients.terminate_environment(&env.id).await?;
        self.record(Transition::Terminate {
            environment: env.name.clone(),
            health: env.health,
        });

        self.record(Transition::AwaitTermination {
            environment: env.name.clone(),
        });
        ctx.waiter.until_terminated(env, since).await
    }

    /// Point every managed rule forwarding to `env` at the fixed
    /// "not available" response.
    async fn detach_routing(&mut self, env: &Environment) -> OrchestrationResult<()> {
        let ctx = self.ctx;
        let backend = resolve_backend(&ctx.clients, env).await?;
        let rules = load_rules(&ctx.clients, &backend.load_balancer, &ctx.config.routing).await?;
        let rewrites = plan_detach(&rules, &backend.pools);
        let stats = bluegreen_routing::apply(&ctx.clients, &rewrites).await?;
        info!(environment = %env.name, rules = stats.rewritten, "detached routing");
        self.record(Transition::DetachRouting {
            environment: env.name.clone(),
            rules: stats.rewritten,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bluegreen_core::RuleAction;
    use bluegreen_sandbox::{ProviderCall, SandboxSeed};

    use crate::testing::*;

    fn seeded(health: HealthColor) -> (std::sync::Arc<bluegreen_sandbox::Sandbox>, Environment) {
        let sandbox = sandbox();
        let report = sandbox
            .seed(&SandboxSeed {
                load_balancers: Vec::new(),
                environments: vec![seed_env("shop-green", "shop-staging", health)],
            })
            .unwrap();
        let id = &report.environment_ids["shop-green"];
        let env = sandbox.environment(id).unwrap().unwrap().environment;
        (sandbox, env)
    }

    #[tokio::test(start_paused = true)]
    async fn acceptable_target_is_returned_untouched() {
        let (sandbox, env) = seeded(HealthColor::Green);
        let ctx = context(config(DeploymentStrategy::AliasSwap), &sandbox);
        let mut reconciler = Reconciler::new(&ctx);

        let ready = reconciler.reconcile(Some(env)).await.unwrap().unwrap();
        assert_eq!(ready.name, "shop-green");
        assert_eq!(
            reconciler.transitions(),
            &[Transition::Accepted {
                environment: "shop-green".to_string()
            }]
        );
        assert!(sandbox.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unhealthy_target_is_terminated_then_absent() {
        let (sandbox, env) = seeded(HealthColor::Grey);
        let ctx = context(config(DeploymentStrategy::AliasSwap), &sandbox);
        let mut reconciler = Reconciler::new(&ctx);

        let result = reconciler.reconcile(Some(env.clone())).await.unwrap();
        assert!(result.is_none());
        assert_eq!(
            sandbox.calls(),
            vec![ProviderCall::TerminateEnvironment {
                environment_id: env.id.clone()
            }]
        );
        assert_eq!(
            reconciler.into_transitions(),
            vec![
                Transition::Terminate {
                    environment: "shop-green".to_string(),
                    health: HealthColor::Grey
                },
                Transition::AwaitTermination {
                    environment: "shop-green".to_string()
                },
                Transition::Absent,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unhealthy_target_without_termination_fails() {
        let (sandbox, env) = seeded(HealthColor::Red);
        let mut config = config(DeploymentStrategy::AliasSwap);
        config.features.terminate_unhealthy_environment = false;
        let ctx = context(config, &sandbox);

        let err = Reconciler::new(&ctx).reconcile(Some(env)).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::UnhealthyTarget(_)));
        assert!(sandbox.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn protection_is_lifted_before_termination() {
        let (sandbox, env) = seeded(HealthColor::Red);
        let mut record = sandbox.environment(&env.id).unwrap().unwrap();
        record.protected = true;
        sandbox.put_environment(&record).unwrap();

        let mut config = config(DeploymentStrategy::AliasSwap);
        config.features.disable_termination_protection = true;
        let ctx = context(config, &sandbox);

        Reconciler::new(&ctx).reconcile(Some(env.clone())).await.unwrap();
        assert_eq!(
            sandbox.calls()[..2],
            [
                ProviderCall::SetTerminationProtection {
                    environment_id: env.id.clone(),
                    protected: false
                },
                ProviderCall::TerminateEnvironment {
                    environment_id: env.id.clone()
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn updating_target_is_awaited() {
        let (sandbox, env) = seeded(HealthColor::Green);
        sandbox.set_status(&env.id, EnvironmentStatus::Updating).unwrap();
        let env = sandbox.environment(&env.id).unwrap().unwrap().environment;
        let ctx = context(config(DeploymentStrategy::AliasSwap), &sandbox);
        let mut reconciler = Reconciler::new(&ctx);

        let ready = reconciler.reconcile(Some(env)).await.unwrap().unwrap();
        assert!(ready.is_ready());
        assert_eq!(reconciler.transitions().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn not_ready_without_waiting_times_out() {
        let (sandbox, env) = seeded(HealthColor::Green);
        sandbox.set_status(&env.id, EnvironmentStatus::Launching).unwrap();
        let env = sandbox.environment(&env.id).unwrap().unwrap().environment;
        let mut config = config(DeploymentStrategy::AliasSwap);
        config.wait.readiness = false;
        let ctx = context(config, &sandbox);

        let err = Reconciler::new(&ctx).reconcile(Some(env)).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Timeout(_)));
        assert!(err.to_string().contains("not ready, not waiting"));
    }

    #[tokio::test(start_paused = true)]
    async fn shared_strategy_detaches_rules_before_terminating() {
        let sandbox = sandbox();
        let report = sandbox
            .seed(&shared_seed(
                [("shop-blue", "shop", "tg-blue"), ("shop-green", "shop-staging", "tg-green")],
                [("rule-prod", "shop", "tg-blue"), ("rule-stage", "shop-staging", "tg-green")],
            ))
            .unwrap();
        let green = &report.environment_ids["shop-green"];
        sandbox.set_health(green, HealthColor::Red).unwrap();
        let env = sandbox.environment(green).unwrap().unwrap().environment;
        let ctx = context(config(DeploymentStrategy::SharedRoutingTable), &sandbox);
        let mut reconciler = Reconciler::new(&ctx);

        assert!(reconciler.reconcile(Some(env)).await.unwrap().is_none());

        let stage = sandbox.rule("rule-stage").unwrap().unwrap();
        assert_eq!(stage.actions, vec![RuleAction::unavailable()]);
        let prod = sandbox.rule("rule-prod").unwrap().unwrap();
        assert_eq!(prod.actions, vec![RuleAction::forward("tg-blue")]);
        assert_eq!(
            reconciler.transitions()[0],
            Transition::DetachRouting {
                environment: "shop-green".to_string(),
                rules: 1
            }
        );
    }
}
