//! One orchestration run, start to finish.

use serde::Serialize;
use tracing::info;

use bluegreen_core::{Environment, OrchestrationResult};

use crate::context::Context;
use crate::executor;
use crate::flow::{ExitReason, Flow};
use crate::promote::{Promotion, promote};
use crate::reconcile::{Reconciler, Transition};
use crate::resolver::resolve;
use crate::version::ensure_version;

/// What a run did and where it left the target.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// The target as re-read from the provider after the run.
    pub target: Option<Environment>,
    pub exit: Option<ExitReason>,
    pub promotion: Option<Promotion>,
    pub transitions: Vec<Transition>,
}

/// Flat view of the target for downstream tooling.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TargetOutputs {
    pub id: String,
    pub name: String,
    pub cname: String,
    pub endpoint_url: String,
    pub status: String,
    pub json: String,
}

impl RunOutcome {
    pub fn outputs(&self) -> serde_json::Result<TargetOutputs> {
        let Some(env) = &self.target else {
            return Ok(TargetOutputs::default());
        };
        Ok(TargetOutputs {
            id: env.id.clone(),
            name: env.name.clone(),
            cname: env.alias.clone(),
            endpoint_url: env.endpoint_url.clone().unwrap_or_default(),
            status: env.status.to_string(),
            json: serde_json::to_string(env)?,
        })
    }
}

pub struct Orchestrator {
    ctx: Context,
}

impl Orchestrator {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Version → resolve → reconcile → deploy → promote → protect.
    pub async fn run(&self) -> OrchestrationResult<RunOutcome> {
        let ctx = &self.ctx;
        let features = &ctx.config.features;
        info!(
            application = %ctx.config.application,
            strategy = %ctx.strategy(),
            "starting blue/green run"
        );

        let version = ensure_version(ctx).await?;
        let resolved = resolve(ctx).await?;

        let mut reconciler = Reconciler::new(ctx);
        let target = reconciler.reconcile(resolved.target().cloned()).await?;

        let flow = if features.deploy {
            executor::deploy(ctx, &mut reconciler, &resolved, target, version.as_ref()).await?
        } else {
            info!("deployment is disabled");
            Flow::exit(ExitReason::DeployDisabled, target)
        };
        let transitions = reconciler.into_transitions();

        let (target, exit, promotion) = match flow {
            Flow::EarlyExit { reason, last_known } => {
                info!(reason = reason.describe(), "stopping before promotion");
                (last_known, Some(reason), None)
            }
            Flow::Continue(env) => {
                let promotion = if features.promote {
                    Some(promote(ctx).await?)
                } else {
                    None
                };
                if features.enable_termination_protection {
                    info!(environment = %env.name, "enabling termination protection");
                    ctx.clients.set_termination_protection(&env.id, true).await?;
                }
                (Some(env), None, promotion)
            }
        };

        let target = match target {
            Some(env) => ctx.clients.describe_environment(&env.id).await?,
            None => None,
        };
        if let Some(env) = &target {
            info!(
                environment = %env.name,
                alias = %env.alias,
                status = %env.status,
                health = %env.health,
                "run finished"
            );
        }

        Ok(RunOutcome {
            target,
            exit,
            promotion,
            transitions,
        })
    }
}
