//! Deployment executor: update the target in place, or create it.

use tracing::info;

use bluegreen_core::config::SlotLayout;
use bluegreen_core::{
    ApplicationVersion, DeploymentStrategy, Environment, OptionSetting, OrchestrationError,
    OrchestrationResult, SHARED_LB_NAMESPACE, SHARED_LB_OPTION, epoch_millis,
};
use bluegreen_provider::{CreateEnvironment, UpdateEnvironment};
use bluegreen_routing::resolve_backend;

use crate::context::Context;
use crate::flow::{ExitReason, Flow};
use crate::reconcile::Reconciler;
use crate::resolver::Resolved;

/// Deploy `version` to the reconciled `target`.
///
/// Exactly one of update or create is issued. The wait for the result
/// goes through `reconciler` so it shows up in the transition log.
pub async fn deploy(
    ctx: &Context,
    reconciler: &mut Reconciler<'_>,
    resolved: &Resolved,
    target: Option<Environment>,
    version: Option<&ApplicationVersion>,
) -> OrchestrationResult<Flow> {
    let features = &ctx.config.features;
    let version_label = version.map(|v| v.label.clone());

    match target {
        Some(env) => {
            if !features.update_environment {
                info!(environment = %env.name, "updates are disabled, leaving environment as is");
                return Ok(Flow::exit(ExitReason::UpdateDisabled, Some(env)));
            }
            let request = UpdateEnvironment {
                environment_id: env.id.clone(),
                version_label,
                template: ctx.config.create.template.clone(),
                option_settings: ctx.config.create.option_settings.clone(),
            };
            info!(
                environment = %env.name,
                version = request.version_label.as_deref().unwrap_or("-"),
                "updating environment"
            );
            let since = epoch_millis();
            let updated = ctx.clients.update_environment(&request).await?;
            reconciler.await_deployment(&updated, since).await
        }
        None => {
            if !features.create_environment {
                info!("no target environment and creation is disabled");
                return Ok(Flow::exit(ExitReason::CreationDisabled, None));
            }
            let request = creation_request(ctx, resolved, version_label).await?;
            info!(
                environment = %request.name,
                alias = request.alias_prefix.as_deref().unwrap_or("-"),
                version = request.version_label.as_deref().unwrap_or("-"),
                "creating environment"
            );
            let since = epoch_millis();
            let created = ctx.clients.create_environment(&request).await?;
            reconciler.await_deployment(&created, since).await
        }
    }
}

/// Name and alias for a new environment.
///
/// The new slot takes whichever configured name production is not using.
/// It gets the staging alias when production exists, else the production
/// alias.
pub fn slot_for_creation<'a>(
    layout: &SlotLayout<'a>,
    resolved: &Resolved,
) -> (&'a str, &'a str) {
    match *layout {
        SlotLayout::Single { name, alias } => (name, alias),
        SlotLayout::Pair {
            blue,
            green,
            production_alias,
            staging_alias,
        } => match resolved.production() {
            Some(production) if production.name == blue => (green, staging_alias),
            Some(_) => (blue, staging_alias),
            None => {
                let taken = resolved.staging().map(|env| env.name.as_str());
                let name = if taken == Some(blue) { green } else { blue };
                (name, production_alias)
            }
        },
    }
}

async fn creation_request(
    ctx: &Context,
    resolved: &Resolved,
    version_label: Option<String>,
) -> OrchestrationResult<CreateEnvironment> {
    let create = &ctx.config.create;
    if create.platform_branch.is_none() && create.template.is_none() {
        return Err(OrchestrationError::configuration(
            "create.platform_branch or create.template is required to create an environment",
        ));
    }

    let layout = ctx.layout()?;
    let (name, alias) = slot_for_creation(&layout, resolved);

    let mut option_settings = if !create.option_settings.is_empty() {
        create.option_settings.clone()
    } else if create.use_default_option_settings {
        default_option_settings(ctx.strategy())
    } else {
        Vec::new()
    };
    if ctx.strategy() == DeploymentStrategy::SharedRoutingTable {
        let load_balancer = shared_load_balancer_for(ctx, resolved).await?;
        option_settings.retain(|s| {
            !(s.namespace == SHARED_LB_NAMESPACE && s.option_name == SHARED_LB_OPTION)
        });
        option_settings.push(OptionSetting::new(
            SHARED_LB_NAMESPACE,
            SHARED_LB_OPTION,
            &load_balancer,
        ));
    }

    Ok(CreateEnvironment {
        application: ctx.config.application.clone(),
        name: name.to_string(),
        alias_prefix: Some(alias.to_string()),
        version_label,
        template: create.template.clone(),
        platform_branch: create.platform_branch.clone(),
        option_settings,
    })
}

/// Production's load balancer, or the configured one before the first deploy.
async fn shared_load_balancer_for(ctx: &Context, resolved: &Resolved) -> OrchestrationResult<String> {
    if let Some(production) = resolved.production() {
        let backend = resolve_backend(&ctx.clients, production).await?;
        return Ok(backend.load_balancer);
    }
    ctx.config.create.shared_load_balancer.clone().ok_or_else(|| {
        OrchestrationError::configuration(
            "create.shared_load_balancer is required to create the first environment on a shared load balancer",
        )
    })
}

/// Settings used when `use_default_option_settings` is on.
pub fn default_option_settings(strategy: DeploymentStrategy) -> Vec<OptionSetting> {
    let mut settings = vec![OptionSetting::new(
        "aws:ec2:instances",
        "InstanceTypes",
        "t3.micro,t2.micro",
    )];
    match strategy {
        DeploymentStrategy::AliasSwap => settings.push(OptionSetting::new(
            "aws:elasticbeanstalk:environment",
            "EnvironmentType",
            "SingleInstance",
        )),
        DeploymentStrategy::SharedRoutingTable => settings.extend([
            OptionSetting::new("aws:elasticbeanstalk:environment", "EnvironmentType", "LoadBalanced"),
            OptionSetting::new("aws:elasticbeanstalk:environment", "LoadBalancerType", "application"),
            OptionSetting::new("aws:elasticbeanstalk:environment", "LoadBalancerIsShared", "true"),
        ]),
    }
    settings.extend([
        OptionSetting::new(
            "aws:elasticbeanstalk:environment",
            "ServiceRole",
            "service-role/aws-elasticbeanstalk-service-role",
        ),
        OptionSetting::new(
            "aws:autoscaling:launchconfiguration",
            "IamInstanceProfile",
            "aws-elasticbeanstalk-ec2-role",
        ),
    ]);
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    use bluegreen_core::{EnvironmentStatus, HealthColor};
    use bluegreen_sandbox::ProviderCall;

    use crate::testing::*;

    fn env(name: &str, alias: &str) -> Environment {
        Environment {
            id: format!("e-{name}"),
            name: name.to_string(),
            alias: format!("{alias}.{DOMAIN}"),
            endpoint_url: None,
            status: EnvironmentStatus::Ready,
            health: HealthColor::Green,
            version_label: None,
            created_at: 0,
        }
    }

    const PAIR: SlotLayout<'static> = SlotLayout::Pair {
        blue: "shop-blue",
        green: "shop-green",
        production_alias: "shop",
        staging_alias: "shop-staging",
    };

    #[test]
    fn first_environment_takes_blue_and_production_alias() {
        let resolved = Resolved::Pair {
            production: None,
            staging: None,
        };
        assert_eq!(slot_for_creation(&PAIR, &resolved), ("shop-blue", "shop"));
    }

    #[test]
    fn new_slot_avoids_production_name() {
        let resolved = Resolved::Pair {
            production: Some(env("shop-blue", "shop")),
            staging: None,
        };
        assert_eq!(slot_for_creation(&PAIR, &resolved), ("shop-green", "shop-staging"));

        let resolved = Resolved::Pair {
            production: Some(env("shop-green", "shop")),
            staging: None,
        };
        assert_eq!(slot_for_creation(&PAIR, &resolved), ("shop-blue", "shop-staging"));
    }

    #[test]
    fn orphaned_staging_keeps_its_name() {
        let resolved = Resolved::Pair {
            production: None,
            staging: Some(env("shop-blue", "shop-staging")),
        };
        assert_eq!(slot_for_creation(&PAIR, &resolved), ("shop-green", "shop"));
    }

    #[test]
    fn shared_defaults_ask_for_a_shared_load_balancer() {
        let settings = default_option_settings(DeploymentStrategy::SharedRoutingTable);
        assert!(settings
            .iter()
            .any(|s| s.option_name == "LoadBalancerIsShared" && s.value == "true"));
        let swap = default_option_settings(DeploymentStrategy::AliasSwap);
        assert!(swap.iter().any(|s| s.value == "SingleInstance"));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_creation_exits_early_without_calls() {
        let sandbox = sandbox();
        let mut config = config(DeploymentStrategy::AliasSwap);
        config.features.create_environment = false;
        let ctx = context(config, &sandbox);
        let resolved = Resolved::Pair {
            production: None,
            staging: None,
        };
        let mut reconciler = Reconciler::new(&ctx);

        let flow = deploy(&ctx, &mut reconciler, &resolved, None, None).await.unwrap();
        assert_eq!(flow, Flow::exit(ExitReason::CreationDisabled, None));
        assert!(sandbox.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shared_creation_needs_a_load_balancer() {
        let sandbox = sandbox();
        let ctx = context(config(DeploymentStrategy::SharedRoutingTable), &sandbox);
        let resolved = Resolved::Pair {
            production: None,
            staging: None,
        };
        let mut reconciler = Reconciler::new(&ctx);

        let err = deploy(&ctx, &mut reconciler, &resolved, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::Configuration(_)));
        assert!(sandbox.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn creation_without_waiting_returns_launching_environment() {
        let sandbox = sandbox();
        let mut config = config(DeploymentStrategy::AliasSwap);
        config.wait.deployment = false;
        let ctx = context(config, &sandbox);
        let resolved = Resolved::Pair {
            production: None,
            staging: None,
        };
        let mut reconciler = Reconciler::new(&ctx);

        let flow = deploy(&ctx, &mut reconciler, &resolved, None, None).await.unwrap();
        let Flow::EarlyExit { reason, last_known } = flow else {
            panic!("expected early exit");
        };
        assert_eq!(reason, ExitReason::NotWaiting);
        assert_eq!(last_known.unwrap().status, EnvironmentStatus::Launching);
        assert_eq!(
            sandbox.calls(),
            vec![ProviderCall::CreateEnvironment {
                name: "shop-blue".to_string(),
                alias: format!("shop.{DOMAIN}"),
            }]
        );
    }
}
