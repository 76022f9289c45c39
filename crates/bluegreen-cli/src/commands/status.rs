//! `bluegreen status`: resolve roles without changing anything.

use std::path::Path;

use bluegreen_core::Environment;
use bluegreen_rollout::{Resolved, resolve};

use crate::OutputFormat;

pub async fn status(config: &Path, state: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let ctx = super::open_context(config, state)?;
    let resolved = resolve(&ctx).await?;
    println!("{}", render(&resolved, format)?);
    Ok(())
}

fn roles(resolved: &Resolved) -> Vec<(&'static str, Option<&Environment>)> {
    match resolved {
        Resolved::Pair { production, staging } => vec![
            ("production", production.as_ref()),
            ("staging", staging.as_ref()),
        ],
        Resolved::Single(env) => vec![("single", env.as_ref())],
    }
}

fn render(resolved: &Resolved, format: OutputFormat) -> anyhow::Result<String> {
    let roles = roles(resolved);
    if format == OutputFormat::Json {
        let doc: serde_json::Map<String, serde_json::Value> = roles
            .into_iter()
            .map(|(role, env)| Ok((role.to_string(), serde_json::to_value(env)?)))
            .collect::<serde_json::Result<_>>()?;
        return Ok(serde_json::to_string_pretty(&doc)?);
    }

    Ok(roles
        .into_iter()
        .map(|(role, env)| match env {
            Some(env) => format!(
                "{role:<11} {} {} {} {}",
                env.name, env.alias, env.status, env.health
            ),
            None => format!("{role:<11} -"),
        })
        .collect::<Vec<_>>()
        .join("\n"))
}
