//! `bluegreen run`: one orchestration run against the sandbox.

use std::path::Path;

use bluegreen_rollout::{Orchestrator, RunOutcome};

use crate::OutputFormat;

pub async fn run(config: &Path, state: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let ctx = super::open_context(config, state)?;
    let outcome = Orchestrator::new(ctx).run().await?;
    println!("{}", render(&outcome, format)?);
    Ok(())
}

fn render(outcome: &RunOutcome, format: OutputFormat) -> anyhow::Result<String> {
    let outputs = outcome.outputs()?;
    if format == OutputFormat::Json {
        let doc = serde_json::json!({
            "outputs": outputs,
            "outcome": outcome,
        });
        return Ok(serde_json::to_string_pretty(&doc)?);
    }

    let mut lines = Vec::new();
    if outcome.target.is_none() {
        lines.push("no target environment".to_string());
    } else {
        lines.push(format!("environment:  {} ({})", outputs.name, outputs.id));
        lines.push(format!("cname:        {}", outputs.cname));
        lines.push(format!("endpoint:     {}", outputs.endpoint_url));
        lines.push(format!("status:       {}", outputs.status));
    }
    if let Some(exit) = outcome.exit {
        lines.push(format!("stopped:      {}", exit.describe()));
    }
    if let Some(promotion) = &outcome.promotion {
        lines.push(format!("promotion:    {}", serde_json::to_string(promotion)?));
    }
    lines.push(format!("transitions:  {}", outcome.transitions.len()));
    Ok(lines.join("\n"))
}
