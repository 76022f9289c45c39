//! `bluegreen init`: write a starter config.

use std::path::Path;

use anyhow::bail;

use bluegreen_core::{DeployConfig, DeploymentStrategy};

pub fn init(
    application: &str,
    strategy: DeploymentStrategy,
    output: &Path,
    force: bool,
) -> anyhow::Result<()> {
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }
    let config = DeployConfig::scaffold(application, strategy);
    config.validate()?;
    std::fs::write(output, config.to_toml_string()?)?;
    println!("✓ Generated {}", output.display());
    Ok(())
}
