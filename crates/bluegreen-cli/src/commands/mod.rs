pub mod init;
pub mod run;
pub mod sandbox;
pub mod status;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;

use bluegreen_core::DeployConfig;
use bluegreen_provider::Clients;
use bluegreen_rollout::Context;
use bluegreen_sandbox::Sandbox;

/// Load and validate the config, then open the sandbox it runs against.
pub fn open_context(config_path: &Path, state: &Path) -> anyhow::Result<Context> {
    let config = DeployConfig::from_file(config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    let sandbox = Sandbox::open(state)
        .with_context(|| format!("opening sandbox state {}", state.display()))?;
    Ok(Context::new(config, Clients::from_platform(Arc::new(sandbox)))?)
}
