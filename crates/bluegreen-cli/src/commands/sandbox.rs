//! `bluegreen sandbox seed`: load pre-existing resources.

use std::path::Path;

use anyhow::Context as _;
use tracing::info;

use bluegreen_sandbox::{Sandbox, SandboxSeed, SeedReport};

pub fn seed(state: &Path, seed_file: &Path) -> anyhow::Result<()> {
    let report = seed_state(state, seed_file)?;
    for (name, id) in &report.environment_ids {
        println!("✓ {name} ({id})");
    }
    Ok(())
}

fn seed_state(state: &Path, seed_file: &Path) -> anyhow::Result<SeedReport> {
    let seed = SandboxSeed::from_file(seed_file)
        .with_context(|| format!("reading seed {}", seed_file.display()))?;
    let sandbox = Sandbox::open(state)
        .with_context(|| format!("opening sandbox state {}", state.display()))?;
    let report = sandbox.seed(&seed)?;
    info!(
        state = %state.display(),
        environments = report.environment_ids.len(),
        "sandbox seeded"
    );
    Ok(report)
}
