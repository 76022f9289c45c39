//! bluegreen-rollout: the blue/green orchestration engine.
//!
//! One run resolves the configured environments, reconciles the target
//! slot, deploys to it and promotes it.
//!
//! # Components
//!
//! - **`resolver`**: which environment is production, which is staging
//! - **`reconcile`**: target lifecycle loop (wait, replace, accept)
//! - **`executor`**: update in place or create the target
//! - **`promote`**: alias swap and shared routing table promotion
//! - **`version`**: application version lookup/creation
//! - **`orchestrator`**: the run itself and its outputs

pub mod context;
pub mod executor;
pub mod flow;
pub mod orchestrator;
pub mod promote;
pub mod reconcile;
pub mod resolver;
pub mod version;

#[cfg(test)]
mod testing;

pub use context::Context;
pub use flow::{ExitReason, Flow};
pub use orchestrator::{Orchestrator, RunOutcome, TargetOutputs};
pub use promote::{Promotion, SkipReason};
pub use reconcile::{Reconciler, Transition};
pub use resolver::{Resolved, resolve};
