//! bluegreen-sandbox: a simulated hosting platform.
//!
//! Backed by [redb](https://docs.rs/redb). Implements the collaborator
//! traits from `bluegreen-provider` so the engine can be exercised end to
//! end without a remote account: in memory for tests, on disk for the
//! `bluegreen` CLI.
//!
//! All records are JSON-serialized into redb's `&[u8]` value columns.
//! `Sandbox` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod platform;
pub mod records;
pub mod seed;
pub mod store;
pub mod tables;

pub use error::{SandboxError, SandboxResult};
pub use platform::{Sandbox, SandboxProfile};
pub use records::{EnvironmentRecord, ProviderCall, RuleRecord};
pub use seed::{SandboxSeed, SeedEnvironment, SeedListener, SeedLoadBalancer, SeedReport, SeedRule};
pub use store::SandboxStore;
