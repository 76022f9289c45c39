pub mod config;
pub mod error;
pub mod types;

pub use config::DeployConfig;
pub use error::{OrchestrationError, OrchestrationResult, ProviderError, ProviderResult};
pub use types::*;
