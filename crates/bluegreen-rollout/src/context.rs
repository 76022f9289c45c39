//! Per-run context handed to every stage of the engine.

use std::sync::Arc;

use bluegreen_core::config::SlotLayout;
use bluegreen_core::{DeployConfig, DeploymentStrategy, HealthColor, OrchestrationResult};
use bluegreen_health::{ReporterTracker, Waiter};
use bluegreen_provider::Clients;

/// Validated configuration plus the clients and waiter built from it.
#[derive(Clone)]
pub struct Context {
    pub config: DeployConfig,
    pub clients: Clients,
    pub waiter: Waiter,
}

impl Context {
    /// Validate `config` and build the run's waiter.
    pub fn new(config: DeployConfig, clients: Clients) -> OrchestrationResult<Self> {
        config.validate()?;
        let timings = config.wait.timings()?;
        let waiter = Waiter::new(clients.clone(), timings);
        Ok(Self {
            config,
            clients,
            waiter,
        })
    }

    /// Share a reporter tracker with the caller.
    pub fn with_tracker(mut self, tracker: Arc<ReporterTracker>) -> Self {
        self.waiter = self.waiter.with_tracker(tracker);
        self
    }

    pub fn layout(&self) -> OrchestrationResult<SlotLayout<'_>> {
        self.config.layout()
    }

    pub fn strategy(&self) -> DeploymentStrategy {
        self.config.strategy
    }

    pub fn minimum_health(&self) -> HealthColor {
        self.config.health.minimum_color
    }

    pub fn alias_domain(&self) -> String {
        self.config.alias_domain()
    }
}
