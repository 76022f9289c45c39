//! Health decisions and poll backoff.

use std::time::Duration;

use bluegreen_core::{EnvironmentStatus, HealthColor};

/// Status a waiter should poll for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitTarget {
    Ready,
    /// The environment is on its way out; wait for it to disappear.
    Terminated,
}

/// What to do with an observed environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Not Ready yet; wait for the given status.
    AwaitStatus(AwaitTarget),
    /// Ready, but health is under the configured minimum.
    BelowThreshold,
    /// Ready and healthy enough to promote.
    Acceptable,
}

/// Map a status/health pair to a decision. Total and side-effect free.
pub fn classify(status: EnvironmentStatus, health: HealthColor, minimum: HealthColor) -> Decision {
    match status {
        EnvironmentStatus::Terminating | EnvironmentStatus::Terminated => {
            Decision::AwaitStatus(AwaitTarget::Terminated)
        }
        EnvironmentStatus::Launching | EnvironmentStatus::Updating => {
            Decision::AwaitStatus(AwaitTarget::Ready)
        }
        EnvironmentStatus::Ready if health < minimum => Decision::BelowThreshold,
        EnvironmentStatus::Ready => Decision::Acceptable,
    }
}

/// Delay between polls: starts at `min`, doubles up to `max`.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    current: Duration,
    max: Duration,
}

impl PollSchedule {
    pub fn new(min: Duration, max: Duration) -> Self {
        let min = min.max(Duration::from_millis(1));
        let max = max.max(min);
        Self { current: min, max }
    }

    /// Delay before the next poll.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }
}
