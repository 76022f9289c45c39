//! Bounded polling waits with a progress reporter alongside.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::debug;

use bluegreen_core::config::WaitTimings;
use bluegreen_core::{Environment, EnvironmentStatus, OrchestrationError, OrchestrationResult};
use bluegreen_provider::Clients;

use crate::classify::PollSchedule;
use crate::reporter::{ProgressReporter, ReporterTracker};

/// Outcome of one poll: keep waiting, or finish with a result.
type Check<T> = Option<OrchestrationResult<T>>;

#[derive(Clone)]
pub struct Waiter {
    clients: Clients,
    timings: WaitTimings,
    tracker: Arc<ReporterTracker>,
}

impl Waiter {
    pub fn new(clients: Clients, timings: WaitTimings) -> Self {
        Self {
            clients,
            timings,
            tracker: Arc::new(ReporterTracker::default()),
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<ReporterTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn tracker(&self) -> &Arc<ReporterTracker> {
        &self.tracker
    }

    /// Wait until `env` leaves Launching/Updating.
    ///
    /// Returns the environment once it is Ready, or as soon as it is seen
    /// Terminating/Terminated so the caller can react. `None` means the
    /// platform no longer knows the environment.
    pub async fn until_ready(
        &self,
        env: &Environment,
        since: u64,
    ) -> OrchestrationResult<Option<Environment>> {
        let what = format!("environment {} to become Ready", env.name);
        self.wait_for(&[env.id.clone()], since, &what, |mut seen| {
            match seen.pop().flatten() {
                None => Some(Ok(None)),
                Some(current) => match current.status {
                    EnvironmentStatus::Launching | EnvironmentStatus::Updating => None,
                    _ => Some(Ok(Some(current))),
                },
            }
        })
        .await
    }

    /// Wait until `env` is Terminated or gone.
    pub async fn until_terminated(&self, env: &Environment, since: u64) -> OrchestrationResult<()> {
        let what = format!("environment {} to terminate", env.name);
        self.wait_for(&[env.id.clone()], since, &what, |mut seen| {
            match seen.pop().flatten() {
                Some(current) if current.status != EnvironmentStatus::Terminated => None,
                _ => Some(Ok(())),
            }
        })
        .await
    }

    /// Wait until every environment in `envs` is Ready. Returns them in order.
    pub async fn until_all_ready(
        &self,
        envs: &[&Environment],
        since: u64,
    ) -> OrchestrationResult<Vec<Environment>> {
        let ids: Vec<String> = envs.iter().map(|e| e.id.clone()).collect();
        let names: Vec<&str> = envs.iter().map(|e| e.name.as_str()).collect();
        let what = format!("environments {} to become Ready", names.join(", "));
        self.wait_for(&ids, since, &what, |seen| {
            let mut ready = Vec::with_capacity(seen.len());
            for (current, name) in seen.into_iter().zip(&names) {
                match current {
                    None => {
                        return Some(Err(OrchestrationError::UnhealthyTarget(format!(
                            "environment {name} disappeared while waiting"
                        ))));
                    }
                    Some(env)
                        if matches!(
                            env.status,
                            EnvironmentStatus::Terminating | EnvironmentStatus::Terminated
                        ) =>
                    {
                        return Some(Err(OrchestrationError::UnhealthyTarget(format!(
                            "environment {name} is {} while waiting for Ready",
                            env.status
                        ))));
                    }
                    Some(env) if env.is_ready() => ready.push(env),
                    Some(_) => return None,
                }
            }
            Some(Ok(ready))
        })
        .await
    }

    async fn wait_for<T>(
        &self,
        ids: &[String],
        since: u64,
        what: &str,
        mut check: impl FnMut(Vec<Option<Environment>>) -> Check<T>,
    ) -> OrchestrationResult<T> {
        let mut reporter = ProgressReporter::start(
            self.clients.clone(),
            ids.to_vec(),
            since,
            self.timings.event_interval,
            self.tracker.clone(),
        );

        let outcome = tokio::select! {
            result = self.poll(ids, what, &mut check) => result,
            event = reporter.fatal() => Err(OrchestrationError::FatalEvent(event.to_string())),
        };
        reporter.stop();
        outcome
    }

    async fn poll<T>(
        &self,
        ids: &[String],
        what: &str,
        check: &mut impl FnMut(Vec<Option<Environment>>) -> Check<T>,
    ) -> OrchestrationResult<T> {
        let started = Instant::now();
        let max_wait = self.timings.max_wait;
        let mut schedule = PollSchedule::new(self.timings.min_delay, self.timings.max_delay);

        loop {
            let mut seen = Vec::with_capacity(ids.len());
            for id in ids {
                seen.push(self.clients.describe_environment(id).await?);
            }
            if let Some(done) = check(seen) {
                return done;
            }

            let elapsed = started.elapsed();
            if elapsed >= max_wait {
                return Err(OrchestrationError::Timeout(format!(
                    "waited {}s for {what}",
                    max_wait.as_secs()
                )));
            }
            let delay = schedule.next_delay().min(max_wait - elapsed);
            debug!(waiting_for = %what, ?delay, "polling again");
            tokio::time::sleep(delay).await;
        }
    }
}
