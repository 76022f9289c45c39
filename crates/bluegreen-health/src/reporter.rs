//! Progress reporter: background task that streams provider events
//! while a wait is in progress.
//!
//! Each reporter polls on a fixed interval (no backoff), logs every event
//! newer than the last one it saw, and hands the first Error/Fatal event
//! back to the waiter through [`ProgressReporter::fatal`]. The owner must
//! call [`ProgressReporter::stop`] once its wait resolves; dropping an
//! unstopped reporter stops it as well.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use bluegreen_core::ProviderEvent;
use bluegreen_provider::Clients;

/// Counts reporter starts and stops.
#[derive(Debug, Default)]
pub struct ReporterTracker {
    started: AtomicUsize,
    stopped: AtomicUsize,
}

impl ReporterTracker {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Reporters started but not yet stopped.
    pub fn active(&self) -> usize {
        self.started().saturating_sub(self.stopped())
    }
}

pub struct ProgressReporter {
    handle: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    fatal_rx: Option<oneshot::Receiver<ProviderEvent>>,
    tracker: Arc<ReporterTracker>,
}

impl ProgressReporter {
    /// Start streaming events for `environment_ids` that are newer than `since`.
    pub fn start(
        clients: Clients,
        environment_ids: Vec<String>,
        since: u64,
        interval: Duration,
        tracker: Arc<ReporterTracker>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (fatal_tx, fatal_rx) = oneshot::channel();
        let interval = interval.max(Duration::from_millis(1));

        debug!(environments = ?environment_ids, since, "progress reporter started");
        let handle = tokio::spawn(async move {
            run_reporter_loop(clients, environment_ids, since, interval, fatal_tx, shutdown_rx).await;
        });
        tracker.started.fetch_add(1, Ordering::SeqCst);

        Self {
            handle: Some(handle),
            shutdown_tx,
            fatal_rx: Some(fatal_rx),
            tracker,
        }
    }

    /// Resolves with the first fatal event. Pends forever if there is none.
    pub async fn fatal(&mut self) -> ProviderEvent {
        if let Some(rx) = self.fatal_rx.as_mut() {
            let received = rx.await;
            self.fatal_rx = None;
            if let Ok(event) = received {
                return event;
            }
        }
        std::future::pending().await
    }

    /// Cancel the background poll.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.shutdown_tx.send(true);
            handle.abort();
            self.tracker.stopped.fetch_add(1, Ordering::SeqCst);
            debug!("progress reporter stopped");
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_reporter_loop(
    clients: Clients,
    environment_ids: Vec<String>,
    since: u64,
    interval: Duration,
    fatal_tx: oneshot::Sender<ProviderEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut last_seen = vec![since; environment_ids.len()];
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                debug!("progress reporter shutting down");
                return;
            }
        }

        let mut fatal = None;
        for (environment_id, last) in environment_ids.iter().zip(last_seen.iter_mut()) {
            let events = match clients.events_since(environment_id, *last).await {
                Ok(events) => events,
                Err(e) => {
                    warn!(%environment_id, error = %e, "failed to fetch environment events");
                    continue;
                }
            };
            if events.is_empty() {
                debug!(%environment_id, "no new events");
            }
            for event in events {
                *last = (*last).max(event.timestamp);
                info!(target: "bluegreen::events", "{event}");
                if fatal.is_none() && event.severity.is_fatal() {
                    fatal = Some(event);
                }
            }
        }

        if let Some(event) = fatal {
            let _ = fatal_tx.send(event);
            return;
        }
    }
}
