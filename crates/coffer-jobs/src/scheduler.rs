//! Periodic sweep runner.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

use coffer_core::{Error, Result};

use crate::sweeper::{RetentionSweeper, SweepReport};

/// Event emitted by the scheduler.
#[derive(Debug, Clone)]
pub enum SweepEvent {
    SchedulerStarted,
    /// A scheduled sweep finished (possibly skipped).
    SweepCompleted(SweepReport),
    /// A scheduled sweep could not list candidates.
    SweepFailed { error: String },
    SchedulerStopped,
}

/// Handle for controlling a running scheduler.
pub struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<SweepEvent>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Get a receiver for scheduler events.
    pub fn events(&self) -> broadcast::Receiver<SweepEvent> {
        self.event_rx.resubscribe()
    }

    /// Stop the scheduler; a sweep in progress is allowed to finish.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(()).await;
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Sweep scheduler task failed: {}", e)))
    }
}

/// Runs [`RetentionSweeper::sweep`] every `interval`, starting one interval
/// after [`SweepScheduler::start`]. A tick that falls due while a sweep is
/// still running is skipped.
pub struct SweepScheduler {
    sweeper: Arc<RetentionSweeper>,
    event_tx: broadcast::Sender<SweepEvent>,
}

impl SweepScheduler {
    pub fn new(sweeper: Arc<RetentionSweeper>) -> Self {
        let (event_tx, _) = broadcast::channel(16);
        Self { sweeper, event_tx }
    }

    /// Start the scheduler and return a handle for control.
    ///
    /// When sweeping is disabled in the config the task exits immediately.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();
        let task = tokio::spawn(self.run(shutdown_rx));
        SchedulerHandle {
            shutdown_tx,
            event_rx,
            task,
        }
    }

    async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) {
        let config = self.sweeper.config().clone();
        if !config.enabled {
            info!(
                subsystem = "jobs",
                component = "scheduler",
                "Retention sweep is disabled, not starting"
            );
            return;
        }

        info!(
            subsystem = "jobs",
            component = "scheduler",
            interval_secs = config.interval.as_secs(),
            retention_days = config.retention_days,
            "Sweep scheduler started"
        );
        let _ = self.event_tx.send(SweepEvent::SchedulerStarted);

        let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(subsystem = "jobs", component = "scheduler", "Sweep scheduler received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    let event = match self.sweeper.sweep().await {
                        Ok(report) => SweepEvent::SweepCompleted(report),
                        Err(e) => {
                            error!(subsystem = "jobs", component = "scheduler", error = %e, "Scheduled sweep failed");
                            SweepEvent::SweepFailed { error: e.to_string() }
                        }
                    };
                    let _ = self.event_tx.send(event);
                }
            }
        }

        let _ = self.event_tx.send(SweepEvent::SchedulerStopped);
        info!(subsystem = "jobs", component = "scheduler", "Sweep scheduler stopped");
    }
}
