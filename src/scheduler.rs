//! Periodic batch sweep over the engine's unprocessed reviews.
//!
//! Runs on a tokio interval. Each tick hands the sweep to the blocking pool
//! and waits for it, so ticks never overlap; missed ticks are skipped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::{FeedbackEngine, SweepReport};

/// Handle for a running scheduler. Dropping it without `shutdown` leaves the
/// task running until the runtime stops.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop after the current sweep (if any) completes.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Batch scheduler task ended abnormally");
        }
    }
}

/// Start sweeping every `period`. The first sweep runs immediately. When
/// `reports` is set, each finished sweep is published on it.
pub fn start(
    engine: Arc<FeedbackEngine>,
    period: Duration,
    reports: Option<mpsc::Sender<SweepReport>>,
) -> SchedulerHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        tracing::info!(period_secs = period.as_secs_f64(), "Batch scheduler started");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    let engine = Arc::clone(&engine);
                    match tokio::task::spawn_blocking(move || engine.run_sweep()).await {
                        Ok(report) => {
                            if let Some(tx) = &reports {
                                if tx.send(report).await.is_err() {
                                    tracing::debug!("Sweep report receiver dropped");
                                }
                            }
                        }
                        Err(e) => tracing::error!(error = %e, "Batch sweep panicked"),
                    }
                }
            }
        }

        tracing::info!("Batch scheduler shutting down");
    });

    SchedulerHandle { shutdown, task }
}
