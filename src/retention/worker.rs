use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time;

use super::reaper::RetentionReaper;

/// Background worker that periodically reaps expired samples
pub struct RetentionWorker {
    reaper: RetentionReaper,
    horizon: chrono::Duration,
    interval: Duration,
    running: AtomicBool,
    stopped: Notify,
}

impl RetentionWorker {
    pub fn new(reaper: RetentionReaper, horizon: chrono::Duration, interval: Duration) -> Self {
        Self {
            reaper,
            horizon,
            interval,
            running: AtomicBool::new(false),
            stopped: Notify::new(),
        }
    }

    /// Start the background worker. The first pass runs immediately.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!(
                interval = ?self.interval,
                horizon_days = self.horizon.num_days(),
                "Retention worker started"
            );

            let mut interval = time::interval(self.interval);

            while self.running.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = self.stopped.notified() => break,
                }

                if let Err(e) = self.reaper.reap(self.horizon, chrono::Utc::now()) {
                    tracing::error!(stage = "retention", error = %e, "Retention pass failed");
                }
            }

            tracing::info!("Retention worker stopped");
        })
    }

    /// Stop the worker; a pass already in progress finishes first
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stopped.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
