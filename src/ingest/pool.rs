//! Bounded background worker pool
//!
//! A fixed number of tokio workers pull jobs from a bounded queue. When the
//! queue is full new jobs are rejected instead of buffered, so sustained
//! overload cannot grow memory without bound. The pool is an ordinary value:
//! construct it once, share it, and shut it down explicitly.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ConfigError;

/// A unit of background work
pub type Job = BoxFuture<'static, ()>;

/// Pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// Jobs that may wait for a worker before submissions are rejected
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_capacity: 1024,
        }
    }
}

impl PoolConfig {
    /// Single worker, small queue; jobs run one at a time in submission order
    pub fn single() -> Self {
        Self {
            workers: 1,
            queue_capacity: 64,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("worker pool needs at least one worker".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("worker queue capacity must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("Worker queue is full")]
    Busy,

    #[error("Worker pool is shut down")]
    ShutDown,
}

/// What happened to outstanding work at shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// All queued and running jobs finished within the grace period
    pub drained: bool,
    /// Workers aborted with work still pending
    pub abandoned_workers: usize,
}

/// Fixed-size pool of background workers fed by a bounded queue
pub struct WorkerPool {
    config: PoolConfig,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// Jobs accepted but not yet finished
    pending: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Spawn the workers. Must be called from within a tokio runtime.
    pub fn new(config: PoolConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let (tx, rx) = mpsc::channel::<Job>(config.queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let pending = Arc::new(AtomicUsize::new(0));

        let workers = (0..config.workers)
            .map(|id| {
                let rx = Arc::clone(&rx);
                let pending = Arc::clone(&pending);
                tokio::spawn(Self::run_worker(id, rx, pending))
            })
            .collect();

        tracing::info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Worker pool started"
        );

        Ok(Self {
            config,
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            pending,
        })
    }

    async fn run_worker(
        id: usize,
        rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
        pending: Arc<AtomicUsize>,
    ) {
        loop {
            // Only one idle worker waits on the queue at a time
            let job = { rx.lock().await.recv().await };
            let Some(job) = job else {
                break;
            };

            if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                tracing::error!(worker = id, "Background job panicked");
            }
            pending.fetch_sub(1, Ordering::SeqCst);
        }
        tracing::debug!(worker = id, "Worker stopped");
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Jobs queued or running
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Queue a job without waiting. Fails with `Busy` when the queue is full.
    pub fn try_submit(&self, job: Job) -> Result<(), PoolError> {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(PoolError::ShutDown)?;

        self.pending.fetch_add(1, Ordering::SeqCst);
        sender.try_send(job).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            match e {
                mpsc::error::TrySendError::Full(_) => PoolError::Busy,
                mpsc::error::TrySendError::Closed(_) => PoolError::ShutDown,
            }
        })
    }

    /// Stop accepting jobs and let workers finish what is queued.
    ///
    /// Workers still running after `grace` are aborted.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        // Dropping the sender lets workers exit once the queue is empty
        drop(self.sender.lock().take());
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return ShutdownReport {
                drained: true,
                abandoned_workers: 0,
            };
        }

        let aborts: Vec<_> = workers.iter().map(|h| h.abort_handle()).collect();
        let drained = tokio::time::timeout(grace, join_all(workers)).await.is_ok();

        let abandoned_workers = if drained {
            0
        } else {
            let still_running = aborts.iter().filter(|h| !h.is_finished()).count();
            aborts.iter().for_each(|h| h.abort());
            still_running
        };

        if drained {
            tracing::info!("Worker pool drained");
        } else {
            tracing::warn!(
                abandoned_workers,
                pending = self.pending(),
                "Worker pool shutdown grace period expired, abandoning in-flight work"
            );
        }

        ShutdownReport {
            drained,
            abandoned_workers,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for handle in self.workers.get_mut().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::{oneshot, Notify};

    #[tokio::test]
    async fn test_jobs_run_and_drain_on_shutdown() {
        let pool = WorkerPool::new(PoolConfig::single()).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.try_submit(Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        let report = pool.shutdown(Duration::from_secs(5)).await;
        assert!(report.drained);
        assert_eq!(report.abandoned_workers, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(pool.pending(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_with_busy() {
        let pool = WorkerPool::new(PoolConfig {
            workers: 1,
            queue_capacity: 1,
        })
        .unwrap();

        // Occupy the only worker until released
        let release = Arc::new(Notify::new());
        let (started_tx, started_rx) = oneshot::channel();
        {
            let release = Arc::clone(&release);
            pool.try_submit(Box::pin(async move {
                let _ = started_tx.send(());
                release.notified().await;
            }))
            .unwrap();
        }
        started_rx.await.unwrap();

        // Fills the queue
        pool.try_submit(Box::pin(async {})).unwrap();
        // Nowhere to go
        assert_eq!(pool.try_submit(Box::pin(async {})), Err(PoolError::Busy));
        assert_eq!(pool.pending(), 2);

        release.notify_one();
        assert!(pool.shutdown(Duration::from_secs(5)).await.drained);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown() {
        let pool = WorkerPool::new(PoolConfig::single()).unwrap();
        pool.shutdown(Duration::from_secs(1)).await;

        assert!(pool.is_shut_down());
        assert_eq!(pool.try_submit(Box::pin(async {})), Err(PoolError::ShutDown));
    }

    #[tokio::test]
    async fn test_stuck_job_is_abandoned_after_grace() {
        let pool = WorkerPool::new(PoolConfig::single()).unwrap();
        pool.try_submit(Box::pin(futures::future::pending::<()>()))
            .unwrap();

        let report = pool.shutdown(Duration::from_millis(50)).await;
        assert!(!report.drained);
        assert_eq!(report.abandoned_workers, 1);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(PoolConfig::single()).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        pool.try_submit(Box::pin(async {
            panic!("boom");
        }))
        .unwrap();
        {
            let counter = Arc::clone(&counter);
            pool.try_submit(Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        assert!(pool.shutdown(Duration::from_secs(5)).await.drained);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_config() {
        assert!(WorkerPool::new(PoolConfig {
            workers: 0,
            queue_capacity: 1
        })
        .is_err());
        assert!(WorkerPool::new(PoolConfig {
            workers: 1,
            queue_capacity: 0
        })
        .is_err());
    }
}
