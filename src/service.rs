//! Monitoring service facade
//!
//! [`MonitorService`] owns the store, the worker pool and the alerting chain
//! and is the single entry point used by the HTTP layer.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::alerts::{
    AlertEvaluator, LogMailer, MailTransport, NotificationDispatcher, SmtpMailer,
};
use crate::config::{ConfigError, MonitorConfig};
use crate::data::{MetricSample, MetricType, Target, TargetId, TargetRef};
use crate::directory::{Directory, DirectoryError, StaticDirectory};
use crate::ingest::{
    Accepted, IngestDispatcher, IngestError, Pipeline, RawMetrics, ShutdownReport, WorkerPool,
};
use crate::retention::{RetentionReaper, RetentionWorker};
use crate::storage::{InMemoryStore, MetricStore, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Target not found: {0}")]
    NotFound(TargetId),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Latest value of one metric alongside its configured thresholds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricStats {
    pub metric: MetricType,
    pub value: Option<f64>,
    pub threshold_warning: f64,
    pub threshold_critical: f64,
    pub threshold_emergency: f64,
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStats {
    pub target: Target,
    pub metrics: Vec<MetricStats>,
    pub recipients: Vec<String>,
}

pub struct MonitorService {
    config: MonitorConfig,
    directory: Arc<dyn Directory>,
    store: Arc<dyn MetricStore>,
    dispatcher: IngestDispatcher,
    reaper: RetentionReaper,
}

impl MonitorService {
    /// Wire the service from explicit collaborators. Must be called from
    /// within a tokio runtime, since it starts the worker pool.
    pub fn new(
        config: MonitorConfig,
        directory: Arc<dyn Directory>,
        mailer: Arc<dyn MailTransport>,
        store: Arc<dyn MetricStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let pool = Arc::new(WorkerPool::new(config.pool)?);
        let evaluator = AlertEvaluator::new(Arc::clone(&store), config.alert);
        let notifier = NotificationDispatcher::new(
            Arc::clone(&directory),
            mailer,
            config.thresholds,
            config.mail_timeout,
        );
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&store),
            evaluator,
            notifier,
            config.thresholds,
        ));
        let dispatcher = IngestDispatcher::new(
            Arc::clone(&directory),
            pool,
            pipeline,
            config.missing_metric,
        );

        Ok(Self {
            reaper: RetentionReaper::new(Arc::clone(&store)),
            config,
            directory,
            store,
            dispatcher,
        })
    }

    /// Build the default stack: in-memory store, directory file (or an empty
    /// directory) and SMTP delivery when configured, log-only delivery otherwise.
    pub fn from_config(config: MonitorConfig) -> Result<Self, ConfigError> {
        let directory = match &config.directory_file {
            Some(path) => {
                let directory = StaticDirectory::from_file(path)?;
                tracing::info!(path = %path.display(), targets = directory.len(), "Loaded directory");
                directory
            }
            None => {
                tracing::warn!("No directory file configured, every submission will be rejected");
                StaticDirectory::new()
            }
        };

        let mailer: Arc<dyn MailTransport> = match &config.smtp {
            Some(smtp) => {
                let mailer = SmtpMailer::new(smtp)
                    .map_err(|e| ConfigError::Invalid(format!("SMTP transport: {}", e)))?;
                tracing::info!(host = %smtp.host, port = smtp.port, "Alerts delivered over SMTP");
                Arc::new(mailer)
            }
            None => {
                tracing::warn!("SMTP_HOST not set, alerts will only be logged");
                Arc::new(LogMailer)
            }
        };

        Self::new(config, Arc::new(directory), mailer, Arc::new(InMemoryStore::new()))
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn MetricStore> {
        &self.store
    }

    /// Accept a metrics submission; storage and alerting happen in the background
    pub async fn submit(
        &self,
        target_ref: TargetRef,
        metrics: &RawMetrics,
    ) -> Result<Accepted, IngestError> {
        self.dispatcher.submit(target_ref, metrics).await
    }

    /// Samples from the last `since_hours`, newest first. Without a target,
    /// the samples of every known target are merged.
    pub async fn query(
        &self,
        target_id: Option<TargetId>,
        since_hours: u32,
    ) -> Result<Vec<MetricSample>, ServiceError> {
        self.query_at(target_id, since_hours, Utc::now()).await
    }

    pub async fn query_at(
        &self,
        target_id: Option<TargetId>,
        since_hours: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<MetricSample>, ServiceError> {
        if since_hours == 0 {
            return Err(ServiceError::Validation("hours must be positive".to_string()));
        }
        // Lookbacks reaching past the representable range cover everything
        let since = now
            .checked_sub_signed(Duration::hours(i64::from(since_hours)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let targets = self.targets_for(target_id).await?;
        let mut samples = Vec::new();
        for target in &targets {
            samples.extend(self.store.window(target.id, since)?.to_vec());
        }

        if targets.len() > 1 {
            samples.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        }
        Ok(samples)
    }

    /// Latest value, thresholds and recipients per target
    pub async fn stats(&self, target_id: Option<TargetId>) -> Result<Vec<TargetStats>, ServiceError> {
        let targets = self.targets_for(target_id).await?;

        let mut stats = Vec::with_capacity(targets.len());
        for target in targets {
            let latest = self.store.latest(target.id)?;
            let recipients = self.directory.recipients_of(target.id).await?;

            let metrics = MetricType::ALL
                .into_iter()
                .map(|metric| {
                    let thresholds = self.config.thresholds.for_metric(metric);
                    MetricStats {
                        metric,
                        value: latest.as_ref().map(|s| s.value(metric)),
                        threshold_warning: thresholds.warning,
                        threshold_critical: thresholds.critical,
                        threshold_emergency: thresholds.emergency,
                        recorded_at: latest.as_ref().map(|s| s.timestamp),
                    }
                })
                .collect();

            stats.push(TargetStats {
                target,
                metrics,
                recipients,
            });
        }
        Ok(stats)
    }

    /// Remove samples older than `days`
    pub fn purge_older_than(&self, days: u32) -> Result<usize, ServiceError> {
        self.purge_older_than_at(days, Utc::now())
    }

    pub fn purge_older_than_at(&self, days: u32, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        if days == 0 {
            return Err(ServiceError::Validation("days must be positive".to_string()));
        }
        Ok(self.reaper.reap(Duration::days(i64::from(days)), now)?)
    }

    /// Periodic reaper using the configured horizon and interval
    pub fn retention_worker(&self) -> RetentionWorker {
        RetentionWorker::new(
            self.reaper.clone(),
            self.config.retention.horizon,
            self.config.retention.check_interval,
        )
    }

    /// Stop accepting submissions and drain queued work within the grace period
    pub async fn shutdown(&self) -> ShutdownReport {
        self.dispatcher
            .pool()
            .shutdown(self.config.shutdown_grace)
            .await
    }

    async fn targets_for(&self, target_id: Option<TargetId>) -> Result<Vec<Target>, ServiceError> {
        match target_id {
            Some(id) => self
                .directory
                .resolve_target(&TargetRef::Id(id))
                .await?
                .map(|t| vec![t])
                .ok_or(ServiceError::NotFound(id)),
            None => Ok(self.directory.targets().await?),
        }
    }
}
