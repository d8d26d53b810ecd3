//! Submission handling and the background persist → evaluate → notify chain

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use super::payload::{normalize, RawMetrics};
use super::pool::{PoolError, WorkerPool};
use crate::alerts::{AlertEvaluator, NotificationDispatcher, Thresholds};
use crate::config::MissingMetricPolicy;
use crate::data::{MetricSample, MetricType, Target, TargetId, TargetRef};
use crate::directory::{Directory, DirectoryError};
use crate::storage::MetricStore;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Target not found: {0}")]
    NotFound(TargetRef),

    #[error("Service busy, try again later")]
    ServiceBusy,

    #[error("Service is shutting down")]
    ShutDown,

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl From<PoolError> for IngestError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::Busy => IngestError::ServiceBusy,
            PoolError::ShutDown => IngestError::ShutDown,
        }
    }
}

/// Returned as soon as a submission is queued
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Accepted {
    pub target_id: TargetId,
    pub recorded_at: DateTime<Utc>,
}

/// Everything a background unit needs, passed explicitly
pub struct Pipeline {
    store: Arc<dyn MetricStore>,
    evaluator: AlertEvaluator,
    notifier: NotificationDispatcher,
    thresholds: Thresholds,
    /// Serializes evaluate + notify per target
    locks: DashMap<TargetId, Arc<tokio::sync::Mutex<()>>>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn MetricStore>,
        evaluator: AlertEvaluator,
        notifier: NotificationDispatcher,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            store,
            evaluator,
            notifier,
            thresholds,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn MetricStore> {
        &self.store
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    fn target_lock(&self, target_id: TargetId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(target_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Persist the sample, then evaluate every metric and alert on confirmed breaches.
    ///
    /// Failures end up in the log; nothing is returned to the submitter.
    pub async fn process(&self, target: Target, sample: MetricSample) {
        let now = sample.timestamp;

        if let Err(e) = self.store.append(sample.clone()) {
            tracing::error!(
                target_id = %target.id,
                stage = "persist",
                error = %e,
                "Failed to store sample"
            );
            return;
        }

        let lock = self.target_lock(target.id);
        let _guard = lock.lock().await;

        for metric in MetricType::ALL {
            let value = sample.value(metric);
            let decision = match self.evaluator.evaluate(
                target.id,
                metric,
                value,
                self.thresholds.for_metric(metric),
                now,
            ) {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::error!(
                        target_id = %target.id,
                        metric = %metric,
                        stage = "evaluate",
                        error = %e,
                        "Alert evaluation failed"
                    );
                    continue;
                }
            };

            if !decision.is_alertable() {
                continue;
            }

            if let Err(e) = self.notifier.notify(&target, metric, value, decision.level).await {
                tracing::error!(
                    target_id = %target.id,
                    metric = %metric,
                    stage = "notify",
                    error = %e,
                    "Alert notification failed"
                );
            }
        }
    }
}

/// Validates submissions and hands them to the worker pool
pub struct IngestDispatcher {
    directory: Arc<dyn Directory>,
    pool: Arc<WorkerPool>,
    pipeline: Arc<Pipeline>,
    missing_metric: MissingMetricPolicy,
}

impl IngestDispatcher {
    pub fn new(
        directory: Arc<dyn Directory>,
        pool: Arc<WorkerPool>,
        pipeline: Arc<Pipeline>,
        missing_metric: MissingMetricPolicy,
    ) -> Self {
        Self {
            directory,
            pool,
            pipeline,
            missing_metric,
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Accept one metrics submission.
    ///
    /// Validation and target resolution happen here; storage, evaluation and
    /// mail run later on the pool. Nothing is stored when this returns an error.
    pub async fn submit(
        &self,
        target_ref: TargetRef,
        metrics: &RawMetrics,
    ) -> Result<Accepted, IngestError> {
        if metrics.is_empty() {
            return Err(IngestError::Validation("metrics payload is empty".to_string()));
        }

        let target = self
            .directory
            .resolve_target(&target_ref)
            .await?
            .ok_or(IngestError::NotFound(target_ref))?;

        let normalized = normalize(metrics, self.missing_metric)?;
        for metric in &normalized.defaulted {
            tracing::debug!(
                target_id = %target.id,
                metric = %metric,
                "Metric missing from submission, recorded as 0"
            );
        }

        let recorded_at = Utc::now();
        let target_id = target.id;
        let sample = normalized.into_sample(target_id, recorded_at);

        let pipeline = Arc::clone(&self.pipeline);
        self.pool
            .try_submit(Box::pin(async move { pipeline.process(target, sample).await }))
            .map_err(|e| {
                tracing::warn!(target_id = %target_id, error = %e, "Submission rejected");
                IngestError::from(e)
            })?;

        Ok(Accepted {
            target_id,
            recorded_at,
        })
    }
}
