//! Threshold classification and sustained-breach detection

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::config::{AlertDecision, AlertLevel, AlertSettings, ThresholdSet};
use crate::data::{MetricType, TargetId};
use crate::storage::{MetricStore, StorageError};

/// Classifies metric values and confirms breaches against the recent window.
///
/// A single sample over a threshold is never enough to alert: the breach must
/// be seen in at least `sustain_ratio` of the samples recorded in the last
/// `window`, and the window must contain at least `min_samples` samples.
pub struct AlertEvaluator {
    store: Arc<dyn MetricStore>,
    settings: AlertSettings,
}

impl AlertEvaluator {
    pub fn new(store: Arc<dyn MetricStore>, settings: AlertSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &AlertSettings {
        &self.settings
    }

    /// Map a value onto a severity tier. Each tier includes its lower edge.
    pub fn classify(value: f64, thresholds: &ThresholdSet) -> AlertLevel {
        if value >= thresholds.emergency {
            AlertLevel::Emergency
        } else if value >= thresholds.critical {
            AlertLevel::Critical
        } else if value >= thresholds.warning {
            AlertLevel::Warning
        } else {
            AlertLevel::None
        }
    }

    /// Whether `level` has held for the target over the evaluation window.
    ///
    /// Every sample in the window is compared against the cutoff of `level`
    /// itself, not re-classified on its own.
    pub fn is_sustained(
        &self,
        target_id: TargetId,
        metric: MetricType,
        level: AlertLevel,
        thresholds: &ThresholdSet,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let Some(cutoff) = thresholds.threshold_for(level) else {
            return Ok(false);
        };

        let window = self.store.window(target_id, self.window_start(now))?;
        if window.len() < self.settings.min_samples {
            tracing::debug!(
                target_id = %target_id,
                metric = %metric,
                samples = window.len(),
                "Not enough samples to confirm breach"
            );
            return Ok(false);
        }

        let breaching = window.iter().filter(|s| s.value(metric) >= cutoff).count();
        let ratio = breaching as f64 / window.len() as f64;

        tracing::debug!(
            target_id = %target_id,
            metric = %metric,
            level = %level,
            breaching,
            samples = window.len(),
            ratio,
            "Evaluated breach window"
        );

        Ok(breaching as f64 >= window.len() as f64 * self.settings.sustain_ratio)
    }

    /// Classify `value` and, if it breaches, check whether the breach is sustained
    pub fn evaluate(
        &self,
        target_id: TargetId,
        metric: MetricType,
        value: f64,
        thresholds: &ThresholdSet,
        now: DateTime<Utc>,
    ) -> Result<AlertDecision, StorageError> {
        let level = Self::classify(value, thresholds);

        let sustained = if level == AlertLevel::None {
            false
        } else {
            self.is_sustained(target_id, metric, level, thresholds, now)?
        };

        Ok(AlertDecision {
            target_id,
            metric,
            level,
            sustained,
        })
    }

    fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.settings.window)
            .ok()
            .and_then(|w| now.checked_sub_signed(w))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MetricSample;
    use crate::storage::{InMemoryStore, SampleWindow};
    use chrono::Duration;

    fn thresholds() -> ThresholdSet {
        ThresholdSet::new(70.0, 85.0, 95.0).unwrap()
    }

    /// Store `cpu_values` (newest first) at 10 second spacing before `now`
    fn store_with(cpu_values: &[f64], now: DateTime<Utc>) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for (i, cpu) in cpu_values.iter().enumerate() {
            let ts = now - Duration::seconds(i as i64 * 10);
            store
                .append(MetricSample::new(TargetId(1), ts, *cpu, 0.0, 0.0))
                .unwrap();
        }
        store
    }

    fn evaluator(store: Arc<InMemoryStore>) -> AlertEvaluator {
        AlertEvaluator::new(store, AlertSettings::default())
    }

    #[test]
    fn test_classify_tiers_inclusive_at_lower_edge() {
        let t = thresholds();
        assert_eq!(AlertEvaluator::classify(0.0, &t), AlertLevel::None);
        assert_eq!(AlertEvaluator::classify(69.99, &t), AlertLevel::None);
        assert_eq!(AlertEvaluator::classify(70.0, &t), AlertLevel::Warning);
        assert_eq!(AlertEvaluator::classify(84.99, &t), AlertLevel::Warning);
        assert_eq!(AlertEvaluator::classify(85.0, &t), AlertLevel::Critical);
        assert_eq!(AlertEvaluator::classify(94.99, &t), AlertLevel::Critical);
        assert_eq!(AlertEvaluator::classify(95.0, &t), AlertLevel::Emergency);
        assert_eq!(AlertEvaluator::classify(100.0, &t), AlertLevel::Emergency);
    }

    #[test]
    fn test_sustained_breach_fires() {
        let now = Utc::now();
        let eval = evaluator(store_with(&[90.0; 5], now));

        let decision = eval
            .evaluate(TargetId(1), MetricType::Cpu, 90.0, &thresholds(), now)
            .unwrap();
        assert_eq!(decision.level, AlertLevel::Critical);
        assert!(decision.sustained);
        assert!(decision.is_alertable());
    }

    #[test]
    fn test_single_spike_is_suppressed() {
        let now = Utc::now();
        let eval = evaluator(store_with(&[60.0, 60.0, 92.0, 60.0, 60.0], now));

        let decision = eval
            .evaluate(TargetId(1), MetricType::Cpu, 92.0, &thresholds(), now)
            .unwrap();
        assert_eq!(decision.level, AlertLevel::Critical);
        assert!(!decision.sustained);
        assert!(!decision.is_alertable());
    }

    #[test]
    fn test_two_samples_never_escalate() {
        let now = Utc::now();
        let eval = evaluator(store_with(&[99.0, 99.0], now));

        let decision = eval
            .evaluate(TargetId(1), MetricType::Cpu, 99.0, &thresholds(), now)
            .unwrap();
        assert_eq!(decision.level, AlertLevel::Emergency);
        assert!(!decision.is_alertable());
    }

    #[test]
    fn test_ratio_boundary_is_inclusive() {
        let now = Utc::now();

        // 4 of 5 = 0.8
        let eval = evaluator(store_with(&[90.0, 90.0, 90.0, 90.0, 10.0], now));
        assert!(eval
            .is_sustained(TargetId(1), MetricType::Cpu, AlertLevel::Critical, &thresholds(), now)
            .unwrap());

        // 3 of 5 = 0.6
        let eval = evaluator(store_with(&[90.0, 90.0, 90.0, 10.0, 10.0], now));
        assert!(!eval
            .is_sustained(TargetId(1), MetricType::Cpu, AlertLevel::Critical, &thresholds(), now)
            .unwrap());
    }

    /// `breaching` of `total` samples at 90% cpu, the rest at 10%, all inside the window
    fn store_with_ratio(breaching: i64, total: i64, now: DateTime<Utc>) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..total {
            let cpu = if i < breaching { 90.0 } else { 10.0 };
            store
                .append(MetricSample::new(
                    TargetId(1),
                    now - Duration::milliseconds(i * 100),
                    cpu,
                    0.0,
                    0.0,
                ))
                .unwrap();
        }
        store
    }

    #[test]
    fn test_ratio_just_below_boundary() {
        let now = Utc::now();

        let eval = evaluator(store_with_ratio(79, 100, now));
        assert!(!eval
            .is_sustained(TargetId(1), MetricType::Cpu, AlertLevel::Critical, &thresholds(), now)
            .unwrap());

        let eval = evaluator(store_with_ratio(80, 100, now));
        assert!(eval
            .is_sustained(TargetId(1), MetricType::Cpu, AlertLevel::Critical, &thresholds(), now)
            .unwrap());
    }

    #[test]
    fn test_checks_against_triggering_level_threshold() {
        // Samples are all warning-level; a critical candidate is not sustained
        let now = Utc::now();
        let eval = evaluator(store_with(&[75.0, 75.0, 75.0, 75.0], now));

        assert!(eval
            .is_sustained(TargetId(1), MetricType::Cpu, AlertLevel::Warning, &thresholds(), now)
            .unwrap());
        assert!(!eval
            .is_sustained(TargetId(1), MetricType::Cpu, AlertLevel::Critical, &thresholds(), now)
            .unwrap());
    }

    #[test]
    fn test_samples_outside_window_are_ignored() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());
        // Old breaching samples beyond the two minute window
        for i in 0..5 {
            store
                .append(MetricSample::new(
                    TargetId(1),
                    now - Duration::minutes(10) - Duration::seconds(i),
                    90.0,
                    0.0,
                    0.0,
                ))
                .unwrap();
        }
        store
            .append(MetricSample::new(TargetId(1), now, 90.0, 0.0, 0.0))
            .unwrap();

        let eval = evaluator(store);
        assert!(!eval
            .is_sustained(TargetId(1), MetricType::Cpu, AlertLevel::Critical, &thresholds(), now)
            .unwrap());
    }

    #[test]
    fn test_metric_isolation() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());
        for i in 0..4 {
            store
                .append(MetricSample::new(
                    TargetId(1),
                    now - Duration::seconds(i),
                    10.0,
                    96.0,
                    10.0,
                ))
                .unwrap();
        }
        let eval = evaluator(store);

        let memory = eval
            .evaluate(TargetId(1), MetricType::Memory, 96.0, &thresholds(), now)
            .unwrap();
        assert!(memory.is_alertable());

        let cpu = eval
            .evaluate(TargetId(1), MetricType::Cpu, 10.0, &thresholds(), now)
            .unwrap();
        assert_eq!(cpu.level, AlertLevel::None);
        assert!(!cpu.is_alertable());
    }

    struct FailingStore;

    impl MetricStore for FailingStore {
        fn append(&self, _: MetricSample) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("down".into()))
        }
        fn latest(&self, _: TargetId) -> Result<Option<MetricSample>, StorageError> {
            Err(StorageError::Unavailable("down".into()))
        }
        fn window(&self, _: TargetId, _: DateTime<Utc>) -> Result<SampleWindow, StorageError> {
            Err(StorageError::Unavailable("down".into()))
        }
        fn purge(&self, _: DateTime<Utc>) -> Result<usize, StorageError> {
            Err(StorageError::Unavailable("down".into()))
        }
        fn len(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_non_breaching_value_skips_store() {
        let eval = AlertEvaluator::new(Arc::new(FailingStore), AlertSettings::default());
        let decision = eval
            .evaluate(TargetId(1), MetricType::Disk, 12.0, &thresholds(), Utc::now())
            .unwrap();
        assert_eq!(decision.level, AlertLevel::None);
    }

    #[test]
    fn test_store_error_propagates() {
        let eval = AlertEvaluator::new(Arc::new(FailingStore), AlertSettings::default());
        let result = eval.evaluate(TargetId(1), MetricType::Disk, 99.0, &thresholds(), Utc::now());
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
    }
}
