use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::data::{MetricSample, TargetId};

/// Append-only time-series persistence keyed by target.
///
/// Implementations must allow `append`, `window` and `purge` to interleave
/// from any number of threads. Rows are never updated in place.
pub trait MetricStore: Send + Sync {
    /// Durably record a sample
    fn append(&self, sample: MetricSample) -> Result<(), StorageError>;

    /// Most recent sample for a target by timestamp
    fn latest(&self, target_id: TargetId) -> Result<Option<MetricSample>, StorageError>;

    /// Samples with `timestamp >= since`, newest first
    fn window(&self, target_id: TargetId, since: DateTime<Utc>)
        -> Result<SampleWindow, StorageError>;

    /// Remove every sample with `timestamp < older_than`, returning how many went away
    fn purge(&self, older_than: DateTime<Utc>) -> Result<usize, StorageError>;

    /// Total number of stored samples
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Snapshot of a target's samples, newest first.
///
/// The snapshot is taken under the series lock, so every row is whole.
/// Iterating it again yields the same rows.
#[derive(Debug, Clone, Default)]
pub struct SampleWindow {
    samples: Vec<Arc<MetricSample>>,
}

impl SampleWindow {
    pub fn new(samples: Vec<Arc<MetricSample>>) -> Self {
        Self { samples }
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> + '_ {
        self.samples.iter().map(|s| &**s)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn to_vec(&self) -> Vec<MetricSample> {
        self.iter().cloned().collect()
    }
}

impl<'a> IntoIterator for &'a SampleWindow {
    type Item = &'a MetricSample;
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, Arc<MetricSample>>,
        fn(&'a Arc<MetricSample>) -> &'a MetricSample,
    >;

    fn into_iter(self) -> Self::IntoIter {
        let deref: fn(&'a Arc<MetricSample>) -> &'a MetricSample = |s| &**s;
        self.samples.iter().map(deref)
    }
}

/// Per-target series kept sorted ascending by timestamp
#[derive(Debug, Default)]
struct Series {
    samples: Vec<Arc<MetricSample>>,
}

impl Series {
    fn insert(&mut self, sample: MetricSample) {
        // Equal timestamps keep arrival order
        let idx = self
            .samples
            .partition_point(|s| s.timestamp <= sample.timestamp);
        self.samples.insert(idx, Arc::new(sample));
    }

    fn since(&self, since: DateTime<Utc>) -> Vec<Arc<MetricSample>> {
        let start = self.samples.partition_point(|s| s.timestamp < since);
        self.samples[start..].iter().rev().cloned().collect()
    }

    fn expire_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let end = self.samples.partition_point(|s| s.timestamp < cutoff);
        self.samples.drain(..end);
        end
    }
}

/// In-memory metric store
pub struct InMemoryStore {
    /// Series indexed by target
    series: DashMap<TargetId, Arc<RwLock<Series>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            series: DashMap::new(),
        }
    }

    /// Number of targets with a series (possibly empty after purges)
    pub fn target_count(&self) -> usize {
        self.series.len()
    }

    fn series_for(&self, target_id: TargetId) -> Option<Arc<RwLock<Series>>> {
        self.series.get(&target_id).map(|s| Arc::clone(s.value()))
    }

    fn get_or_create_series(&self, target_id: TargetId) -> Arc<RwLock<Series>> {
        if let Some(series) = self.series_for(target_id) {
            return series;
        }
        Arc::clone(self.series.entry(target_id).or_default().value())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricStore for InMemoryStore {
    fn append(&self, sample: MetricSample) -> Result<(), StorageError> {
        let series = self.get_or_create_series(sample.target_id);
        series.write().insert(sample);
        Ok(())
    }

    fn latest(&self, target_id: TargetId) -> Result<Option<MetricSample>, StorageError> {
        let Some(series) = self.series_for(target_id) else {
            return Ok(None);
        };
        let guard = series.read();
        Ok(guard.samples.last().map(|s| MetricSample::clone(s)))
    }

    fn window(
        &self,
        target_id: TargetId,
        since: DateTime<Utc>,
    ) -> Result<SampleWindow, StorageError> {
        let Some(series) = self.series_for(target_id) else {
            return Ok(SampleWindow::default());
        };
        let samples = series.read().since(since);
        Ok(SampleWindow::new(samples))
    }

    fn purge(&self, older_than: DateTime<Utc>) -> Result<usize, StorageError> {
        // Collect handles first so no map shard lock is held while series locks are taken.
        // Empty series are left in place: an append may hold a handle to them.
        let all: Vec<Arc<RwLock<Series>>> =
            self.series.iter().map(|e| Arc::clone(e.value())).collect();

        let removed = all
            .iter()
            .map(|series| series.write().expire_before(older_than))
            .sum();

        Ok(removed)
    }

    fn len(&self) -> usize {
        let all: Vec<Arc<RwLock<Series>>> =
            self.series.iter().map(|e| Arc::clone(e.value())).collect();
        all.iter().map(|s| s.read().samples.len()).sum()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("Storage I/O error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(target: u64, timestamp: DateTime<Utc>, cpu: f64) -> MetricSample {
        MetricSample::new(TargetId(target), timestamp, cpu, 10.0, 20.0)
    }

    #[test]
    fn test_append_then_window_includes_sample_once() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        store.append(sample(1, now, 42.0)).unwrap();

        let window = store.window(TargetId(1), DateTime::<Utc>::MIN_UTC).unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window.iter().filter(|s| s.cpu == 42.0).count(), 1);
    }

    #[test]
    fn test_window_is_newest_first_and_bounded() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        for i in 0..5 {
            store
                .append(sample(1, now - Duration::seconds(i * 30), i as f64))
                .unwrap();
        }

        let window = store.window(TargetId(1), now - Duration::seconds(60)).unwrap();
        let cpus: Vec<f64> = window.iter().map(|s| s.cpu).collect();
        assert_eq!(cpus, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_window_is_restartable() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store.append(sample(1, now, 1.0)).unwrap();
        store.append(sample(1, now, 2.0)).unwrap();

        let window = store.window(TargetId(1), now - Duration::minutes(1)).unwrap();
        let first: Vec<f64> = window.iter().map(|s| s.cpu).collect();
        let second: Vec<f64> = (&window).into_iter().map(|s| s.cpu).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_out_of_order_appends_are_sorted() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        store.append(sample(1, now, 3.0)).unwrap();
        store.append(sample(1, now - Duration::seconds(20), 1.0)).unwrap();
        store.append(sample(1, now - Duration::seconds(10), 2.0)).unwrap();

        let latest = store.latest(TargetId(1)).unwrap().unwrap();
        assert_eq!(latest.cpu, 3.0);

        let window = store.window(TargetId(1), now - Duration::minutes(1)).unwrap();
        let cpus: Vec<f64> = window.iter().map(|s| s.cpu).collect();
        assert_eq!(cpus, vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_latest_and_window_for_unknown_target() {
        let store = InMemoryStore::new();
        assert!(store.latest(TargetId(99)).unwrap().is_none());
        assert!(store.window(TargetId(99), Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn test_targets_are_isolated() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store.append(sample(1, now, 1.0)).unwrap();
        store.append(sample(2, now, 2.0)).unwrap();

        assert_eq!(store.latest(TargetId(1)).unwrap().unwrap().cpu, 1.0);
        assert_eq!(store.latest(TargetId(2)).unwrap().unwrap().cpu, 2.0);
        assert_eq!(store.target_count(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_purge_is_idempotent() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        store.append(sample(1, now - Duration::days(10), 1.0)).unwrap();
        store.append(sample(1, now - Duration::days(9), 2.0)).unwrap();
        store.append(sample(2, now - Duration::days(8), 3.0)).unwrap();
        store.append(sample(1, now, 4.0)).unwrap();

        let cutoff = now - Duration::days(7);
        assert_eq!(store.purge(cutoff).unwrap(), 3);
        assert_eq!(store.purge(cutoff).unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_purge_keeps_samples_at_cutoff() {
        let store = InMemoryStore::new();
        let cutoff = Utc::now();

        store.append(sample(1, cutoff, 1.0)).unwrap();
        store.append(sample(1, cutoff - Duration::milliseconds(1), 2.0)).unwrap();

        assert_eq!(store.purge(cutoff).unwrap(), 1);
        assert_eq!(store.latest(TargetId(1)).unwrap().unwrap().cpu, 1.0);
    }

    #[test]
    fn test_concurrent_appends() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        // Half the threads share target 0
                        let target = if t % 2 == 0 { 0 } else { t };
                        store
                            .append(sample(target, now + Duration::milliseconds(i), i as f64))
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 800);
        let window = store.window(TargetId(0), DateTime::<Utc>::MIN_UTC).unwrap();
        assert_eq!(window.len(), 400);
        let timestamps: Vec<_> = window.iter().map(|s| s.timestamp).collect();
        assert!(timestamps.windows(2).all(|w| w[0] >= w[1]));
    }
}
