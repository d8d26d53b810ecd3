use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::storage::{MetricStore, StorageError};

/// Purges samples that have aged past the retention horizon
#[derive(Clone)]
pub struct RetentionReaper {
    store: Arc<dyn MetricStore>,
}

impl RetentionReaper {
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self { store }
    }

    /// Remove every sample recorded strictly before `now - horizon`.
    ///
    /// Returns the number of samples removed. Running it twice with the same
    /// arguments removes nothing the second time.
    pub fn reap(&self, horizon: Duration, now: DateTime<Utc>) -> Result<usize, StorageError> {
        if horizon <= Duration::zero() {
            tracing::warn!(?horizon, "Ignoring non-positive retention horizon");
            return Ok(0);
        }

        let cutoff = now
            .checked_sub_signed(horizon)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let removed = self.store.purge(cutoff)?;

        if removed > 0 {
            tracing::info!(removed, %cutoff, "Purged expired samples");
        } else {
            tracing::debug!(%cutoff, "No expired samples");
        }
        Ok(removed)
    }
}
