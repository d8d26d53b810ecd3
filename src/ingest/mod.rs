//! Metric ingestion
//!
//! Submissions are validated and resolved on the caller's task, then handed
//! to a bounded worker pool that stores the sample and runs alerting.

pub mod dispatcher;
pub mod payload;
pub mod pool;

pub use dispatcher::{Accepted, IngestDispatcher, IngestError, Pipeline};
pub use payload::{normalize, target_ref, NormalizedMetrics, RawMetrics};
pub use pool::{PoolConfig, PoolError, ShutdownReport, WorkerPool};
