//! Retention of stored samples
//!
//! [`RetentionReaper`] removes samples older than a horizon when asked;
//! [`RetentionWorker`] asks it on a fixed interval.

pub mod reaper;
pub mod worker;

pub use reaper::RetentionReaper;
pub use worker::RetentionWorker;
