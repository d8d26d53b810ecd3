//! hostwatch: host health monitoring with sustained threshold alerting
//!
//! Collectors submit cpu, memory and disk utilization for known hosts. Each
//! accepted sample is stored and evaluated in the background; when a
//! threshold breach holds across the recent window, every recipient bound
//! to the host is e-mailed. Old samples are purged on a schedule.
//!
//! # Example
//!
//! ```no_run
//! use hostwatch::alerts::LogMailer;
//! use hostwatch::config::MonitorConfig;
//! use hostwatch::data::{Target, TargetId, TargetRef};
//! use hostwatch::directory::StaticDirectory;
//! use hostwatch::service::MonitorService;
//! use hostwatch::storage::InMemoryStore;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let directory = StaticDirectory::new().with_target(
//!     Target::new(1, "10.0.0.1".parse()?, "web-1"),
//!     vec!["ops@example.com".to_string()],
//! );
//! let service = MonitorService::new(
//!     MonitorConfig::default(),
//!     Arc::new(directory),
//!     Arc::new(LogMailer),
//!     Arc::new(InMemoryStore::new()),
//! )?;
//!
//! let metrics = serde_json::json!({"cpu": 91.5, "memory": 40, "disk": 12});
//! service
//!     .submit(TargetRef::Id(TargetId(1)), metrics.as_object().unwrap())
//!     .await?;
//!
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod config;
pub mod data;
pub mod directory;
pub mod ingest;
pub mod retention;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use config::{ConfigError, MonitorConfig};
pub use data::{MetricSample, MetricType, Target, TargetId, TargetRef};
pub use ingest::{Accepted, IngestError};
pub use service::{MonitorService, ServiceError};
pub use storage::{InMemoryStore, MetricStore, StorageError};
