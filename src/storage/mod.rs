pub mod engine;

pub use engine::{InMemoryStore, MetricStore, SampleWindow, StorageError};
