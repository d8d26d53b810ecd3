pub mod sample;

pub use sample::{MetricSample, MetricType, Target, TargetId, TargetRef};
