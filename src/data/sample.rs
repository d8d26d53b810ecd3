use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Identifier of a monitored host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub u64);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TargetId {
    fn from(id: u64) -> Self {
        TargetId(id)
    }
}

/// A monitored host as known to the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub ip_address: IpAddr,
    pub name: String,
}

impl Target {
    pub fn new(id: impl Into<TargetId>, ip_address: IpAddr, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ip_address,
            name: name.into(),
        }
    }
}

/// How a caller names a target: by id or by IP address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRef {
    Id(TargetId),
    Ip(IpAddr),
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetRef::Id(id) => write!(f, "id {}", id),
            TargetRef::Ip(ip) => write!(f, "ip {}", ip),
        }
    }
}

/// Utilization metric carried by every sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Cpu,
    Memory,
    Disk,
}

impl MetricType {
    pub const ALL: [MetricType; 3] = [MetricType::Cpu, MetricType::Memory, MetricType::Disk];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Cpu => "cpu",
            MetricType::Memory => "memory",
            MetricType::Disk => "disk",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped reading of cpu/memory/disk utilization (percent).
///
/// Samples are immutable once created; the store only appends and purges them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub target_id: TargetId,
    pub timestamp: DateTime<Utc>,
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
}

impl MetricSample {
    pub fn new(
        target_id: TargetId,
        timestamp: DateTime<Utc>,
        cpu: f64,
        memory: f64,
        disk: f64,
    ) -> Self {
        Self {
            target_id,
            timestamp,
            cpu,
            memory,
            disk,
        }
    }

    /// Value of a single metric
    pub fn value(&self, metric: MetricType) -> f64 {
        match metric {
            MetricType::Cpu => self.cpu,
            MetricType::Memory => self.memory,
            MetricType::Disk => self.disk,
        }
    }
}
