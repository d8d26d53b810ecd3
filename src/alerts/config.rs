//! Alert configuration types

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::data::{MetricType, TargetId};

/// Severity of a threshold breach, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    None,
    Warning,
    Critical,
    Emergency,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::None => "none",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
            AlertLevel::Emergency => "emergency",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Warning/critical/emergency cutoffs for one metric, in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub warning: f64,
    pub critical: f64,
    pub emergency: f64,
}

impl ThresholdSet {
    /// Build a threshold set, rejecting tiers that are out of range or not strictly increasing
    pub fn new(warning: f64, critical: f64, emergency: f64) -> Result<Self, ConfigError> {
        let set = Self {
            warning,
            critical,
            emergency,
        };
        set.validate()?;
        Ok(set)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (tier, value) in [
            ("warning", self.warning),
            ("critical", self.critical),
            ("emergency", self.emergency),
        ] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::InvalidThresholds(format!(
                    "{} threshold {} is outside [0, 100]",
                    tier, value
                )));
            }
        }

        if !(self.warning < self.critical && self.critical < self.emergency) {
            return Err(ConfigError::InvalidThresholds(format!(
                "tiers must be strictly increasing, got warning={} critical={} emergency={}",
                self.warning, self.critical, self.emergency
            )));
        }

        Ok(())
    }

    /// Cutoff that triggers the given level (`None` for `AlertLevel::None`)
    pub fn threshold_for(&self, level: AlertLevel) -> Option<f64> {
        match level {
            AlertLevel::None => None,
            AlertLevel::Warning => Some(self.warning),
            AlertLevel::Critical => Some(self.critical),
            AlertLevel::Emergency => Some(self.emergency),
        }
    }
}

/// One threshold set per metric type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub cpu: ThresholdSet,
    pub memory: ThresholdSet,
    pub disk: ThresholdSet,
}

impl Thresholds {
    pub fn for_metric(&self, metric: MetricType) -> &ThresholdSet {
        match metric {
            MetricType::Cpu => &self.cpu,
            MetricType::Memory => &self.memory,
            MetricType::Disk => &self.disk,
        }
    }

    pub fn set_metric(&mut self, metric: MetricType, set: ThresholdSet) {
        match metric {
            MetricType::Cpu => self.cpu = set,
            MetricType::Memory => self.memory = set,
            MetricType::Disk => self.disk = set,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for metric in MetricType::ALL {
            self.for_metric(metric).validate().map_err(|e| match e {
                ConfigError::InvalidThresholds(msg) => {
                    ConfigError::InvalidThresholds(format!("{}: {}", metric, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu: ThresholdSet {
                warning: 70.0,
                critical: 85.0,
                emergency: 95.0,
            },
            memory: ThresholdSet {
                warning: 75.0,
                critical: 90.0,
                emergency: 95.0,
            },
            disk: ThresholdSet {
                warning: 80.0,
                critical: 90.0,
                emergency: 95.0,
            },
        }
    }
}

/// Parameters of the sustained-breach gate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertSettings {
    /// How far back the evaluator looks
    pub window: Duration,
    /// Fewer samples than this in the window never escalate
    pub min_samples: usize,
    /// Fraction of window samples that must meet the threshold (inclusive)
    pub sustain_ratio: f64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(120),
            min_samples: 3,
            sustain_ratio: 0.8,
        }
    }
}

impl AlertSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.is_zero() {
            return Err(ConfigError::Invalid("alert window must be positive".into()));
        }
        if self.min_samples == 0 {
            return Err(ConfigError::Invalid(
                "alert min_samples must be at least 1".into(),
            ));
        }
        if !(self.sustain_ratio > 0.0 && self.sustain_ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "alert sustain_ratio {} must be in (0, 1]",
                self.sustain_ratio
            )));
        }
        Ok(())
    }
}

/// Message templates per alert level.
///
/// Placeholders: `{target_name}`, `{metric_type}`, `{value}`, `{threshold}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTemplates {
    pub warning: String,
    pub critical: String,
    pub emergency: String,
}

impl Default for AlertTemplates {
    fn default() -> Self {
        Self {
            warning: "[WARNING] Host {target_name} {metric_type} usage is {value}%, above the warning threshold of {threshold}%".to_string(),
            critical: "[CRITICAL] Host {target_name} {metric_type} usage is {value}%, above the critical threshold of {threshold}%".to_string(),
            emergency: "[EMERGENCY] Host {target_name} {metric_type} usage is {value}%, above the emergency threshold of {threshold}%".to_string(),
        }
    }
}

impl AlertTemplates {
    pub fn for_level(&self, level: AlertLevel) -> Option<&str> {
        match level {
            AlertLevel::None => None,
            AlertLevel::Warning => Some(&self.warning),
            AlertLevel::Critical => Some(&self.critical),
            AlertLevel::Emergency => Some(&self.emergency),
        }
    }
}

/// Outcome of evaluating one metric of one sample. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertDecision {
    pub target_id: TargetId,
    pub metric: MetricType,
    pub level: AlertLevel,
    pub sustained: bool,
}

impl AlertDecision {
    /// A decision is alertable only when a breach is confirmed by the window
    pub fn is_alertable(&self) -> bool {
        self.level != AlertLevel::None && self.sustained
    }
}
