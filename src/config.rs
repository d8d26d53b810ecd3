//! Service configuration
//!
//! Everything is read from environment variables and validated once at
//! startup, so a bad threshold set or pool size stops the process before it
//! accepts any traffic.
//!
//! | Variable                            | Default          |
//! |-------------------------------------|------------------|
//! | `HOSTWATCH_HOST`                    | `0.0.0.0`        |
//! | `HOSTWATCH_PORT`                    | `5000`           |
//! | `HOSTWATCH_WORKERS`                 | `10`             |
//! | `HOSTWATCH_QUEUE_CAPACITY`          | `1024`           |
//! | `HOSTWATCH_SHUTDOWN_GRACE_SECS`     | `30`             |
//! | `HOSTWATCH_CPU_THRESHOLDS`          | `70,85,95`       |
//! | `HOSTWATCH_MEMORY_THRESHOLDS`       | `75,90,95`       |
//! | `HOSTWATCH_DISK_THRESHOLDS`         | `80,90,95`       |
//! | `HOSTWATCH_ALERT_WINDOW_SECS`       | `120`            |
//! | `HOSTWATCH_ALERT_MIN_SAMPLES`       | `3`              |
//! | `HOSTWATCH_ALERT_SUSTAIN_RATIO`     | `0.8`            |
//! | `HOSTWATCH_MISSING_METRIC`          | `zero`           |
//! | `HOSTWATCH_MAIL_TIMEOUT_SECS`       | `10`             |
//! | `HOSTWATCH_RETENTION_DAYS`          | `7`              |
//! | `HOSTWATCH_RETENTION_INTERVAL_SECS` | `3600`           |
//! | `HOSTWATCH_DIRECTORY_FILE`          | unset (empty)    |
//!
//! SMTP settings are described in [`crate::alerts::mailer::SmtpConfig`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::alerts::config::{AlertSettings, ThresholdSet, Thresholds};
use crate::alerts::mailer::SmtpConfig;
use crate::data::MetricType;
use crate::ingest::pool::PoolConfig;

/// What to do when a submission omits one of the three metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingMetricPolicy {
    /// Record the missing metric as 0.0. This can hide a collector that
    /// stopped reporting a metric, so every defaulted value is logged.
    #[default]
    Zero,
    /// Reject the submission with a validation error
    Reject,
}

impl FromStr for MissingMetricPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zero" => Ok(MissingMetricPolicy::Zero),
            "reject" => Ok(MissingMetricPolicy::Reject),
            other => Err(ConfigError::Invalid(format!(
                "unknown missing-metric policy '{}', expected 'zero' or 'reject'",
                other
            ))),
        }
    }
}

/// Retention schedule for the background reaper
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetentionConfig {
    pub horizon: chrono::Duration,
    pub check_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            horizon: chrono::Duration::days(7),
            check_interval: Duration::from_secs(3600),
        }
    }
}

/// Top-level service configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub host: String,
    pub port: u16,
    pub thresholds: Thresholds,
    pub alert: AlertSettings,
    pub pool: PoolConfig,
    pub missing_metric: MissingMetricPolicy,
    pub mail_timeout: Duration,
    pub shutdown_grace: Duration,
    pub retention: RetentionConfig,
    pub smtp: Option<SmtpConfig>,
    pub directory_file: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            thresholds: Thresholds::default(),
            alert: AlertSettings::default(),
            pool: PoolConfig::default(),
            missing_metric: MissingMetricPolicy::default(),
            mail_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(30),
            retention: RetentionConfig::default(),
            smtp: None,
            directory_file: None,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from the process environment and validate it
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("HOSTWATCH_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_var(&lookup, "HOSTWATCH_PORT")? {
            config.port = port;
        }
        if let Some(workers) = parse_var(&lookup, "HOSTWATCH_WORKERS")? {
            config.pool.workers = workers;
        }
        if let Some(capacity) = parse_var(&lookup, "HOSTWATCH_QUEUE_CAPACITY")? {
            config.pool.queue_capacity = capacity;
        }
        if let Some(secs) = parse_var(&lookup, "HOSTWATCH_SHUTDOWN_GRACE_SECS")? {
            config.shutdown_grace = Duration::from_secs(secs);
        }

        for metric in MetricType::ALL {
            let key = format!("HOSTWATCH_{}_THRESHOLDS", metric.as_str().to_ascii_uppercase());
            if let Some(raw) = lookup(&key) {
                let set = parse_threshold_set(&raw).map_err(|e| match e {
                    ConfigError::InvalidThresholds(msg) => {
                        ConfigError::InvalidThresholds(format!("{}: {}", key, msg))
                    }
                    other => other,
                })?;
                config.thresholds.set_metric(metric, set);
            }
        }

        if let Some(secs) = parse_var(&lookup, "HOSTWATCH_ALERT_WINDOW_SECS")? {
            config.alert.window = Duration::from_secs(secs);
        }
        if let Some(min) = parse_var(&lookup, "HOSTWATCH_ALERT_MIN_SAMPLES")? {
            config.alert.min_samples = min;
        }
        if let Some(ratio) = parse_var(&lookup, "HOSTWATCH_ALERT_SUSTAIN_RATIO")? {
            config.alert.sustain_ratio = ratio;
        }
        if let Some(policy) = lookup("HOSTWATCH_MISSING_METRIC") {
            config.missing_metric = policy.parse()?;
        }
        if let Some(secs) = parse_var(&lookup, "HOSTWATCH_MAIL_TIMEOUT_SECS")? {
            config.mail_timeout = Duration::from_secs(secs);
        }
        if let Some(days) = parse_var::<_, i64>(&lookup, "HOSTWATCH_RETENTION_DAYS")? {
            config.retention.horizon = chrono::Duration::try_days(days).ok_or_else(|| {
                ConfigError::Invalid(format!("HOSTWATCH_RETENTION_DAYS {} is out of range", days))
            })?;
        }
        if let Some(secs) = parse_var(&lookup, "HOSTWATCH_RETENTION_INTERVAL_SECS")? {
            config.retention.check_interval = Duration::from_secs(secs);
        }

        config.directory_file = lookup("HOSTWATCH_DIRECTORY_FILE").map(PathBuf::from);
        config.smtp = SmtpConfig::from_lookup(&lookup)?;

        config.validate()?;
        Ok(config)
    }

    /// Check every setting; called by `from_env` and by the service constructor
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        self.alert.validate()?;
        self.pool.validate()?;

        if self.mail_timeout.is_zero() {
            return Err(ConfigError::Invalid("mail timeout must be positive".into()));
        }
        if self.retention.horizon <= chrono::Duration::zero() {
            return Err(ConfigError::Invalid(
                "retention horizon must be positive".into(),
            ));
        }
        if self.retention.check_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "retention check interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Parse {
                key: key.to_string(),
                value: raw,
            }),
    }
}

/// Parse `"warning,critical,emergency"`
fn parse_threshold_set(raw: &str) -> Result<ThresholdSet, ConfigError> {
    let values: Vec<f64> = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| ConfigError::InvalidThresholds(format!("'{}' is not a number list", raw)))?;

    match values.as_slice() {
        [warning, critical, emergency] => ThresholdSet::new(*warning, *critical, *emergency),
        _ => Err(ConfigError::InvalidThresholds(format!(
            "expected three comma-separated values, got '{}'",
            raw
        ))),
    }
}

/// Configuration errors, raised at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid thresholds: {0}")]
    InvalidThresholds(String),

    #[error("Cannot parse {key}='{value}'")]
    Parse { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Directory file error: {0}")]
    Directory(String),
}
