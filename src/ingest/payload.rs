//! Submission payload normalization
//!
//! Collectors send metrics under either the long (`cpu_value`) or the short
//! (`cpu`) key. This is the only place aliases are resolved; everything
//! downstream sees a canonical [`MetricSample`].

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};

use super::dispatcher::IngestError;
use crate::config::MissingMetricPolicy;
use crate::data::{MetricSample, MetricType, TargetId, TargetRef};

/// Metric payload exactly as submitted
pub type RawMetrics = Map<String, JsonValue>;

/// Accepted keys per metric, in lookup order
fn keys_for(metric: MetricType) -> [&'static str; 2] {
    match metric {
        MetricType::Cpu => ["cpu_value", "cpu"],
        MetricType::Memory => ["memory_value", "memory"],
        MetricType::Disk => ["disk_value", "disk"],
    }
}

/// Canonical metric values of one submission
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMetrics {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    /// Metrics absent from the payload that were filled in with 0.0
    pub defaulted: Vec<MetricType>,
}

impl NormalizedMetrics {
    pub fn into_sample(self, target_id: TargetId, timestamp: DateTime<Utc>) -> MetricSample {
        MetricSample::new(target_id, timestamp, self.cpu, self.memory, self.disk)
    }
}

/// Build a target reference from the optional id / IP pair of a request.
/// The id wins when both are present.
pub fn target_ref(target_id: Option<u64>, ip_address: Option<&str>) -> Result<TargetRef, IngestError> {
    if let Some(id) = target_id {
        return Ok(TargetRef::Id(TargetId(id)));
    }

    match ip_address.map(str::trim) {
        Some(ip) if !ip.is_empty() => ip
            .parse::<IpAddr>()
            .map(TargetRef::Ip)
            .map_err(|_| IngestError::Validation(format!("'{}' is not a valid IP address", ip))),
        _ => Err(IngestError::Validation(
            "either target_id or ip_address is required".to_string(),
        )),
    }
}

/// Resolve aliases, parse and range-check every metric
pub fn normalize(
    raw: &RawMetrics,
    policy: MissingMetricPolicy,
) -> Result<NormalizedMetrics, IngestError> {
    if raw.is_empty() {
        return Err(IngestError::Validation("metrics payload is empty".to_string()));
    }

    let mut values = [0.0; 3];
    let mut defaulted = Vec::new();

    for (slot, metric) in MetricType::ALL.into_iter().enumerate() {
        let found = keys_for(metric)
            .into_iter()
            .find_map(|key| raw.get(key).map(|v| (key, v)));

        match found {
            Some((key, value)) => values[slot] = parse_percent(key, value)?,
            None => match policy {
                MissingMetricPolicy::Zero => defaulted.push(metric),
                MissingMetricPolicy::Reject => {
                    return Err(IngestError::Validation(format!(
                        "metric '{}' is missing",
                        metric
                    )))
                }
            },
        }
    }

    if defaulted.len() == MetricType::ALL.len() {
        return Err(IngestError::Validation(
            "metrics payload contains no cpu, memory or disk value".to_string(),
        ));
    }

    let [cpu, memory, disk] = values;
    Ok(NormalizedMetrics {
        cpu,
        memory,
        disk,
        defaulted,
    })
}

/// Accept a JSON number or a numeric string in [0, 100]; keep two decimals
fn parse_percent(key: &str, value: &JsonValue) -> Result<f64, IngestError> {
    let parsed = match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    let v = parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| IngestError::Validation(format!("'{}' must be a number, got {}", key, value)))?;

    if !(0.0..=100.0).contains(&v) {
        return Err(IngestError::Validation(format!(
            "'{}' must be between 0 and 100, got {}",
            key, v
        )));
    }

    Ok((v * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: JsonValue) -> RawMetrics {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_short_keys() {
        let m = normalize(
            &raw(json!({"cpu": 12.5, "memory": 40, "disk": 77.25})),
            MissingMetricPolicy::Zero,
        )
        .unwrap();
        assert_eq!((m.cpu, m.memory, m.disk), (12.5, 40.0, 77.25));
        assert!(m.defaulted.is_empty());
    }

    #[test]
    fn test_long_keys_take_precedence() {
        let m = normalize(
            &raw(json!({"cpu": 1.0, "cpu_value": 2.0, "memory_value": 3.0, "disk": 4.0})),
            MissingMetricPolicy::Zero,
        )
        .unwrap();
        assert_eq!(m.cpu, 2.0);
        assert_eq!(m.memory, 3.0);
        assert_eq!(m.disk, 4.0);
    }

    #[test]
    fn test_missing_metric_defaults_to_zero() {
        let m = normalize(&raw(json!({"cpu": 55.0})), MissingMetricPolicy::Zero).unwrap();
        assert_eq!(m.memory, 0.0);
        assert_eq!(m.disk, 0.0);
        assert_eq!(m.defaulted, vec![MetricType::Memory, MetricType::Disk]);
    }

    #[test]
    fn test_missing_metric_rejected_by_policy() {
        let err = normalize(&raw(json!({"cpu": 55.0})), MissingMetricPolicy::Reject).unwrap_err();
        assert!(matches!(err, IngestError::Validation(msg) if msg.contains("memory")));
    }

    #[test]
    fn test_empty_and_unrecognized_payloads() {
        assert!(matches!(
            normalize(&RawMetrics::new(), MissingMetricPolicy::Zero),
            Err(IngestError::Validation(_))
        ));
        assert!(matches!(
            normalize(&raw(json!({"load": 3.0})), MissingMetricPolicy::Zero),
            Err(IngestError::Validation(_))
        ));
    }

    #[test]
    fn test_numeric_strings_and_rounding() {
        let m = normalize(
            &raw(json!({"cpu": "33.456", "memory": 10, "disk": 20})),
            MissingMetricPolicy::Zero,
        )
        .unwrap();
        assert_eq!(m.cpu, 33.46);
    }

    #[test]
    fn test_out_of_range_and_non_numeric() {
        for bad in [json!({"cpu": 101}), json!({"cpu": -0.5}), json!({"cpu": "high"}), json!({"cpu": null})] {
            assert!(
                matches!(
                    normalize(&raw(bad.clone()), MissingMetricPolicy::Zero),
                    Err(IngestError::Validation(_))
                ),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_target_ref() {
        assert_eq!(
            target_ref(Some(3), Some("10.0.0.1")).unwrap(),
            TargetRef::Id(TargetId(3))
        );
        assert_eq!(
            target_ref(None, Some(" 10.0.0.1 ")).unwrap(),
            TargetRef::Ip("10.0.0.1".parse().unwrap())
        );
        assert!(matches!(
            target_ref(None, Some("not-an-ip")),
            Err(IngestError::Validation(_))
        ));
        assert!(matches!(target_ref(None, None), Err(IngestError::Validation(_))));
        assert!(matches!(target_ref(None, Some("")), Err(IngestError::Validation(_))));
    }
}
