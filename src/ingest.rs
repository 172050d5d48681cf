//! Ingestion payloads and their validation.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::detect::{Meta, MetricSample};

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("metrics[{index}]: metric_name must not be empty")]
    EmptyMetricName { index: usize },
    #[error("metrics[{index}]: value must be a finite number")]
    NonFiniteValue { index: usize },
    #[error("events[{index}]: event_type must not be empty")]
    EmptyEventType { index: usize },
}

/// Offset-less layouts accepted alongside RFC 3339; read as UTC.
const NAIVE_TS_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an RFC 3339 timestamp, or a naive one taken to be UTC.
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_TS_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// `deserialize_with` adapter for [`parse_ts`].
pub(crate) fn deserialize_ts<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_ts(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}

/// An event as submitted by a client; the row id is assigned on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventIn {
    #[serde(deserialize_with = "deserialize_ts")]
    pub ts: DateTime<Utc>,
    pub event_type: String,
    #[serde(default)]
    pub meta: Option<Meta>,
}

/// A batch of samples and events for one incident.
///
/// Without an `incident_id` (or with an empty one) a new incident is
/// created. With one, the incident is created only if it does not exist yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub incident_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub meta: Option<Meta>,
    #[serde(default)]
    pub metrics: Vec<MetricSample>,
    #[serde(default)]
    pub events: Vec<EventIn>,
}

impl IngestRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (index, m) in self.metrics.iter().enumerate() {
            if m.metric_name.is_empty() {
                return Err(ValidationError::EmptyMetricName { index });
            }
            if !m.value.is_finite() {
                return Err(ValidationError::NonFiniteValue { index });
            }
        }
        for (index, e) in self.events.iter().enumerate() {
            if e.event_type.is_empty() {
                return Err(ValidationError::EmptyEventType { index });
            }
        }
        Ok(())
    }
}

/// Rows actually written; duplicates of already-stored rows are not counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub incident_id: String,
    pub metrics_ingested: usize,
    pub events_ingested: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_payload() {
        let req: IngestRequest = serde_json::from_str("{}").unwrap();
        assert!(req.incident_id.is_none());
        assert!(req.metrics.is_empty());
        assert!(req.events.is_empty());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_parse_full_payload() {
        let req: IngestRequest = serde_json::from_str(
            r#"{
                "incident_id": "inc-1",
                "name": "build_123",
                "source": "ci",
                "metrics": [{"ts": "2024-05-01T12:00:00Z", "metric_name": "p95_latency_ms", "value": 120.5}],
                "events": [{"ts": "2024-05-01T12:01:00Z", "event_type": "deploy", "meta": {"sha": "abc", "canary": true}}]
            }"#,
        )
        .unwrap();
        assert_eq!(req.metrics[0].metric_name, "p95_latency_ms");
        let meta = req.events[0].meta.as_ref().unwrap();
        let keys: Vec<&String> = meta.keys().collect();
        assert_eq!(keys, vec!["sha", "canary"]);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_names() {
        let req: IngestRequest = serde_json::from_str(
            r#"{"metrics": [{"ts": "2024-05-01T12:00:00Z", "metric_name": "", "value": 1.0}]}"#,
        )
        .unwrap();
        assert_eq!(req.validate(), Err(ValidationError::EmptyMetricName { index: 0 }));

        let req: IngestRequest = serde_json::from_str(
            r#"{"events": [{"ts": "2024-05-01T12:00:00Z", "event_type": ""}]}"#,
        )
        .unwrap();
        assert_eq!(req.validate(), Err(ValidationError::EmptyEventType { index: 0 }));

        let req = IngestRequest {
            incident_id: Some(String::new()),
            ..Default::default()
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_naive_timestamps_are_utc() {
        let req: IngestRequest = serde_json::from_str(
            r#"{
                "metrics": [
                    {"ts": "2024-05-01T12:00:00", "metric_name": "cpu", "value": 1.0},
                    {"ts": "2024-05-01 12:00:01.250", "metric_name": "cpu", "value": 2.0},
                    {"ts": "2024-05-01T14:00:02+02:00", "metric_name": "cpu", "value": 3.0}
                ],
                "events": [{"ts": "2024-05-01T12:01:00", "event_type": "deploy"}]
            }"#,
        )
        .unwrap();
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(req.metrics[0].ts, base);
        assert_eq!(req.metrics[1].ts, base + chrono::Duration::milliseconds(1250));
        assert_eq!(req.metrics[2].ts, base + chrono::Duration::seconds(2));
        assert_eq!(req.events[0].ts, base + chrono::Duration::minutes(1));
    }

    #[test]
    fn test_garbage_timestamp_is_rejected() {
        let err = serde_json::from_str::<IngestRequest>(
            r#"{"metrics": [{"ts": "yesterday", "metric_name": "cpu", "value": 1.0}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid timestamp 'yesterday'"));
        assert!(parse_ts("2024-13-01T00:00:00").is_none());
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let mut req = IngestRequest::default();
        req.metrics.push(MetricSample {
            metric_name: "cpu".to_string(),
            ts: Utc::now(),
            value: f64::NAN,
        });
        assert_eq!(req.validate(), Err(ValidationError::NonFiniteValue { index: 0 }));
    }
}
