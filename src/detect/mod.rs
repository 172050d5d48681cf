//! Anomaly detection and likely-cause ranking.
//!
//! The pipeline is a pure batch computation over one incident snapshot:
//! group samples per metric, estimate a static baseline, flag outliers by
//! z-score, then rank events by their temporal proximity to the outliers.

pub mod anomaly;
pub mod correlation;
pub mod engine;
pub mod ranking;
pub mod series;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use self::engine::{analyze, AnalysisEngine};

/// Opaque, order-preserving metadata attached to incidents and events.
pub type Meta = serde_json::Map<String, serde_json::Value>;

/// A single metric reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub metric_name: String,
    #[serde(deserialize_with = "crate::ingest::deserialize_ts")]
    pub ts: DateTime<Utc>,
    pub value: f64,
}

/// A discrete event recorded against an incident (deploy, flag flip, ...).
///
/// Events without a timestamp never take part in correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub event_type: String,
    pub ts: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

/// A metric reading that deviates from its baseline by at least
/// [`anomaly::Z_THRESHOLD`] standard deviations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub metric_name: String,
    pub ts: DateTime<Utc>,
    pub value: f64,
    pub baseline_mean: f64,
    pub baseline_std: f64,
    pub z_score: f64,
}

/// A ranked likely cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CauseOut {
    pub event_type: String,
    pub ts: DateTime<Utc>,
    pub meta: Option<Meta>,
    /// Proximity score normalised against the top candidate, in `[0, 1]`.
    pub confidence: f64,
    pub evidence: Vec<String>,
}

/// Result of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub incident_id: String,
    /// Chronological.
    pub anomalies: Vec<Anomaly>,
    /// Confidence-descending, at most [`ranking::MAX_CAUSES`] entries.
    pub likely_causes: Vec<CauseOut>,
}
