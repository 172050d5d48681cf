//! Temporal proximity scoring of events against detected anomalies.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::detect::{Anomaly, EventRecord};

/// Half-width of the correlation window around each anomaly, in seconds.
pub const CORRELATION_WINDOW_SECS: i64 = 5 * 60;
/// Evidence strings kept per candidate.
pub const MAX_EVIDENCE: usize = 5;

/// Running score for one event that sits near at least one anomaly.
#[derive(Debug, Clone, PartialEq)]
pub struct CauseCandidate<'a> {
    pub event: &'a EventRecord,
    /// The event's timestamp; candidates only exist for timestamped events.
    pub ts: DateTime<Utc>,
    pub score: f64,
    pub evidence: Vec<String>,
}

pub fn correlation_window() -> TimeDelta {
    TimeDelta::seconds(CORRELATION_WINDOW_SECS)
}

/// Linear decay from 1.0 at zero distance to 0.0 at the window edge.
pub fn proximity(elapsed: TimeDelta) -> f64 {
    let elapsed_secs = elapsed.num_microseconds().unwrap_or(i64::MAX) as f64 / 1_000_000.0;
    let window_secs = CORRELATION_WINDOW_SECS as f64;
    (1.0 - elapsed_secs / window_secs).max(0.0)
}

fn distance(a: DateTime<Utc>, b: DateTime<Utc>) -> TimeDelta {
    if a >= b {
        a - b
    } else {
        b - a
    }
}

fn evidence_line(anomaly: &Anomaly) -> String {
    format!(
        "{} anomalous at {} (z={:.2}) near event",
        anomaly.metric_name,
        anomaly.ts.to_rfc3339(),
        anomaly.z_score
    )
}

/// Accumulate proximity scores for every event within
/// [`CORRELATION_WINDOW_SECS`] of an anomaly.
///
/// Anomalies are visited in the order given (chronological, from the
/// detector), events in the order given for each anomaly. Candidates are
/// returned in first-touched order and evidence is appended in anomaly
/// order, capped at [`MAX_EVIDENCE`]; the score keeps accumulating past the
/// cap. An event exactly on the window edge becomes a candidate with a zero
/// contribution.
pub fn score_events<'a>(anomalies: &[Anomaly], events: &'a [EventRecord]) -> Vec<CauseCandidate<'a>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut candidates: Vec<CauseCandidate<'a>> = Vec::new();

    let window = correlation_window();

    for anomaly in anomalies {
        for event in events {
            let Some(ts) = event.ts else { continue };
            let elapsed = distance(anomaly.ts, ts);
            if elapsed > window {
                continue;
            }

            let slot = *index.entry(event.id.as_str()).or_insert_with(|| {
                candidates.push(CauseCandidate {
                    event,
                    ts,
                    score: 0.0,
                    evidence: Vec::new(),
                });
                candidates.len() - 1
            });

            let candidate = &mut candidates[slot];
            candidate.score += proximity(elapsed);
            if candidate.evidence.len() < MAX_EVIDENCE {
                candidate.evidence.push(evidence_line(anomaly));
            }
        }
    }

    candidates
}
