use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::detect::series::group_by_metric;
use crate::detect::{anomaly, correlation, ranking};
use crate::detect::{AnalysisReport, Anomaly, EventRecord, MetricSample};
use crate::storage::IncidentStore;

/// Analyse one incident snapshot.
///
/// Pure: the result depends only on the arguments, and empty inputs give an
/// empty report. `incident_id` is echoed back, never interpreted.
pub fn analyze(incident_id: &str, metrics: &[MetricSample], events: &[EventRecord]) -> AnalysisReport {
    let series = group_by_metric(metrics);

    let mut anomalies: Vec<Anomaly> = series.iter().flat_map(anomaly::detect).collect();
    // Stable: equal timestamps keep metric-then-index discovery order.
    anomalies.sort_by_key(|a| a.ts);

    let candidates = correlation::score_events(&anomalies, events);
    debug!(
        incident_id,
        metrics = series.len(),
        candidates = candidates.len(),
        "Scored candidate events"
    );
    let likely_causes = ranking::rank(candidates);

    info!(
        incident_id,
        anomalies = anomalies.len(),
        causes = likely_causes.len(),
        "Analysis complete"
    );

    AnalysisReport {
        incident_id: incident_id.to_string(),
        anomalies,
        likely_causes,
    }
}

/// Runs [`analyze`] against stored incidents.
#[derive(Clone)]
pub struct AnalysisEngine {
    store: IncidentStore,
}

impl AnalysisEngine {
    pub fn new(store: IncidentStore) -> Self {
        Self { store }
    }

    /// `Ok(None)` when the incident does not exist.
    pub async fn analyze_incident(&self, incident_id: &str) -> Result<Option<AnalysisReport>> {
        let store = self.store.clone();
        let id = incident_id.to_string();

        // Spawn blocking task for DB query & analysis
        tokio::task::spawn_blocking(move || -> Result<Option<AnalysisReport>> {
            let Some(snapshot) = store.load_snapshot(&id)? else {
                return Ok(None);
            };
            Ok(Some(analyze(&snapshot.incident.id, &snapshot.metrics, &snapshot.events)))
        })
        .await
        .context("Analysis task panicked")?
    }
}
