use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::detect::{EventRecord, Meta, MetricSample};
use crate::ingest::{IngestRequest, IngestResponse};
use crate::storage::{decode_ts, encode_ts, Pool};

/// A bounded episode under investigation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Incident {
    pub id: String,
    pub name: Option<String>,
    pub source: Option<String>,
    pub meta: Option<Meta>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentSummary {
    #[serde(flatten)]
    pub incident: Incident,
    pub metric_count: u64,
    pub event_count: u64,
}

/// Everything stored for one incident, read at a single point in time.
///
/// Metrics are ordered by `(metric_name, ts)`, events by `ts`; rows with
/// equal keys keep insertion order.
#[derive(Debug, Clone)]
pub struct IncidentSnapshot {
    pub incident: Incident,
    pub metrics: Vec<MetricSample>,
    pub events: Vec<EventRecord>,
}

/// Persists incidents with their metric points and events.
#[derive(Clone)]
pub struct IncidentStore {
    pool: Pool,
}

impl IncidentStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Write a batch in one transaction, creating the incident if needed.
    ///
    /// Points duplicating `(incident_id, ts, metric_name)` and events
    /// duplicating `(incident_id, ts, event_type)` are dropped silently and
    /// not counted.
    pub fn ingest(&self, req: &IngestRequest) -> Result<IngestResponse> {
        let mut conn = self.pool.get().context("Failed to get DB connection")?;
        let tx = conn.transaction()?;

        // An empty id counts as absent.
        let incident_id = match req.incident_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) if incident_exists(&tx, id)? => id.to_string(),
            Some(id) => {
                insert_incident(&tx, id, req)?;
                id.to_string()
            }
            None => {
                let id = Uuid::new_v4().to_string();
                insert_incident(&tx, &id, req)?;
                id
            }
        };

        let mut metrics_ingested = 0;
        let mut events_ingested = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO metric_points (id, incident_id, ts, metric_name, value)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for m in &req.metrics {
                metrics_ingested += stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    incident_id,
                    encode_ts(&m.ts),
                    m.metric_name,
                    m.value,
                ])?;
            }

            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO events (id, incident_id, ts, event_type, meta_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for e in &req.events {
                let meta_json = e.meta.as_ref().map(serde_json::to_string).transpose()?;
                events_ingested += stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    incident_id,
                    encode_ts(&e.ts),
                    e.event_type,
                    meta_json,
                ])?;
            }
        }

        tx.commit().context("Failed to commit ingest")?;

        info!(
            incident_id = %incident_id,
            metrics = metrics_ingested,
            events = events_ingested,
            skipped_metrics = req.metrics.len() - metrics_ingested,
            skipped_events = req.events.len() - events_ingested,
            "Ingested batch"
        );

        Ok(IngestResponse {
            incident_id,
            metrics_ingested,
            events_ingested,
        })
    }

    pub fn get_incident(&self, id: &str) -> Result<Option<Incident>> {
        let conn = self.pool.get().context("Failed to get DB connection")?;
        fetch_incident(&conn, id)
    }

    /// Most recently created first.
    pub fn list_incidents(&self, limit: usize) -> Result<Vec<IncidentSummary>> {
        let conn = self.pool.get().context("Failed to get DB connection")?;
        let mut stmt = conn.prepare(
            "SELECT i.id, i.name, i.source, i.meta_json, i.created_at,
                    (SELECT COUNT(*) FROM metric_points m WHERE m.incident_id = i.id),
                    (SELECT COUNT(*) FROM events e WHERE e.incident_id = i.id)
             FROM incidents i
             ORDER BY i.created_at DESC, i.rowid DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            Ok(IncidentSummary {
                incident: incident_from_row(row)?,
                metric_count: row.get::<_, i64>(5)? as u64,
                event_count: row.get::<_, i64>(6)? as u64,
            })
        })?;

        let mut incidents = Vec::new();
        for r in rows {
            incidents.push(r?);
        }
        Ok(incidents)
    }

    /// Read an incident with all of its metrics and events.
    ///
    /// The three reads share one transaction so a concurrent ingest cannot
    /// tear the snapshot.
    pub fn load_snapshot(&self, id: &str) -> Result<Option<IncidentSnapshot>> {
        let mut conn = self.pool.get().context("Failed to get DB connection")?;
        let tx = conn.transaction()?;

        let Some(incident) = fetch_incident(&tx, id)? else {
            return Ok(None);
        };

        let metrics = {
            let mut stmt = tx.prepare(
                "SELECT metric_name, ts, value FROM metric_points
                 WHERE incident_id = ?1
                 ORDER BY metric_name, ts, rowid",
            )?;
            let rows = stmt.query_map([id], |row| {
                Ok(MetricSample {
                    metric_name: row.get(0)?,
                    ts: ts_column(row, 1)?,
                    value: row.get(2)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let events = {
            let mut stmt = tx.prepare(
                "SELECT id, event_type, ts, meta_json FROM events
                 WHERE incident_id = ?1
                 ORDER BY ts, rowid",
            )?;
            let rows = stmt.query_map([id], |row| {
                Ok(EventRecord {
                    id: row.get(0)?,
                    event_type: row.get(1)?,
                    ts: Some(ts_column(row, 2)?),
                    meta: meta_column(row, 3)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        tx.commit()?;

        debug!(
            incident_id = %id,
            metrics = metrics.len(),
            events = events.len(),
            "Loaded incident snapshot"
        );

        Ok(Some(IncidentSnapshot {
            incident,
            metrics,
            events,
        }))
    }
}

fn incident_exists(conn: &Connection, id: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM incidents WHERE id = ?1", [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn insert_incident(conn: &Connection, id: &str, req: &IngestRequest) -> Result<()> {
    let meta_json = req.meta.as_ref().map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT INTO incidents (id, name, source, meta_json, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, req.name, req.source, meta_json, encode_ts(&Utc::now())],
    )
    .context("Failed to insert incident")?;
    info!(incident_id = %id, "Created incident");
    Ok(())
}

fn fetch_incident(conn: &Connection, id: &str) -> Result<Option<Incident>> {
    let incident = conn
        .query_row(
            "SELECT id, name, source, meta_json, created_at FROM incidents WHERE id = ?1",
            [id],
            incident_from_row,
        )
        .optional()?;
    Ok(incident)
}

fn incident_from_row(row: &Row<'_>) -> rusqlite::Result<Incident> {
    Ok(Incident {
        id: row.get(0)?,
        name: row.get(1)?,
        source: row.get(2)?,
        meta: meta_column(row, 3)?,
        created_at: ts_column(row, 4)?,
    })
}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    decode_ts(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn meta_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Meta>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
