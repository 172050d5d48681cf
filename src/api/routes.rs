//! API route definitions.

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::ApiError;
use super::state::AppState;
use crate::ingest::IngestRequest;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .route("/analysis/{incident_id}", get(analysis))
        .route("/incidents", get(list_incidents))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": meta()
    }))
}

async fn ingest(
    State(state): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    req.validate()?;

    let store = state.store.clone();
    let resp = tokio::task::spawn_blocking(move || store.ingest(&req))
        .await
        .context("Ingest task panicked")??;

    Ok(Json(json!({ "data": resp, "meta": meta() })))
}

async fn analysis(
    State(state): State<AppState>,
    Path(incident_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let report = state
        .engine
        .analyze_incident(&incident_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("incident '{incident_id}'")))?;

    Ok(Json(json!({ "data": report, "meta": meta() })))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

async fn list_incidents(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);

    let store = state.store.clone();
    let incidents = tokio::task::spawn_blocking(move || store.list_incidents(limit))
        .await
        .context("List task panicked")??;

    let total = incidents.len();
    Ok(Json(json!({ "data": incidents, "meta": { "total": total, "limit": limit } })))
}
