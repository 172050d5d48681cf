//! incidentscope -- anomaly detection and likely-cause ranking for incidents.
//!
//! Metric samples and discrete events are ingested per incident and stored
//! in SQLite. On demand, each metric is scored against its own early
//! baseline and the events closest in time to the resulting anomalies are
//! ranked as likely causes.

pub mod api;
pub mod config;
pub mod detect;
pub mod ingest;
pub mod storage;

use std::path::Path;

use anyhow::{Context, Result};

/// Start the incidentscope daemon: storage plus the HTTP API.
pub async fn serve(bind: &str, db_path: &Path) -> Result<()> {
    tracing::info!(db_path = %db_path.display(), "Initializing database");
    let pool = storage::open_pool(db_path)?;

    let addr: std::net::SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", bind))?;
    let app = api::router(api::state::AppState::new(pool));

    tracing::info!(%addr, "incidentscope listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
