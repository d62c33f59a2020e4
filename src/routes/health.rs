// src/routes/health.rs
//! Liveness endpoint for the ingest service.
//!
//! `GET /health` answers without touching the database, so it reports
//! that the HTTP side is up even while storage or devices are down.
//! Exported to the gateway (`mod.rs`) as a subrouter.

use axum::{routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Subrouter with the `/health` route, generic over the gateway state.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}
