use axum::{extract::State, routing::get, Json, Router};
use sqlx::PgPool;
use tracing::debug;

use super::QueryError;
use crate::{store, LatestReading};

// ---

pub fn router() -> Router<PgPool> {
    // ---
    Router::new().route("/api/sensor-data", get(handler))
}

/// Latest reading of every sensor.
async fn handler(State(pool): State<PgPool>) -> Result<Json<Vec<LatestReading>>, QueryError> {
    // ---
    let rows = store::latest_readings(&pool)
        .await
        .map_err(QueryError::storage("Failed to retrieve sensor data"))?;

    debug!("GET /api/sensor-data - {} sensors", rows.len());
    Ok(Json(rows))
}
