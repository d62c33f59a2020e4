use axum::{extract::State, routing::get, Json, Router};
use sqlx::PgPool;

use super::QueryError;
use crate::{store, DeviceSummary};

// ---

pub fn router() -> Router<PgPool> {
    // ---
    Router::new().route("/api/devices", get(handler))
}

/// Every device the pollers have seen, with its last reported attributes.
async fn handler(State(pool): State<PgPool>) -> Result<Json<Vec<DeviceSummary>>, QueryError> {
    // ---
    let devices = store::devices(&pool)
        .await
        .map_err(QueryError::storage("Failed to retrieve devices"))?;

    Ok(Json(devices))
}
