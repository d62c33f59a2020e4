//! HTTP gateway for the query API.
//!
//! Sibling modules each export a subrouter; this gateway merges them,
//! attaches shared state and CORS, and owns the error-to-response mapping
//! they all use.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;

mod devices;
mod health;
mod sensor_data;
mod sensor_history;

// ---

pub fn router(pool: PgPool) -> Router {
    // ---
    Router::new()
        .merge(sensor_data::router())
        .merge(sensor_history::router())
        .merge(devices::router())
        .merge(health::router())
        .layer(CorsLayer::permissive())
        .with_state(pool)
}

/// Failure of a read endpoint, rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("{0}")]
    InvalidParameter(String),

    #[error("{context}")]
    StorageUnavailable {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

impl QueryError {
    fn storage(context: &'static str) -> impl FnOnce(sqlx::Error) -> QueryError {
        move |source| QueryError::StorageUnavailable { context, source }
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        // ---
        let status = match &self {
            QueryError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            QueryError::StorageUnavailable { source, .. } => {
                tracing::error!("Database error: {}", source);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
