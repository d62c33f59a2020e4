use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::debug;

use super::QueryError;
use crate::{store, HistoryPoint, TimeRange};

// ---

pub fn router() -> Router<PgPool> {
    // ---
    Router::new().route("/api/sensor-history", get(handler))
}

/// Query parameters for `/api/sensor-history`.
///
/// Both are optional at the extractor level so that a missing or bad value
/// produces our JSON error body rather than axum's plain-text rejection.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    sensor_name: Option<String>,
    time_range: Option<String>,
}

impl HistoryQuery {
    fn validate(self) -> Result<(String, TimeRange), QueryError> {
        // ---
        let sensor_name = self
            .sensor_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                QueryError::InvalidParameter("sensor_name parameter is required".to_string())
            })?;

        let range = match self.time_range.as_deref() {
            None => TimeRange::default(),
            Some(raw) => raw.parse().map_err(QueryError::InvalidParameter)?,
        };

        Ok((sensor_name, range))
    }
}

async fn handler(
    Query(params): Query<HistoryQuery>,
    State(pool): State<PgPool>,
) -> Result<Json<Vec<HistoryPoint>>, QueryError> {
    // ---
    let (sensor_name, range) = params.validate()?;
    debug!("GET /api/sensor-history - {} {:?}", sensor_name, range);

    let rows = store::sensor_history(&pool, &sensor_name, range, Utc::now())
        .await
        .map_err(QueryError::storage("Failed to retrieve history"))?;

    Ok(Json(rows))
}

#[cfg(test)]
mod tests {
    // ---
    use super::super::test_support::{get, json_body, offline_router};
    use super::*;
    use axum::http::StatusCode;

    fn query(sensor_name: Option<&str>, time_range: Option<&str>) -> HistoryQuery {
        HistoryQuery {
            sensor_name: sensor_name.map(str::to_string),
            time_range: time_range.map(str::to_string),
        }
    }

    #[test]
    fn test_time_range_defaults_to_daily() {
        // ---
        let (name, range) = query(Some("Rack A"), None).validate().unwrap();

        assert_eq!(name, "Rack A");
        assert_eq!(range, TimeRange::Daily);
    }

    #[test]
    fn test_explicit_time_ranges() {
        // ---
        let (_, weekly) = query(Some("s"), Some("weekly")).validate().unwrap();
        let (_, monthly) = query(Some("s"), Some("monthly")).validate().unwrap();

        assert_eq!(weekly, TimeRange::Weekly);
        assert_eq!(monthly, TimeRange::Monthly);
    }

    #[test]
    fn test_empty_sensor_name_is_rejected() {
        // ---
        assert!(matches!(
            query(Some(""), None).validate(),
            Err(QueryError::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_sensor_name_is_400() {
        // ---
        let response = get(offline_router(), "/api/sensor-history?time_range=daily").await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["error"],
            "sensor_name parameter is required"
        );
    }

    #[tokio::test]
    async fn test_invalid_time_range_is_400() {
        // ---
        let response = get(
            offline_router(),
            "/api/sensor-history?sensor_name=Rack%20A&time_range=yearly",
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("Invalid time_range"));
    }

    #[tokio::test]
    async fn test_valid_request_reaches_storage() {
        // ---
        let response = get(
            offline_router(),
            "/api/sensor-history?sensor_name=Rack%20A&time_range=weekly",
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"], "Failed to retrieve history");
    }
}
