//! Read-only projections over the persisted time series.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::{DeviceSummary, HistoryPoint, LatestReading};

// ---

/// History window accepted by `/api/sensor-history`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl TimeRange {
    /// How far back from "now" the window reaches.
    pub fn span(self) -> Duration {
        match self {
            TimeRange::Daily => Duration::hours(24),
            TimeRange::Weekly => Duration::days(7),
            TimeRange::Monthly => Duration::days(30),
        }
    }

    /// Weekly and monthly windows are averaged per second instead of raw.
    pub fn is_aggregated(self) -> bool {
        !matches!(self, TimeRange::Daily)
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(TimeRange::Daily),
            "weekly" => Ok(TimeRange::Weekly),
            "monthly" => Ok(TimeRange::Monthly),
            other => Err(format!(
                "Invalid time_range '{other}'. Use 'daily', 'weekly', or 'monthly'."
            )),
        }
    }
}

/// Most recent reading of every distinct sensor name.
pub async fn latest_readings(pool: &PgPool) -> Result<Vec<LatestReading>, sqlx::Error> {
    // ---
    sqlx::query_as::<_, LatestReading>(
        r#"
        SELECT DISTINCT ON (sensor_name)
            sensor_name, temperature, humidity, heat_index, dew_point
        FROM sensor_readings
        ORDER BY sensor_name, recorded_at DESC, id DESC
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Readings of `sensor_name` within `range` before `now`, oldest first.
///
/// Aggregated ranges bucket by whole second and average each measurement;
/// both shapes expose the bucket or reading time as `timestamp`.
pub async fn sensor_history(
    pool: &PgPool,
    sensor_name: &str,
    range: TimeRange,
    now: DateTime<Utc>,
) -> Result<Vec<HistoryPoint>, sqlx::Error> {
    // ---
    let start = now - range.span();

    let sql = if range.is_aggregated() {
        r#"
        SELECT
            date_trunc('second', recorded_at) AS timestamp,
            AVG(temperature) AS temperature,
            AVG(humidity)    AS humidity,
            AVG(heat_index)  AS heat_index,
            AVG(dew_point)   AS dew_point
        FROM sensor_readings
        WHERE sensor_name = $1 AND recorded_at BETWEEN $2 AND $3
        GROUP BY 1
        ORDER BY 1 ASC
        "#
    } else {
        r#"
        SELECT
            recorded_at AS timestamp,
            temperature, humidity, heat_index, dew_point
        FROM sensor_readings
        WHERE sensor_name = $1 AND recorded_at BETWEEN $2 AND $3
        ORDER BY recorded_at ASC, id ASC
        "#
    };

    sqlx::query_as::<_, HistoryPoint>(sql)
        .bind(sensor_name)
        .bind(start)
        .bind(now)
        .fetch_all(pool)
        .await
}

/// Every device seen so far, ordered by serial number.
pub async fn devices(pool: &PgPool) -> Result<Vec<DeviceSummary>, sqlx::Error> {
    // ---
    sqlx::query_as::<_, DeviceSummary>(
        r#"
        SELECT
            serial_number, name, ip_address, http_port, mac_address,
            firmware_version, environment, temp_scale, uptime_seconds, last_seen
        FROM devices
        ORDER BY serial_number
        "#,
    )
    .fetch_all(pool)
    .await
}
