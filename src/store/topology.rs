//! Find-or-create of devices keyed by their vendor serial number.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::DeviceInfo;

// ---

/// Internal identifier of a persisted device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(transparent)]
pub struct DeviceId(pub i64);

/// Resolve `device` to its persistent id, creating the row on first sight.
///
/// A single `INSERT .. ON CONFLICT` keeps this atomic when several pollers
/// see the same serial at once. Existing rows only get their uptime and
/// last-seen time refreshed; descriptive attributes keep their first value.
pub async fn resolve(
    conn: &mut PgConnection,
    device: &DeviceInfo,
    seen_at: DateTime<Utc>,
) -> Result<DeviceId, sqlx::Error> {
    // ---
    sqlx::query_scalar(
        r#"
        INSERT INTO devices (
            serial_number, name, ip_address, http_port, mac_address,
            firmware_version, environment, temp_scale, uptime_seconds,
            first_seen, last_seen
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
        ON CONFLICT (serial_number) DO UPDATE SET
            uptime_seconds = COALESCE(EXCLUDED.uptime_seconds, devices.uptime_seconds),
            last_seen      = GREATEST(devices.last_seen, EXCLUDED.last_seen)
        RETURNING id
        "#,
    )
    .bind(&device.serial_number)
    .bind(&device.name)
    .bind(&device.ip_address)
    .bind(device.http_port)
    .bind(&device.mac_address)
    .bind(&device.firmware_version)
    .bind(&device.environment)
    .bind(&device.temp_scale)
    .bind(device.uptime_seconds)
    .bind(seen_at)
    .fetch_one(conn)
    .await
}
