//! Persists one poll cycle's batch as a single transaction.
//!
//! The device resolve and every per-section insert share one transaction:
//! either the whole cycle becomes visible or none of it does. Child rows
//! are appended on every cycle, so each table keeps the full history of
//! what the device reported.

use sqlx::{PgConnection, PgPool};

use super::{topology, DeviceId, WriteError};
use crate::NormalizedBatch;

// ---

/// Rows written per table for one committed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    // ---
    pub device_id: DeviceId,
    pub readings: usize,
    pub analog: usize,
    pub switches: usize,
    pub internal_relays: usize,
    pub external_relays: usize,
    pub power: usize,
    pub debug: usize,
}

/// Write `batch` atomically, resolving its device inside the same transaction.
///
/// Dropping the transaction on any early return rolls it back, so a
/// failure in a later section discards the rows of earlier ones.
pub async fn write(pool: &PgPool, batch: &NormalizedBatch) -> Result<WriteResult, WriteError> {
    // ---
    let mut tx = pool.begin().await?;

    let device_id = topology::resolve(&mut tx, &batch.device, batch.observed_at).await?;
    let result = insert_sections(&mut tx, device_id, batch).await?;

    tx.commit().await?;
    Ok(result)
}

async fn insert_sections(
    conn: &mut PgConnection,
    device_id: DeviceId,
    batch: &NormalizedBatch,
) -> Result<WriteResult, sqlx::Error> {
    // ---
    let at = batch.observed_at;

    for r in &batch.digital {
        sqlx::query(
            r#"
            INSERT INTO sensor_readings (
                device_id, sensor_id, sensor_name, recorded_at,
                temperature, humidity, heat_index, dew_point
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(device_id)
        .bind(r.sensor_id)
        .bind(&r.sensor_name)
        .bind(at)
        .bind(r.temperature)
        .bind(r.humidity)
        .bind(r.heat_index)
        .bind(r.dew_point)
        .execute(&mut *conn)
        .await?;
    }

    for s in &batch.analog {
        sqlx::query(
            r#"
            INSERT INTO analog_sensors (
                device_id, sensor_id, recorded_at, label, connected, value, units
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(device_id)
        .bind(s.sensor_id)
        .bind(at)
        .bind(&s.label)
        .bind(s.connected)
        .bind(s.value)
        .bind(&s.units)
        .execute(&mut *conn)
        .await?;
    }

    for s in &batch.switches {
        sqlx::query(
            r#"
            INSERT INTO switch_sensors (
                device_id, sensor_id, recorded_at, label, connected, state
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(device_id)
        .bind(s.sensor_id)
        .bind(at)
        .bind(&s.label)
        .bind(s.connected)
        .bind(s.state)
        .execute(&mut *conn)
        .await?;
    }

    for r in &batch.internal_relays {
        sqlx::query(
            r#"
            INSERT INTO internal_relays (device_id, relay_id, recorded_at, label, state)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(device_id)
        .bind(r.relay_id)
        .bind(at)
        .bind(&r.label)
        .bind(r.state)
        .execute(&mut *conn)
        .await?;
    }

    for r in &batch.external_relays {
        sqlx::query(
            r#"
            INSERT INTO external_relays (
                device_id, group_id, group_label, relay_id, recorded_at, state
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(device_id)
        .bind(r.group_id)
        .bind(&r.group_label)
        .bind(r.relay_id)
        .bind(at)
        .bind(r.state)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(p) = &batch.power {
        sqlx::query(
            r#"
            INSERT INTO power_sensors (device_id, sensor_id, recorded_at, connected, state)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(device_id)
        .bind(p.sensor_id)
        .bind(at)
        .bind(p.connected)
        .bind(p.state)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(payload) = &batch.debug {
        sqlx::query(
            r#"
            INSERT INTO debug_snapshots (device_id, recorded_at, payload)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(device_id)
        .bind(at)
        .bind(payload)
        .execute(&mut *conn)
        .await?;
    }

    Ok(WriteResult {
        device_id,
        readings: batch.digital.len(),
        analog: batch.analog.len(),
        switches: batch.switches.len(),
        internal_relays: batch.internal_relays.len(),
        external_relays: batch.external_relays.len(),
        power: usize::from(batch.power.is_some()),
        debug: usize::from(batch.debug.is_some()),
    })
}
