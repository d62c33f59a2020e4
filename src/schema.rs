//! Database schema management for `roomalert-ingest`.
//!
//! Ensures required tables and indexes exist before polling starts.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Advisory lock key serializing concurrent bootstraps against one database.
const SCHEMA_LOCK_KEY: i64 = 0x5241_4c45_5254;

/// Statements applied in order; every one is a no-op when the object exists.
const STATEMENTS: &[&str] = &[
    // Device topology, one row per serial number
    r#"
    CREATE TABLE IF NOT EXISTS devices (
        id               BIGSERIAL   PRIMARY KEY,
        serial_number    TEXT        NOT NULL UNIQUE,
        name             TEXT,
        ip_address       TEXT,
        http_port        INTEGER,
        mac_address      TEXT,
        firmware_version TEXT,
        environment      TEXT,
        temp_scale       TEXT,
        uptime_seconds   BIGINT,
        first_seen       TIMESTAMPTZ NOT NULL,
        last_seen        TIMESTAMPTZ NOT NULL
    );
    "#,
    // Time-series fact table served by `/api/sensor-data` and `/api/sensor-history`
    r#"
    CREATE TABLE IF NOT EXISTS sensor_readings (
        id          BIGSERIAL        PRIMARY KEY,
        device_id   BIGINT           NOT NULL REFERENCES devices (id),
        sensor_id   INTEGER          NOT NULL,
        sensor_name TEXT             NOT NULL,
        recorded_at TIMESTAMPTZ      NOT NULL,
        temperature DOUBLE PRECISION,
        humidity    DOUBLE PRECISION,
        heat_index  DOUBLE PRECISION,
        dew_point   DOUBLE PRECISION
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_sensor_readings_name_time
        ON sensor_readings (sensor_name, recorded_at);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS analog_sensors (
        id          BIGSERIAL        PRIMARY KEY,
        device_id   BIGINT           NOT NULL REFERENCES devices (id),
        sensor_id   INTEGER          NOT NULL,
        recorded_at TIMESTAMPTZ      NOT NULL,
        label       TEXT,
        connected   BOOLEAN,
        value       DOUBLE PRECISION,
        units       TEXT
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS switch_sensors (
        id          BIGSERIAL   PRIMARY KEY,
        device_id   BIGINT      NOT NULL REFERENCES devices (id),
        sensor_id   INTEGER     NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL,
        label       TEXT,
        connected   BOOLEAN,
        state       BOOLEAN
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS internal_relays (
        id          BIGSERIAL   PRIMARY KEY,
        device_id   BIGINT      NOT NULL REFERENCES devices (id),
        relay_id    INTEGER     NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL,
        label       TEXT,
        state       BOOLEAN
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS external_relays (
        id          BIGSERIAL   PRIMARY KEY,
        device_id   BIGINT      NOT NULL REFERENCES devices (id),
        group_id    INTEGER     NOT NULL,
        group_label TEXT,
        relay_id    INTEGER     NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL,
        state       BOOLEAN
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS power_sensors (
        id          BIGSERIAL   PRIMARY KEY,
        device_id   BIGINT      NOT NULL REFERENCES devices (id),
        sensor_id   INTEGER     NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL,
        connected   BOOLEAN,
        state       BOOLEAN
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS debug_snapshots (
        id          BIGSERIAL   PRIMARY KEY,
        device_id   BIGINT      NOT NULL REFERENCES devices (id),
        recorded_at TIMESTAMPTZ NOT NULL,
        payload     JSONB       NOT NULL
    );
    "#,
];

/// Create or update the database schema (idempotent).
///
/// Safe to call on every startup; no-op if objects already exist.
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Concurrent `CREATE TABLE IF NOT EXISTS` can still collide in the catalog
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SCHEMA_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    for statement in STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}
