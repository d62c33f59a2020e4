//! Data models for the ingestion pipeline and the query API.
//!
//! The record types here are what the normalizer emits and the writer
//! persists; the row types at the bottom are what the routes serialize.

use chrono::{DateTime, Utc};
use serde::Serialize;

// ---

/// Device attributes carried in the `general` section of a status payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    // ---
    /// Vendor-assigned serial; the natural key for a device.
    pub serial_number: String,
    pub name: Option<String>,
    pub ip_address: Option<String>,
    pub http_port: Option<i32>,
    pub mac_address: Option<String>,
    pub firmware_version: Option<String>,
    pub environment: Option<String>,
    pub temp_scale: Option<String>,
    pub uptime_seconds: Option<i64>,
}

/// One connected digital (temperature/humidity) sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct DigitalReading {
    // ---
    pub sensor_id: i32,
    /// Trimmed label; the identity used by the query API.
    pub sensor_name: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub heat_index: Option<f64>,
    pub dew_point: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalogReading {
    // ---
    pub sensor_id: i32,
    pub label: Option<String>,
    pub connected: Option<bool>,
    pub value: Option<f64>,
    pub units: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchReading {
    // ---
    pub sensor_id: i32,
    pub label: Option<String>,
    pub connected: Option<bool>,
    pub state: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InternalRelayState {
    // ---
    pub relay_id: i32,
    pub label: Option<String>,
    pub state: Option<bool>,
}

/// A leaf relay of an external relay group, flattened with its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalRelayState {
    // ---
    pub group_id: i32,
    pub group_label: Option<String>,
    pub relay_id: i32,
    pub state: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerReading {
    // ---
    pub sensor_id: i32,
    pub connected: Option<bool>,
    pub state: Option<bool>,
}

/// Everything one device reported in one poll cycle, grouped by table.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    // ---
    pub device: DeviceInfo,
    pub observed_at: DateTime<Utc>,
    pub digital: Vec<DigitalReading>,
    pub analog: Vec<AnalogReading>,
    pub switches: Vec<SwitchReading>,
    pub internal_relays: Vec<InternalRelayState>,
    pub external_relays: Vec<ExternalRelayState>,
    pub power: Option<PowerReading>,
    pub debug: Option<serde_json::Value>,
}

// ---

/// Most recent reading of one sensor, served by `/api/sensor-data`.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct LatestReading {
    // ---
    pub sensor_name: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub heat_index: Option<f64>,
    pub dew_point: Option<f64>,
}

/// One point of `/api/sensor-history`, raw or averaged per bucket.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct HistoryPoint {
    // ---
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub heat_index: Option<f64>,
    pub dew_point: Option<f64>,
}

/// A known device, served by `/api/devices`.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct DeviceSummary {
    // ---
    pub serial_number: String,
    pub name: Option<String>,
    pub ip_address: Option<String>,
    pub http_port: Option<i32>,
    pub mac_address: Option<String>,
    pub firmware_version: Option<String>,
    pub environment: Option<String>,
    pub temp_scale: Option<String>,
    pub uptime_seconds: Option<i64>,
    pub last_seen: DateTime<Utc>,
}
