//! Flattens a device status document into typed, table-shaped records.
//!
//! Every section of the payload is optional and every field inside a
//! section may be missing or carry the wrong type; such values become
//! `None` instead of failing the batch. The only hard requirement is the
//! device serial number, without which nothing can be attributed.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::{
    AnalogReading, DeviceInfo, DigitalReading, ExternalRelayState, InternalRelayState,
    NormalizedBatch, PowerReading, SwitchReading,
};

// ---

/// Top-level keys a single-device status document may carry.
const SECTIONS: &[&str] = &[
    "general",
    "digitalSensors",
    "analogSensors",
    "switchSensors",
    "internalRelays",
    "externalRelays",
    "powerSensor",
    "debug",
];

/// Label recorded for digital sensors that report none.
const UNLABELLED: &str = "N/A";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("payload carries no device serial number")]
    MissingDeviceIdentity,
}

/// Split a fetched document into `(source, payload)` pairs.
///
/// A plain status document yields itself, attributed to `source`. A
/// document whose values are each full status documents keyed by their
/// origin (an aggregating gateway) yields one pair per entry.
pub fn split_sources(source: &str, raw: Value) -> Vec<(String, Value)> {
    // ---
    let is_keyed = match raw.as_object() {
        Some(map) => {
            !map.is_empty()
                && !SECTIONS.iter().any(|s| map.contains_key(*s))
                && map
                    .values()
                    .all(|v| v.as_object().is_some_and(|o| o.contains_key("general")))
        }
        None => false,
    };

    match raw {
        Value::Object(map) if is_keyed => map.into_iter().collect(),
        other => vec![(source.to_string(), other)],
    }
}

/// Normalize one device's status document observed at `observed_at`.
pub fn normalize(raw: &Value, observed_at: DateTime<Utc>) -> Result<NormalizedBatch, NormalizeError> {
    // ---
    let root = raw.as_object().ok_or(NormalizeError::MissingDeviceIdentity)?;
    let device = device_info(root.get("general"))?;

    let digital = section(root, "digitalSensors")
        .enumerate()
        .filter(|(_, s)| flag(s.get("connected")) == Some(true))
        .map(|(i, s)| DigitalReading {
            sensor_id: child_id(s, i),
            sensor_name: text(s.get("label")).unwrap_or_else(|| UNLABELLED.to_string()),
            temperature: number(s.get("temperature")),
            humidity: number(s.get("humidity")),
            heat_index: number(s.get("heatIndex")),
            dew_point: number(s.get("dewPoint")),
        })
        .collect();

    let analog = section(root, "analogSensors")
        .enumerate()
        .map(|(i, s)| AnalogReading {
            sensor_id: child_id(s, i),
            label: text(s.get("label")),
            connected: flag(s.get("connected")),
            value: number(s.get("value")),
            units: text(s.get("units")),
        })
        .collect();

    let switches = section(root, "switchSensors")
        .enumerate()
        .map(|(i, s)| SwitchReading {
            sensor_id: child_id(s, i),
            label: text(s.get("label")),
            connected: flag(s.get("connected")),
            state: flag(s.get("state")),
        })
        .collect();

    let internal_relays = section(root, "internalRelays")
        .enumerate()
        .map(|(i, r)| InternalRelayState {
            relay_id: child_id(r, i),
            label: text(r.get("label")),
            state: flag(r.get("state")),
        })
        .collect();

    let external_relays = section(root, "externalRelays")
        .enumerate()
        .flat_map(|(gi, group)| {
            let group_id = child_id(group, gi);
            let group_label = text(group.get("label"));
            let relays = group
                .get("relays")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();

            relays
                .iter()
                .enumerate()
                .map(move |(ri, relay)| ExternalRelayState {
                    group_id,
                    group_label: group_label.clone(),
                    relay_id: child_id(relay, ri),
                    state: flag(relay.get("state")),
                })
        })
        .collect();

    let power = root
        .get("powerSensor")
        .filter(|p| p.as_object().is_some_and(|o| !o.is_empty()))
        .map(|p| PowerReading {
            sensor_id: child_id(p, 0),
            connected: flag(p.get("connected")),
            state: flag(p.get("state")),
        });

    let debug = root
        .get("debug")
        .filter(|d| d.as_object().is_some_and(|o| !o.is_empty()))
        .cloned()
        .map(strip_nul);

    Ok(NormalizedBatch {
        device,
        observed_at,
        digital,
        analog,
        switches,
        internal_relays,
        external_relays,
        power,
        debug,
    })
}

// ---

fn device_info(general: Option<&Value>) -> Result<DeviceInfo, NormalizeError> {
    // ---
    let general = general.filter(|g| g.is_object());
    let field = |key: &str| general.and_then(|g| g.get(key));

    let serial_number = text(field("serialNumber"))
        .or_else(|| text(field("serial")))
        .ok_or(NormalizeError::MissingDeviceIdentity)?;

    Ok(DeviceInfo {
        serial_number,
        name: text(field("name")),
        ip_address: text(field("ipv4Address")),
        http_port: integer(field("httpPort")).and_then(|p| i32::try_from(p).ok()),
        mac_address: text(field("macAddress")),
        firmware_version: text(field("firmwareVersion")),
        environment: text(field("environment")),
        temp_scale: text(field("tempScale")),
        uptime_seconds: integer(field("uptime")),
    })
}

/// Elements of an array section; absent or non-array sections are empty.
fn section<'a>(root: &'a Map<String, Value>, key: &str) -> std::slice::Iter<'a, Value> {
    root.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
}

/// Device-local identifier: the element's `id`, else its position.
fn child_id(item: &Value, position: usize) -> i32 {
    integer(item.get("id"))
        .and_then(|id| i32::try_from(id).ok())
        .or_else(|| i32::try_from(position).ok())
        .unwrap_or(i32::MAX)
}

/// Trimmed, non-empty text. Numbers are rendered so numeric serials survive.
///
/// PostgreSQL text cannot hold U+0000, so NULs are dropped before trimming.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let s = s.replace('\0', "");
            Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_string)
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Remove U+0000 from every string and key in `value`; JSONB rejects it.
fn strip_nul(value: Value) -> Value {
    match value {
        Value::String(s) if s.contains('\0') => Value::String(s.replace('\0', "")),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nul).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.replace('\0', ""), strip_nul(v)))
                .collect(),
        ),
        other => other,
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Devices report flags as booleans or as 0/1.
fn flag(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn observed_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap()
    }

    fn full_payload() -> Value {
        json!({
            "general": {
                "name": "Server Room",
                "serialNumber": "RA32E-0001",
                "firmwareVersion": "4.2.1",
                "ipv4Address": "10.0.0.5",
                "macAddress": "00:80:A3:00:00:01",
                "httpPort": 8090,
                "environment": "datacenter",
                "tempScale": "C",
                "uptime": 86400
            },
            "digitalSensors": [
                { "id": 1, "label": "  Rack A  ", "connected": true,
                  "temperature": 22.5, "humidity": 41.0, "heatIndex": 23.1, "dewPoint": 8.7 },
                { "id": 2, "label": "Rack B", "connected": false, "temperature": 99.0 },
                { "id": 3, "label": "Rack C", "connected": 1, "temperature": "21.25" }
            ],
            "analogSensors": [
                { "id": 0, "label": "Voltage", "connected": 1, "value": 4.8, "units": "V" }
            ],
            "switchSensors": [
                { "id": 0, "label": "Door", "connected": true, "state": 0 }
            ],
            "internalRelays": [
                { "id": 0, "label": "Siren", "state": 1 }
            ],
            "externalRelays": [
                { "id": 7, "label": " Relay Bank ", "relays": [
                    { "id": 0, "state": 1 }, { "id": 1, "state": 0 }
                ] },
                { "id": 8, "label": "Empty Bank", "relays": [] }
            ],
            "powerSensor": { "connected": 1, "state": 1 },
            "debug": { "freeHeap": 10240 }
        })
    }

    #[test]
    fn test_full_payload_flattens_every_section() {
        // ---
        let batch = normalize(&full_payload(), observed_at()).unwrap();

        assert_eq!(batch.device.serial_number, "RA32E-0001");
        assert_eq!(batch.device.name.as_deref(), Some("Server Room"));
        assert_eq!(batch.device.http_port, Some(8090));
        assert_eq!(batch.device.uptime_seconds, Some(86400));
        assert_eq!(batch.observed_at, observed_at());

        assert_eq!(batch.digital.len(), 2);
        assert_eq!(batch.analog.len(), 1);
        assert_eq!(batch.analog[0].value, Some(4.8));
        assert_eq!(batch.switches[0].state, Some(false));
        assert_eq!(batch.internal_relays[0].state, Some(true));
        assert_eq!(batch.power.as_ref().unwrap().connected, Some(true));
        assert_eq!(batch.debug, Some(json!({ "freeHeap": 10240 })));
    }

    #[test]
    fn test_disconnected_digital_sensors_are_skipped() {
        // ---
        let batch = normalize(&full_payload(), observed_at()).unwrap();
        let names: Vec<&str> = batch.digital.iter().map(|d| d.sensor_name.as_str()).collect();

        assert_eq!(names, vec!["Rack A", "Rack C"]);
        assert_eq!(batch.digital[1].temperature, Some(21.25));
    }

    #[test]
    fn test_digital_sensor_without_connected_flag_is_skipped() {
        // ---
        let raw = json!({
            "general": { "serialNumber": "S1" },
            "digitalSensors": [{ "label": "Rack D", "temperature": 20.0 }]
        });

        let batch = normalize(&raw, observed_at()).unwrap();
        assert!(batch.digital.is_empty());
    }

    #[test]
    fn test_external_relays_flatten_with_parent_group() {
        // ---
        let batch = normalize(&full_payload(), observed_at()).unwrap();

        assert_eq!(
            batch.external_relays,
            vec![
                ExternalRelayState {
                    group_id: 7,
                    group_label: Some("Relay Bank".to_string()),
                    relay_id: 0,
                    state: Some(true),
                },
                ExternalRelayState {
                    group_id: 7,
                    group_label: Some("Relay Bank".to_string()),
                    relay_id: 1,
                    state: Some(false),
                },
            ]
        );
    }

    #[test]
    fn test_missing_sections_yield_empty_batches() {
        // ---
        let raw = json!({ "general": { "serialNumber": "RA-ONLY-GENERAL" } });
        let batch = normalize(&raw, observed_at()).unwrap();

        assert!(batch.digital.is_empty());
        assert!(batch.analog.is_empty());
        assert!(batch.switches.is_empty());
        assert!(batch.internal_relays.is_empty());
        assert!(batch.external_relays.is_empty());
        assert!(batch.power.is_none());
        assert!(batch.debug.is_none());
        assert_eq!(batch.device.name, None);
    }

    #[test]
    fn test_each_section_can_be_dropped_independently() {
        // ---
        for key in SECTIONS.iter().filter(|k| **k != "general") {
            let mut raw = full_payload();
            raw.as_object_mut().unwrap().remove(*key);

            let batch = normalize(&raw, observed_at())
                .unwrap_or_else(|e| panic!("dropping {key} failed: {e}"));
            let remaining = match *key {
                "digitalSensors" => batch.digital.len(),
                "analogSensors" => batch.analog.len(),
                "switchSensors" => batch.switches.len(),
                "internalRelays" => batch.internal_relays.len(),
                "externalRelays" => batch.external_relays.len(),
                "powerSensor" => batch.power.iter().count(),
                "debug" => batch.debug.iter().count(),
                other => unreachable!("unexpected section {other}"),
            };
            assert_eq!(remaining, 0, "section {key} should be empty");
        }
    }

    #[test]
    fn test_wrong_typed_fields_become_none() {
        // ---
        let raw = json!({
            "general": { "serialNumber": "S2", "httpPort": "eighty", "uptime": [] },
            "digitalSensors": [{ "id": "x", "connected": true, "temperature": {}, "humidity": null }],
            "analogSensors": "not-a-list",
            "externalRelays": [{ "id": 3, "relays": "nope" }]
        });

        let batch = normalize(&raw, observed_at()).unwrap();

        assert_eq!(batch.device.http_port, None);
        assert_eq!(batch.device.uptime_seconds, None);
        assert_eq!(batch.digital[0].sensor_id, 0);
        assert_eq!(batch.digital[0].sensor_name, "N/A");
        assert_eq!(batch.digital[0].temperature, None);
        assert_eq!(batch.digital[0].humidity, None);
        assert!(batch.analog.is_empty());
        assert!(batch.external_relays.is_empty());
    }

    #[test]
    fn test_missing_serial_rejects_batch() {
        // ---
        let cases = [
            json!({ "digitalSensors": [] }),
            json!({ "general": { "name": "No Serial" } }),
            json!({ "general": { "serialNumber": "   " } }),
            json!({ "general": "RA-1" }),
            json!([1, 2, 3]),
            Value::Null,
        ];

        for raw in cases {
            assert_eq!(
                normalize(&raw, observed_at()),
                Err(NormalizeError::MissingDeviceIdentity),
                "payload {raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_serial_fallback_key_and_numeric_serial() {
        // ---
        let raw = json!({ "general": { "serial": 123456 } });
        let batch = normalize(&raw, observed_at()).unwrap();

        assert_eq!(batch.device.serial_number, "123456");
    }

    #[test]
    fn test_split_sources_plain_document() {
        // ---
        let pairs = split_sources("10.0.0.5:8090", full_payload());

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, "10.0.0.5:8090");
    }

    #[test]
    fn test_split_sources_keyed_by_origin() {
        // ---
        let raw = json!({
            "http://10.0.0.5/status.json": { "general": { "serialNumber": "A" } },
            "http://10.0.0.6/status.json": { "general": { "serialNumber": "B" } }
        });

        let pairs = split_sources("gateway", raw);
        let serials: Vec<String> = pairs
            .iter()
            .map(|(_, p)| normalize(p, observed_at()).unwrap().device.serial_number)
            .collect();

        assert_eq!(pairs.len(), 2);
        assert!(serials.contains(&"A".to_string()));
        assert!(serials.contains(&"B".to_string()));
    }

    #[test]
    fn test_split_sources_leaves_unrecognized_documents_whole() {
        // ---
        let pairs = split_sources("dev", json!({ "unexpected": 1 }));
        assert_eq!(pairs.len(), 1);

        let pairs = split_sources("dev", json!({}));
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_nul_characters_are_stripped() {
        // ---
        let payload = json!({
            "general": { "serialNumber": "RA\u{0000}-12" },
            "digitalSensors": [
                { "connected": true, "label": "A\u{0000}", "temperature": 21.0 },
                { "id": 1, "connected": true, "label": "\u{0000}", "temperature": 19.0 }
            ],
            "switchSensors": [ { "connected": true, "label": "Do\u{0000}or", "state": 1 } ],
            "debug": { "e": "x\u{0000}y", "k\u{0000}ey": ["\u{0000}", 1] }
        });

        let batch = normalize(&payload, observed_at()).unwrap();

        assert_eq!(batch.device.serial_number, "RA-12");
        assert_eq!(batch.digital[0].sensor_name, "A");
        assert_eq!(batch.digital[1].sensor_name, UNLABELLED);
        assert_eq!(batch.switches[0].label.as_deref(), Some("Door"));
        assert_eq!(batch.debug, Some(json!({ "e": "xy", "key": ["", 1] })));
    }
}
