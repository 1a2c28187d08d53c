// Wire protocol - JSON frames exchanged with the telemetry backend
use crate::domain::telemetry::{ControlUpdate, MapSnapshot, SystemStatusSnapshot, DEFAULT_SERIAL_PORT};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Inbound frames, discriminated by their `type` field.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Metadata(MetadataMessage),
    Data(DataMessage),
    Map(MapMessage),
    Status(StatusMessage),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MetadataMessage {
    pub available_series: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DataMessage {
    #[serde(deserialize_with = "timestamp_ms")]
    pub timestamp: i64,
    /// Values that are not JSON numbers arrive as NaN and get filtered on ingest.
    #[serde(deserialize_with = "lenient_series")]
    pub series: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MapMessage {
    #[serde(default, deserialize_with = "timestamp_ms")]
    pub timestamp: i64,
    pub width: usize,
    pub height: usize,
    pub grid: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StatusMessage {
    #[serde(default, deserialize_with = "timestamp_ms")]
    pub timestamp: i64,
    pub backend_connected: bool,
    pub shm_active: bool,
    #[serde(default)]
    pub serial_port: String,
    pub nuc_cpu_load: f64,
    pub nuc_temp: f64,
}

impl MapMessage {
    pub fn into_snapshot(self) -> MapSnapshot {
        MapSnapshot::new(self.width, self.height, self.grid)
    }
}

impl StatusMessage {
    pub fn into_snapshot(self) -> SystemStatusSnapshot {
        let serial_port = if self.serial_port.is_empty() {
            DEFAULT_SERIAL_PORT.to_string()
        } else {
            self.serial_port
        };
        SystemStatusSnapshot {
            backend_connected: self.backend_connected,
            shm_active: self.shm_active,
            serial_port,
            nuc_cpu_load: self.nuc_cpu_load,
            nuc_temp: self.nuc_temp,
        }
    }
}

pub fn decode(text: &str) -> Result<InboundMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

pub fn encode_control(update: &ControlUpdate) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(update)?)
}

/// Accepts integer or fractional milliseconds; fractions are truncated.
fn timestamp_ms<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    if let Some(ms) = number.as_i64() {
        return Ok(ms);
    }
    if let Some(ms) = number.as_u64() {
        return i64::try_from(ms).map_err(D::Error::custom);
    }
    match number.as_f64() {
        Some(ms) if ms.is_finite() && ms.abs() < i64::MAX as f64 => Ok(ms.trunc() as i64),
        _ => Err(D::Error::custom("timestamp out of range")),
    }
}

fn lenient_series<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| (key, value.as_f64().unwrap_or(f64::NAN)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_data() {
        let msg = decode(r#"{"type":"data","timestamp":1000,"series":{"ekf_x":3.2,"fps":210}}"#)
            .unwrap();
        let InboundMessage::Data(data) = msg else {
            panic!("expected data, got {:?}", msg);
        };
        assert_eq!(data.timestamp, 1000);
        assert_eq!(data.series["ekf_x"], 3.2);
        assert_eq!(data.series["fps"], 210.0);
    }

    #[test]
    fn test_non_numeric_values_become_nan() {
        let msg = decode(r#"{"type":"data","timestamp":1.5e3,"series":{"a":null,"b":"x","c":1}}"#)
            .unwrap();
        let InboundMessage::Data(data) = msg else {
            panic!("expected data");
        };
        assert_eq!(data.timestamp, 1500);
        assert!(data.series["a"].is_nan());
        assert!(data.series["b"].is_nan());
        assert_eq!(data.series["c"], 1.0);
    }

    #[test]
    fn test_unknown_type_is_ignored_variant() {
        let msg = decode(r#"{"type":"telemetry","payload":{}}"#).unwrap();
        assert_eq!(msg, InboundMessage::Unknown);
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        assert!(decode("not json").is_err());
        assert!(decode(r#"{"series":{}}"#).is_err());
        assert!(decode(r#"{"type":"map","width":-1,"height":2,"grid":[]}"#).is_err());
    }

    #[test]
    fn test_status_defaults_serial_port() {
        let msg = decode(
            r#"{"type":"status","timestamp":5,"backend_connected":true,"shm_active":false,
               "serial_port":"","nuc_cpu_load":12.5,"nuc_temp":48}"#,
        )
        .unwrap();
        let InboundMessage::Status(status) = msg else {
            panic!("expected status");
        };
        let snapshot = status.into_snapshot();
        assert_eq!(snapshot.serial_port, DEFAULT_SERIAL_PORT);
        assert!(snapshot.backend_connected);
        assert_eq!(snapshot.nuc_temp, 48.0);
    }

    #[test]
    fn test_metadata() {
        let msg = decode(r#"{"type":"metadata","available_series":["pid_p","exposure"]}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Metadata(MetadataMessage {
                available_series: vec!["pid_p".to_string(), "exposure".to_string()]
            })
        );
    }
}
