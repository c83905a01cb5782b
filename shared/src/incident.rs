//! Incident payload model
//!
//! Incident frames arrive as JSON objects on the incident channel. Required
//! fields are enforced by deserialization; unknown top-level fields are
//! ignored, unknown sensor readings are kept in [`SensorData::extra`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Reasons an incident payload is rejected
#[derive(Error, Debug)]
pub enum IncidentError {
    #[error("Malformed incident payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Incident severity as reported by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
        }
    }
}

/// Response progress of an incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentStatus {
    Detected,
    #[serde(rename = "Alert Sent")]
    AlertSent,
    Responded,
}

/// Where the incident happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
}

/// Vehicle sensor readings at the time of the incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorData {
    pub acceleration: f64,
    pub speed: f64,
    pub impact_level: f64,
    /// Any additional readings the vehicle reported
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single incident reported over the live feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentEvent {
    pub vehicle_id: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub location: Location,
    pub severity: Severity,
    pub sensor_data: SensorData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<IncidentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl IncidentEvent {
    /// Parse an incident from a decoded event argument.
    /// Only the shape is checked; field values are taken as reported.
    pub fn from_value(value: Value) -> Result<Self, IncidentError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Parse an incident from raw JSON text
    pub fn from_json(text: &str) -> Result<Self, IncidentError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl Location {
    /// Whether the reported fix is a plausible WGS84 coordinate
    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Parse an ISO-8601 timestamp. Timestamps without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid ISO-8601 timestamp: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_payload() -> Value {
        json!({
            "vehicleId": "KA-01-AB-1234",
            "timestamp": "2024-03-15T10:30:00Z",
            "location": {
                "lat": 12.9716,
                "lng": 77.5946,
                "address": "MG Road, Bangalore"
            },
            "severity": "High",
            "sensorData": {
                "acceleration": 9.8,
                "speed": 65.0,
                "impactLevel": 8.5
            }
        })
    }

    #[test]
    fn test_parse_valid_incident() {
        let event = IncidentEvent::from_value(sample_payload()).expect("valid payload");
        assert_eq!(event.vehicle_id, "KA-01-AB-1234");
        assert_eq!(event.severity, Severity::High);
        assert_eq!(event.location.address, "MG Road, Bangalore");
        assert_eq!(event.sensor_data.impact_level, 8.5);
        assert!(event.id.is_none());
    }

    #[test]
    fn test_missing_vehicle_id_rejected() {
        let mut payload = sample_payload();
        payload.as_object_mut().unwrap().remove("vehicleId");

        let result = IncidentEvent::from_value(payload);
        assert!(matches!(result, Err(IncidentError::Malformed(_))));
    }

    #[test]
    fn test_blank_vehicle_id_kept() {
        let mut payload = sample_payload();
        payload["vehicleId"] = json!("  ");

        let event = IncidentEvent::from_value(payload).expect("well-formed payload");
        assert_eq!(event.vehicle_id, "  ");
    }

    #[test]
    fn test_wrong_field_type_rejected() {
        let mut payload = sample_payload();
        payload["location"]["lat"] = json!("north");

        let result = IncidentEvent::from_value(payload);
        assert!(matches!(result, Err(IncidentError::Malformed(_))));
    }

    #[test]
    fn test_unknown_severity_rejected() {
        let mut payload = sample_payload();
        payload["severity"] = json!("Critical");

        assert!(IncidentEvent::from_value(payload).is_err());
    }

    #[test]
    fn test_extra_fields_ignored_and_sensor_extras_kept() {
        let mut payload = sample_payload();
        payload["reporter"] = json!("edge-7");
        payload["sensorData"]["gyroscope"] = json!(0.4);
        payload["status"] = json!("Alert Sent");
        payload["userId"] = json!("u-42");

        let event = IncidentEvent::from_value(payload).expect("valid payload");
        assert_eq!(event.sensor_data.extra.get("gyroscope"), Some(&json!(0.4)));
        assert_eq!(event.status, Some(IncidentStatus::AlertSent));
        assert_eq!(event.user_id.as_deref(), Some("u-42"));
    }

    #[test]
    fn test_out_of_range_coordinates_accepted() {
        let mut payload = sample_payload();
        payload["location"]["lat"] = json!(95.0);
        payload["location"]["lng"] = json!(200.0);

        let event = IncidentEvent::from_json(&payload.to_string()).expect("well-formed payload");
        assert_eq!(event.location.lat, 95.0);
        assert_eq!(event.location.lng, 200.0);
        assert!(!event.location.in_range());
        assert!(IncidentEvent::from_value(sample_payload()).unwrap().location.in_range());
    }

    #[test]
    fn test_timestamp_formats() {
        let with_offset = parse_timestamp("2024-03-15T16:00:00+05:30").expect("rfc3339");
        let naive = parse_timestamp("2024-03-15T10:30:00").expect("naive");
        let fractional = parse_timestamp("2024-03-15T10:30:00.250").expect("fractional");

        assert_eq!(with_offset, naive);
        assert_eq!(fractional.timestamp_subsec_millis(), 250);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        let mut payload = sample_payload();
        payload["timestamp"] = json!("15/03/2024");

        assert!(IncidentEvent::from_value(payload).is_err());
    }
}
