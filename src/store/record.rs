use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::device::BatteryLevel;

/// Coordinates are always rounded to six decimal places before they leave
/// the tracker, regardless of input precision.
pub fn round_coordinate(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// The full payload of one tracker send. `lastUpdated` is not part of the
/// write; the store assigns it server-side at commit time.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationWrite {
    pub lat: f64,
    pub lng: f64,
    pub is_simulated: bool,
    pub battery_level: BatteryLevel,
    pub device_agent: String,
    pub send_count: u64,
    /// Client-clock capture time, diagnostic only; the server timestamp is
    /// authoritative for ordering.
    pub timestamp: DateTime<Utc>,
}

impl LocationWrite {
    pub fn new(
        lat: f64,
        lng: f64,
        is_simulated: bool,
        battery_level: BatteryLevel,
        device_agent: String,
        send_count: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            lat: round_coordinate(lat),
            lng: round_coordinate(lng),
            is_simulated,
            battery_level,
            device_agent,
            send_count,
            timestamp,
        }
    }

    /// Plain JSON field map as stored. Shared between store backends so the
    /// decode path sees one shape.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("lat".into(), json_f64(self.lat));
        fields.insert("lng".into(), json_f64(self.lng));
        fields.insert("isSimulated".into(), Value::Bool(self.is_simulated));
        fields.insert(
            "batteryLevel".into(),
            match self.battery_level {
                BatteryLevel::Percent(level) => Value::from(level),
                BatteryLevel::Unknown => Value::from("Unknown"),
            },
        );
        fields.insert("deviceAgent".into(), Value::from(self.device_agent.clone()));
        fields.insert("sendCount".into(), Value::from(self.send_count));
        fields.insert("timestamp".into(), Value::from(self.timestamp.to_rfc3339()));
        fields
    }
}

fn json_f64(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// A stored document as the subscription delivers it: an untyped field map
/// plus the server-assigned write time.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub fields: Map<String, Value>,
    pub update_time: DateTime<Utc>,
}

/// The typed record the viewer renders.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRecord {
    pub lat: f64,
    pub lng: f64,
    pub last_updated: DateTime<Utc>,
    pub is_simulated: bool,
    pub battery_level: BatteryLevel,
    pub device_agent: String,
    pub send_count: u64,
}

/// Decode a raw document into a renderable record. Any subset of fields may
/// be present; absent or mistyped fields get the documented fallbacks (zero
/// coordinates, Unknown battery, empty agent, zero send count). The server
/// write time is the authoritative `last_updated` source.
pub fn decode_record(doc: &RawDocument) -> LocationRecord {
    let fields = &doc.fields;

    let battery_level = match fields.get("batteryLevel") {
        Some(Value::Number(n)) => n
            .as_u64()
            .filter(|&level| level <= 100)
            .map(|level| BatteryLevel::Percent(level as u8))
            .unwrap_or(BatteryLevel::Unknown),
        _ => BatteryLevel::Unknown,
    };

    LocationRecord {
        lat: field_f64(fields, "lat"),
        lng: field_f64(fields, "lng"),
        last_updated: doc.update_time,
        is_simulated: fields
            .get("isSimulated")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        battery_level,
        device_agent: fields
            .get("deviceAgent")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        send_count: fields
            .get("sendCount")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    }
}

fn field_f64(fields: &Map<String, Value>, key: &str) -> f64 {
    fields.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(fields: Map<String, Value>) -> RawDocument {
        RawDocument {
            fields,
            update_time: Utc::now(),
        }
    }

    #[test]
    fn coordinates_round_to_six_decimals() {
        assert_eq!(round_coordinate(40.7850912345), 40.785091);
        assert_eq!(round_coordinate(-73.96828599999), -73.968286);
        assert_eq!(round_coordinate(10.0), 10.0);
    }

    #[test]
    fn write_rounds_on_construction() {
        let write = LocationWrite::new(
            40.7850912345,
            -73.9682853333,
            false,
            BatteryLevel::Percent(50),
            "test".into(),
            1,
            Utc::now(),
        );
        assert_eq!(write.lat, 40.785091);
        assert_eq!(write.lng, -73.968285);
    }

    #[test]
    fn decode_applies_fallbacks_for_missing_fields() {
        let record = decode_record(&doc(Map::new()));
        assert_eq!(record.lat, 0.0);
        assert_eq!(record.lng, 0.0);
        assert_eq!(record.battery_level, BatteryLevel::Unknown);
        assert_eq!(record.device_agent, "");
        assert_eq!(record.send_count, 0);
        assert!(!record.is_simulated);
    }

    #[test]
    fn decode_handles_missing_battery_only() {
        let mut fields = Map::new();
        fields.insert("lat".into(), Value::from(40.785091));
        fields.insert("lng".into(), Value::from(-73.968285));
        fields.insert("sendCount".into(), Value::from(3));
        let record = decode_record(&doc(fields));
        assert_eq!(record.battery_level, BatteryLevel::Unknown);
        assert_eq!(record.lat, 40.785091);
        assert_eq!(record.send_count, 3);
    }

    #[test]
    fn decode_ignores_mistyped_fields() {
        let mut fields = Map::new();
        fields.insert("lat".into(), Value::from("not a number"));
        fields.insert("batteryLevel".into(), Value::from(350));
        fields.insert("sendCount".into(), Value::from(-2));
        let record = decode_record(&doc(fields));
        assert_eq!(record.lat, 0.0);
        assert_eq!(record.battery_level, BatteryLevel::Unknown);
        assert_eq!(record.send_count, 0);
    }

    #[test]
    fn round_trip_through_fields() {
        let write = LocationWrite::new(
            40.785091,
            -73.968285,
            true,
            BatteryLevel::Percent(80),
            "Linux/6.8 (desk)".into(),
            7,
            Utc::now(),
        );
        let record = decode_record(&doc(write.to_fields()));
        assert_eq!(record.lat, 40.785091);
        assert_eq!(record.lng, -73.968285);
        assert!(record.is_simulated);
        assert_eq!(record.battery_level, BatteryLevel::Percent(80));
        assert_eq!(record.device_agent, "Linux/6.8 (desk)");
        assert_eq!(record.send_count, 7);
    }
}
