//! Vessel record decoder (component C3): normalizes the upstream provider's
//! JSON frames into a single [`crate::model::VesselRecord`] shape.
//!
//! The upstream message is a tagged variant over five possible shapes
//! rather than a dynamically-sniffed object, per the redesign away from
//! runtime attribute sniffing: [`decode`] inspects the `Message` object's
//! keys in the priority order the specification fixes and dispatches to a
//! dedicated field-extraction path for whichever variant is present first.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::model::{VesselKind, VesselRecord};

/// Either a normalized record, or a signal that the frame carried no
/// variant this system cares about (e.g. an AIS message type this relay
/// doesn't encode).
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    Record(VesselRecord),
    Ignored,
}

/// Variant keys, in the priority order the specification mandates when more
/// than one happens to be present on the same `Message` object.
const VARIANT_PRIORITY: [(&str, VesselKind); 5] = [
    ("PositionReport", VesselKind::PositionClassA),
    ("StandardClassBPositionReport", VesselKind::PositionClassB),
    ("ShipStaticData", VesselKind::StaticVoyage),
    ("ShipAndVoyageData", VesselKind::StaticVoyage),
    ("StaticDataReport", VesselKind::StaticReport),
];

/// Decode one upstream frame into a normalized vessel record.
pub fn decode(frame: &[u8]) -> Result<DecodeOutcome, DecodeError> {
    let text = std::str::from_utf8(frame)?;
    let value: Value = serde_json::from_str(text)?;
    let root = value.as_object().ok_or(DecodeError::MissingMessage)?;

    let meta = root.get("MetaData").and_then(Value::as_object);
    let mmsi = meta
        .map(|m| extract_u32(m, "MMSI"))
        .transpose()?
        .flatten()
        .unwrap_or(0);
    let observed_at = meta
        .and_then(|m| m.get("time_utc"))
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let vessel_name = meta
        .and_then(|m| m.get("ShipName"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let meta_lat = meta.map(|m| extract_f64(m, "latitude")).transpose()?.flatten();
    let meta_lon = meta.map(|m| extract_f64(m, "longitude")).transpose()?.flatten();

    let message = root
        .get("Message")
        .and_then(Value::as_object)
        .ok_or(DecodeError::MissingMessage)?;

    let Some((key, kind)) = VARIANT_PRIORITY
        .iter()
        .find(|(key, _)| message.contains_key(*key))
    else {
        return Ok(DecodeOutcome::Ignored);
    };
    let payload = message
        .get(*key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let is_position = matches!(kind, VesselKind::PositionClassA | VesselKind::PositionClassB);
    let lat = meta_lat.unwrap_or(if is_position { VesselRecord::LAT_UNAVAILABLE } else { 0.0 });
    let lon = meta_lon.unwrap_or(if is_position { VesselRecord::LON_UNAVAILABLE } else { 0.0 });

    let mut record = VesselRecord {
        mmsi,
        kind: *kind,
        lat,
        lon,
        sog: extract_f64(&payload, "Sog")?,
        cog: extract_f64(&payload, "Cog")?,
        heading: extract_u32(&payload, "TrueHeading")?.map(|v| v as u16),
        rot: extract_f64(&payload, "RateOfTurn")?.map(|v| v.round() as i32),
        nav_status: extract_u32(&payload, "NavigationalStatus")?.map(|v| v as u8),
        timestamp_seconds: extract_u32(&payload, "Timestamp")?.map(|v| v as u8),
        position_accuracy: payload.get("PositionAccuracy").and_then(Value::as_bool),
        raim: payload.get("Raim").and_then(Value::as_bool),
        vessel_name,
        callsign: payload
            .get("CallSign")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        vessel_type: extract_u32(&payload, "Type")?.map(|v| v as u8),
        observed_at,
    };

    if record.vessel_name.is_none() {
        record.vessel_name = payload
            .get("Name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }

    Ok(DecodeOutcome::Record(record))
}

/// Extract a field expected to be a JSON number, rejecting it outright if
/// the upstream sent it as a numeric string instead.
fn extract_f64(map: &Map<String, Value>, field: &'static str) -> Result<Option<f64>, DecodeError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(_)) => Err(DecodeError::NumericString { field }),
        _ => Ok(None),
    }
}

fn extract_u32(map: &Map<String, Value>, field: &'static str) -> Result<Option<u32>, DecodeError> {
    Ok(extract_f64(map, field)?.map(|v| v.max(0.0) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(message_key: &str, message_body: &str, meta_extra: &str) -> String {
        format!(
            r#"{{"MetaData":{{"MMSI":123456789,"time_utc":"2024-01-01T00:00:00Z"{meta_extra}}},"Message":{{"{message_key}":{message_body}}}}}"#
        )
    }

    #[test]
    fn decodes_position_report() {
        let f = frame(
            "PositionReport",
            r#"{"Sog":12.5,"Cog":89.9,"TrueHeading":90,"NavigationalStatus":0}"#,
            r#","latitude":48.5,"longitude":-122.8"#,
        );
        let outcome = decode(f.as_bytes()).unwrap();
        match outcome {
            DecodeOutcome::Record(record) => {
                assert_eq!(record.mmsi, 123_456_789);
                assert_eq!(record.kind, VesselKind::PositionClassA);
                assert_eq!(record.sog, Some(12.5));
                assert_eq!(record.lat, 48.5);
            }
            DecodeOutcome::Ignored => panic!("expected a record"),
        }
    }

    #[test]
    fn unknown_variant_is_ignored_not_errored() {
        let f = frame("SomeUnhandledMessage", "{}", "");
        assert_eq!(decode(f.as_bytes()).unwrap(), DecodeOutcome::Ignored);
    }

    #[test]
    fn numeric_string_mmsi_is_rejected() {
        let f = r#"{"MetaData":{"MMSI":"123456789","time_utc":"2024-01-01T00:00:00Z"},"Message":{"PositionReport":{}}}"#;
        assert!(matches!(
            decode(f.as_bytes()),
            Err(DecodeError::NumericString { field: "MMSI" })
        ));
    }

    #[test]
    fn missing_lat_lon_on_static_variant_defaults_to_zero() {
        let f = frame("ShipStaticData", r#"{"CallSign":"FV123","Type":30}"#, "");
        match decode(f.as_bytes()).unwrap() {
            DecodeOutcome::Record(record) => {
                assert_eq!(record.lat, 0.0);
                assert_eq!(record.lon, 0.0);
                assert_eq!(record.kind, VesselKind::StaticVoyage);
                assert_eq!(record.callsign.as_deref(), Some("FV123"));
            }
            DecodeOutcome::Ignored => panic!("expected a record"),
        }
    }

    #[test]
    fn missing_message_key_is_an_error() {
        let f = r#"{"MetaData":{"MMSI":1,"time_utc":"2024-01-01T00:00:00Z"}}"#;
        assert!(matches!(decode(f.as_bytes()), Err(DecodeError::MissingMessage)));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let bytes = [0xff, 0xfe, 0xfd];
        assert!(decode(&bytes).is_err());
    }
}
