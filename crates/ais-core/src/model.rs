//! The normalized intermediate representation produced by the decoder
//! (component C3) and consumed by the encoder (component C2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which AIS message the decoder identified and, consequently, which
/// encoder bit layout applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VesselKind {
    /// AIS message type 1 (Class A position report).
    PositionClassA,
    /// AIS message type 5 (static and voyage-related data).
    StaticVoyage,
    /// AIS message type 18 (Class B position report).
    PositionClassB,
    /// AIS message type 24 (static data report, Parts A and B).
    StaticReport,
}

/// A normalized vessel telemetry report, independent of the upstream wire
/// shape it was decoded from.
///
/// `lat`/`lon` use `91.0`/`181.0` as "not available" sentinels, matching the
/// ITU-R M.1371 wire encoding; the optional fields encode their own
/// "absent" wire values on the encoder side, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselRecord {
    pub mmsi: u32,
    pub kind: VesselKind,
    pub lat: f64,
    pub lon: f64,
    pub sog: Option<f64>,
    pub cog: Option<f64>,
    pub heading: Option<u16>,
    pub rot: Option<i32>,
    pub nav_status: Option<u8>,
    pub timestamp_seconds: Option<u8>,
    pub position_accuracy: Option<bool>,
    pub raim: Option<bool>,
    pub vessel_name: Option<String>,
    pub callsign: Option<String>,
    pub vessel_type: Option<u8>,
    pub observed_at: DateTime<Utc>,
}

impl VesselRecord {
    /// `91.0`/`181.0` mark "position not available" per ITU-R M.1371.
    pub const LAT_UNAVAILABLE: f64 = 91.0;
    pub const LON_UNAVAILABLE: f64 = 181.0;

    pub fn is_valid_position(&self) -> bool {
        self.lat.abs() <= 90.0 && self.lon.abs() <= 180.0
    }
}

/// One `!AIVDM` fragment, ready for sentence framing.
#[derive(Debug, Clone, PartialEq)]
pub struct NmeaSentence {
    pub talker_id: &'static str,
    pub fragment_count: u8,
    pub fragment_number: u8,
    /// Correlates fragments of the same logical message; `None` when there
    /// is only one fragment.
    pub message_id: Option<u8>,
    /// `"A"`, `"B"`, or empty.
    pub channel: &'static str,
    pub armored_payload: String,
    pub fill_bits: u8,
}

impl NmeaSentence {
    /// Render the sentence body and checksum, **without** a trailing CRLF.
    ///
    /// Per the redesign notes, CRLF normalization happens exactly once, at
    /// the controller, right before a sink write — never here.
    pub fn render(&self) -> String {
        let message_id = self
            .message_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        let body = format!(
            "{},{},{},{},{},{},{}",
            self.talker_id,
            self.fragment_count,
            self.fragment_number,
            message_id,
            self.channel,
            self.armored_payload,
            self.fill_bits
        );
        let wrapped = format!("!{body}*00");
        let checksum = crate::bits::nmea_checksum(&wrapped);
        format!("!{body}*{checksum:02X}")
    }
}
