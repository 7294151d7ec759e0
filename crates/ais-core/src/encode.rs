//! NMEA-0183 encoder (component C2): builds 168- or 424-bit AIS payloads
//! and frames them as `!AIVDM` sentences.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::bits::BitBuffer;
use crate::model::{NmeaSentence, VesselKind, VesselRecord};

/// Shared across all type-5 encodes in the process so that fragments of
/// distinct messages don't collide on the same correlation id; wraps at 10
/// per the specification's "monotonic counter modulo 10" guidance.
static MESSAGE_ID_COUNTER: AtomicU8 = AtomicU8::new(0);

fn next_message_id() -> u8 {
    MESSAGE_ID_COUNTER
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some((v + 1) % 10))
        .unwrap()
}

/// Encode a [`VesselRecord`] into one or more [`NmeaSentence`]s.
///
/// Returns an empty `Vec` for a zero MMSI, matching the specified failure
/// semantics: missing identity is a skip, never an error.
pub fn encode(record: &VesselRecord) -> Vec<NmeaSentence> {
    if record.mmsi == 0 {
        return Vec::new();
    }
    match record.kind {
        VesselKind::PositionClassA => vec![encode_position_class_a(record)],
        VesselKind::PositionClassB => vec![encode_position_class_b(record)],
        VesselKind::StaticReport => encode_static_report(record),
        VesselKind::StaticVoyage => encode_static_voyage(record),
    }
}

/// Round `lat`/`lon` degrees to AIS 1/600000-degree units, clamped to the
/// bounds the specification mandates (which double as the "not available"
/// sentinel once the input sentinel of 91.0/181.0 is scaled and clamped).
fn lat_raw(lat: f64) -> i64 {
    (lat * 600_000.0).round().clamp(-54_000_000.0, 54_000_000.0) as i64
}

fn lon_raw(lon: f64) -> i64 {
    (lon * 600_000.0).round().clamp(-108_000_000.0, 108_000_000.0) as i64
}

fn sog_raw(sog: Option<f64>) -> u64 {
    match sog {
        Some(v) if v.is_finite() && v < 102.3 => {
            (v * 10.0).round().clamp(0.0, 1023.0) as u64
        }
        _ => 1023,
    }
}

fn cog_raw(cog: Option<f64>) -> u64 {
    match cog {
        Some(v) if v.is_finite() && v < 360.0 => (v * 10.0).round() as u64,
        _ => 3600,
    }
}

fn heading_raw(heading: Option<u16>) -> u64 {
    match heading {
        Some(v) if v <= 359 => v as u64,
        _ => 511,
    }
}

/// Writes the rate-of-turn field: wire value 128 for anything missing or
/// outside [-127, 127], the raw two's-complement byte otherwise.
fn write_rot(buf: &mut BitBuffer, offset: usize, rot: Option<i32>) {
    match rot {
        Some(v) if (-127..=127).contains(&v) => buf.write_int(offset, 8, v as i64),
        _ => buf.write_uint(offset, 8, 0b1000_0000),
    }
}

fn encode_position_class_a(record: &VesselRecord) -> NmeaSentence {
    let mut buf = BitBuffer::new(168);
    buf.write_uint(0, 6, 1);
    buf.write_uint(6, 2, 0);
    buf.write_uint(8, 30, record.mmsi as u64);
    buf.write_uint(38, 4, record.nav_status.unwrap_or(0) as u64);
    write_rot(&mut buf, 42, record.rot);
    buf.write_uint(50, 10, sog_raw(record.sog));
    buf.write_uint(60, 1, record.position_accuracy.unwrap_or(false) as u64);
    buf.write_int(61, 28, lon_raw(record.lon));
    buf.write_int(89, 27, lat_raw(record.lat));
    buf.write_uint(116, 12, cog_raw(record.cog));
    buf.write_uint(128, 9, heading_raw(record.heading));
    buf.write_uint(137, 6, record.timestamp_seconds.unwrap_or(60) as u64);
    buf.write_uint(143, 2, 0); // maneuver
    buf.write_uint(145, 3, 0); // spare
    buf.write_uint(148, 1, record.raim.unwrap_or(false) as u64);
    buf.write_uint(149, 19, 0); // radio

    frame_single(&buf, "A")
}

fn encode_position_class_b(record: &VesselRecord) -> NmeaSentence {
    let mut buf = BitBuffer::new(168);
    buf.write_uint(0, 6, 18);
    buf.write_uint(6, 2, 0);
    buf.write_uint(8, 30, record.mmsi as u64);
    buf.write_uint(38, 8, 0); // reserved
    buf.write_uint(46, 10, sog_raw(record.sog));
    buf.write_uint(56, 1, record.position_accuracy.unwrap_or(false) as u64);
    buf.write_int(57, 28, lon_raw(record.lon));
    buf.write_int(85, 27, lat_raw(record.lat));
    buf.write_uint(112, 12, cog_raw(record.cog));
    buf.write_uint(124, 9, heading_raw(record.heading));
    buf.write_uint(133, 6, record.timestamp_seconds.unwrap_or(60) as u64);
    buf.write_uint(139, 2, 0);
    buf.write_uint(141, 1, 1); // unit
    buf.write_uint(142, 1, 0); // display
    buf.write_uint(143, 1, 1); // dsc
    buf.write_uint(144, 1, 1); // band
    buf.write_uint(145, 1, 1); // msg22
    buf.write_uint(146, 1, 0); // assigned
    buf.write_uint(147, 1, record.raim.unwrap_or(false) as u64);
    buf.write_uint(148, 1, 1); // comm-state-selector
    buf.write_uint(149, 19, 0);

    frame_single(&buf, "B")
}

fn encode_static_report(record: &VesselRecord) -> Vec<NmeaSentence> {
    let mut part_a = BitBuffer::new(168);
    part_a.write_uint(0, 6, 24);
    part_a.write_uint(6, 2, 0);
    part_a.write_uint(8, 30, record.mmsi as u64);
    part_a.write_uint(38, 2, 0);
    part_a.write_text(40, 20, record.vessel_name.as_deref().unwrap_or(""));
    part_a.write_uint(160, 8, 0);

    let mut part_b = BitBuffer::new(168);
    part_b.write_uint(0, 6, 24);
    part_b.write_uint(6, 2, 0);
    part_b.write_uint(8, 30, record.mmsi as u64);
    part_b.write_uint(38, 2, 1);
    part_b.write_uint(40, 8, record.vessel_type.unwrap_or(0) as u64);
    part_b.write_text(48, 7, "GENERIC");
    part_b.write_text(90, 7, record.callsign.as_deref().unwrap_or(""));
    part_b.write_uint(132, 9, 0); // to_bow
    part_b.write_uint(141, 9, 0); // to_stern
    part_b.write_uint(150, 6, 0); // to_port
    part_b.write_uint(156, 6, 0); // to_starboard
    part_b.write_uint(162, 4, 1); // epfd: GPS
    part_b.write_uint(166, 2, 0);

    vec![frame_single(&part_a, "A"), frame_single(&part_b, "B")]
}

fn encode_static_voyage(record: &VesselRecord) -> Vec<NmeaSentence> {
    let mut buf = BitBuffer::new(424);
    buf.write_uint(0, 6, 5);
    buf.write_uint(6, 2, 0);
    buf.write_uint(8, 30, record.mmsi as u64);
    buf.write_uint(38, 2, 0); // ais_version
    buf.write_uint(40, 30, 0); // imo
    buf.write_text(70, 7, record.callsign.as_deref().unwrap_or(""));
    buf.write_text(112, 20, record.vessel_name.as_deref().unwrap_or(""));
    buf.write_uint(232, 8, record.vessel_type.unwrap_or(0) as u64);
    buf.write_uint(240, 9, 0); // to_bow
    buf.write_uint(249, 9, 0); // to_stern
    buf.write_uint(258, 6, 0); // to_port
    buf.write_uint(264, 6, 0); // to_starboard
    buf.write_uint(270, 4, 1); // epfd: GPS
    buf.write_uint(274, 4, 0); // eta_month
    buf.write_uint(278, 5, 0); // eta_day
    buf.write_uint(283, 5, 24); // eta_hour: not available
    buf.write_uint(288, 6, 60); // eta_minute: not available
    buf.write_uint(294, 8, 0); // draught
    buf.write_text(302, 20, "");
    buf.write_uint(422, 1, 1); // dte
    buf.write_uint(423, 1, 0); // spare

    fragment_type5(&buf)
}

/// Wrap a 168-bit payload into a single, unfragmented sentence.
fn frame_single(buf: &BitBuffer, channel: &'static str) -> NmeaSentence {
    let (armored_payload, fill_bits) = buf.armor();
    NmeaSentence {
        talker_id: "AIVDM",
        fragment_count: 1,
        fragment_number: 1,
        message_id: None,
        channel,
        armored_payload,
        fill_bits,
    }
}

/// Split a 424-bit type-5 payload into one or two sentences, each no longer
/// than 82 characters including the trailing CRLF.
fn fragment_type5(buf: &BitBuffer) -> Vec<NmeaSentence> {
    let (payload, fill_bits) = buf.armor();

    let whole = NmeaSentence {
        talker_id: "AIVDM",
        fragment_count: 1,
        fragment_number: 1,
        message_id: None,
        channel: "A",
        armored_payload: payload.clone(),
        fill_bits,
    };
    if whole.render().len() + 2 <= 82 {
        return vec![whole];
    }

    let message_id = next_message_id();
    let template = NmeaSentence {
        talker_id: "AIVDM",
        fragment_count: 2,
        fragment_number: 1,
        message_id: Some(message_id),
        channel: "A",
        armored_payload: String::new(),
        fill_bits: 0,
    };
    let overhead = template.render().len() + 2;
    let max_first_chars = 82usize.saturating_sub(overhead);
    let split_at = max_first_chars.min(payload.chars().count());

    let first: String = payload.chars().take(split_at).collect();
    let second: String = payload.chars().skip(split_at).collect();

    vec![
        NmeaSentence {
            fragment_number: 1,
            armored_payload: first,
            fill_bits: 0,
            ..template.clone_header()
        },
        NmeaSentence {
            fragment_number: 2,
            armored_payload: second,
            fill_bits,
            ..template.clone_header()
        },
    ]
}

impl NmeaSentence {
    /// Clone every field except `fragment_number`, `armored_payload`, and
    /// `fill_bits`, which callers building fragment sequences always
    /// override.
    fn clone_header(&self) -> NmeaSentence {
        NmeaSentence {
            talker_id: self.talker_id,
            fragment_count: self.fragment_count,
            fragment_number: self.fragment_number,
            message_id: self.message_id,
            channel: self.channel,
            armored_payload: String::new(),
            fill_bits: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VesselKind;
    use approx::assert_relative_eq;
    use chrono::Utc;

    fn base_record(kind: VesselKind, mmsi: u32) -> VesselRecord {
        VesselRecord {
            mmsi,
            kind,
            lat: 0.0,
            lon: 0.0,
            sog: None,
            cog: None,
            heading: None,
            rot: None,
            nav_status: None,
            timestamp_seconds: None,
            position_accuracy: None,
            raim: None,
            vessel_name: None,
            callsign: None,
            vessel_type: None,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn zero_mmsi_yields_no_sentences() {
        let record = base_record(VesselKind::PositionClassA, 0);
        assert!(encode(&record).is_empty());
    }

    #[test]
    fn type1_pacific_northwest_scenario() {
        let mut record = base_record(VesselKind::PositionClassA, 123_456_789);
        record.lat = 48.5000;
        record.lon = -122.8000;
        record.sog = Some(12.5);
        record.cog = Some(89.9);
        record.heading = Some(90);
        record.nav_status = Some(0);
        record.timestamp_seconds = Some(55);
        record.rot = Some(-5);
        record.position_accuracy = Some(true);
        record.raim = Some(false);

        let sentences = encode(&record);
        assert_eq!(sentences.len(), 1);
        let sentence = &sentences[0];
        let rendered = sentence.render();
        assert!(rendered.starts_with("!AIVDM,1,1,,A,"));

        let decoded = BitBuffer::dearmor(&sentence.armored_payload, sentence.fill_bits).unwrap();
        assert_eq!(decoded.read_uint(8, 30), 123_456_789);
        assert_eq!(decoded.read_int(61, 28), -73_680_000);
        assert_eq!(decoded.read_int(89, 27), 29_100_000);
        assert_eq!(decoded.read_uint(50, 10), 125);
        assert_eq!(decoded.read_uint(116, 12), 899);
    }

    #[test]
    fn type1_sentinel_coordinates_scenario() {
        let mut record = base_record(VesselKind::PositionClassA, 111_222_333);
        record.lat = VesselRecord::LAT_UNAVAILABLE;
        record.lon = VesselRecord::LON_UNAVAILABLE;

        let sentences = encode(&record);
        let decoded =
            BitBuffer::dearmor(&sentences[0].armored_payload, sentences[0].fill_bits).unwrap();
        assert_eq!(decoded.read_int(89, 27), 54_000_000);
        assert_eq!(decoded.read_int(61, 28), 108_000_000);
        assert_eq!(decoded.read_uint(50, 10), 1023);
        assert_eq!(decoded.read_uint(116, 12), 3600);
        assert_eq!(decoded.read_uint(128, 9), 511);
    }

    #[test]
    fn type24_vessel_scenario() {
        let mut record = base_record(VesselKind::StaticReport, 987_654_321);
        record.vessel_name = Some("FISHING VESSEL".to_string());
        record.callsign = Some("FV123".to_string());
        record.vessel_type = Some(30);

        let sentences = encode(&record);
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].channel, "A");
        assert_eq!(sentences[1].channel, "B");

        let part_b =
            BitBuffer::dearmor(&sentences[1].armored_payload, sentences[1].fill_bits).unwrap();
        assert_eq!(part_b.read_uint(40, 8), 30);
    }

    #[test]
    fn raim_flips_exactly_one_bit() {
        let mut a = base_record(VesselKind::PositionClassA, 1);
        a.raim = Some(false);
        let mut b = a.clone();
        b.raim = Some(true);

        let sa = &encode(&a)[0];
        let sb = &encode(&b)[0];
        let ba = BitBuffer::dearmor(&sa.armored_payload, sa.fill_bits).unwrap();
        let bb = BitBuffer::dearmor(&sb.armored_payload, sb.fill_bits).unwrap();

        let mut differing_bits = 0;
        for i in 0..168 {
            if ba.read_uint(i, 1) != bb.read_uint(i, 1) {
                differing_bits += 1;
            }
        }
        assert_eq!(differing_bits, 1);
    }

    #[test]
    fn type5_fragments_into_two_sentences_sharing_message_id() {
        let mut record = base_record(VesselKind::StaticVoyage, 555_666_777);
        record.vessel_name = Some("EXAMPLE VESSEL".to_string());
        record.callsign = Some("EX1234".to_string());
        record.vessel_type = Some(70);

        let sentences = encode(&record);
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].message_id, sentences[1].message_id);
        assert!(sentences[0].message_id.is_some());
        for s in &sentences {
            assert!(s.render().len() <= 82);
        }
    }

    #[test]
    fn every_sentence_checksum_is_consistent() {
        let record = {
            let mut r = base_record(VesselKind::PositionClassB, 42);
            r.sog = Some(5.0);
            r
        };
        let sentence = &encode(&record)[0];
        let rendered = sentence.render();
        let (body, checksum_hex) = rendered[1..].split_once('*').unwrap();
        let expected = crate::bits::nmea_checksum(&format!("!{body}*00"));
        assert_eq!(format!("{expected:02X}"), checksum_hex);
    }

    #[test]
    fn sog_clamped_and_rounded() {
        assert_relative_eq!(sog_raw(Some(0.0)) as f64, 0.0);
        assert_eq!(sog_raw(Some(200.0)), 1023);
        assert_eq!(sog_raw(None), 1023);
    }
}
