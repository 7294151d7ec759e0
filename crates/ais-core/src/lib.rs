//! Protocol core for the AIS-to-NMEA-0183 relay.
//!
//! This crate is deliberately free of any I/O: it packs AIS payloads bit by
//! bit, armors them into `!AIVDM` sentences, and normalizes heterogeneous
//! upstream JSON frames into a single [`model::VesselRecord`] shape. The
//! binary that owns sockets, reconnects, and fan-out lives in `ais-relay`.

pub mod bits;
pub mod decode;
pub mod encode;
pub mod error;
pub mod model;

pub mod prelude {
    pub use crate::bits::{nmea_checksum, BitBuffer};
    pub use crate::decode::{decode, DecodeOutcome};
    pub use crate::encode::encode;
    pub use crate::error::{DecodeError, EncoderError};
    pub use crate::model::{NmeaSentence, VesselKind, VesselRecord};
}
