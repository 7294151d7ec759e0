//! Typed errors for the protocol core.
//!
//! Per the redesign away from scattered exception handling, every fallible
//! operation here returns a value-typed [`Result`]; only a buffer overrun in
//! [`crate::bits::BitBuffer`] is allowed to panic, since that is a
//! programmer error rather than a data error.

use thiserror::Error;

/// Failure modes when normalizing an upstream frame into a [`crate::model::VesselRecord`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("field {field} was a numeric string, not a number")]
    NumericString { field: &'static str },

    #[error("frame has no recognized Message variant")]
    MissingMessage,
}

/// Failure modes surfaced while armoring or checksumming a sentence body.
///
/// These never arise from the documented encoder contract (which returns an
/// empty list rather than erroring); they exist for the dearmoring helpers
/// used by the test suite and any defensive parsing callers choose to do.
#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("character '{0}' is outside the AIS 6-bit alphabet")]
    InvalidArmorChar(char),

    #[error("malformed NMEA sentence: missing '!' or '*' delimiter")]
    MalformedSentence,
}
