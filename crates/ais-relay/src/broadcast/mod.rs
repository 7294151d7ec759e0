//! Outbound sinks: the TCP/WS stream server (C5) and the UDP datagram
//! emitter (C6). Both consume the same stream of rendered NMEA sentences;
//! which ones run is a config toggle, not a structural choice.

pub mod datagram_emitter;
pub mod stream_server;

pub use datagram_emitter::DatagramEmitter;
pub use stream_server::StreamServer;
