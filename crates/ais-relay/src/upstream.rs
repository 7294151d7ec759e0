//! Upstream subscription client (component C4): maintains a websocket
//! connection to the provider, sends the bounding-box subscription frame,
//! and forwards decoded records into the broadcast pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ais_core::decode::{self, DecodeOutcome};
use ais_core::model::VesselRecord;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::config::{BoundingBox, RelayConfig};
use crate::stats::{ErrorKind, Stats};

/// States the client steps through on every connection attempt. Exposed for
/// observability only; nothing outside this module matches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Connecting,
    Subscribing,
    Receiving,
    Closing,
    Failed,
}

#[derive(Serialize)]
struct SubscriptionFrame<'a> {
    #[serde(rename = "APIKey")]
    api_key: &'a str,
    #[serde(rename = "BoundingBoxes")]
    bounding_boxes: Vec<[[f64; 2]; 2]>,
}

/// The time budget given to the subscribe handshake before the attempt is
/// abandoned and retried.
const SUBSCRIBE_DEADLINE: Duration = Duration::from_secs(3);
/// Delay between reconnect attempts after any transport failure.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
/// How long `stop()` waits for the receive loop to notice cancellation.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// Runs the C4 connect/subscribe/receive loop until `stop` is set, forwarding
/// every successfully decoded record to `tx`.
pub struct UpstreamClient {
    stream_url: String,
    api_key: String,
    bounding_box: Arc<std::sync::Mutex<BoundingBox>>,
    stop: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    stats: Arc<Stats>,
}

impl UpstreamClient {
    pub fn new(config: &RelayConfig, stats: Arc<Stats>) -> Self {
        UpstreamClient {
            stream_url: config.stream_url.clone(),
            api_key: config.api_key.clone(),
            bounding_box: Arc::new(std::sync::Mutex::new(config.bounding_box)),
            stop: Arc::new(AtomicBool::new(false)),
            connected: Arc::new(AtomicBool::new(false)),
            stats,
        }
    }

    /// A cloneable handle that lets the controller request a stop from
    /// outside the task this client runs in.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Whether the client currently holds an open, subscribed connection.
    /// Read by the controller's status accessor.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn subscription_payload(&self) -> String {
        let bbox = *self.bounding_box.lock().expect("bounding box mutex poisoned");
        let frame = SubscriptionFrame {
            api_key: &self.api_key,
            bounding_boxes: vec![bbox.to_subscription_array()],
        };
        serde_json::to_string(&frame).expect("subscription frame always serializes")
    }

    /// Connect, subscribe, and forward records until stopped or the
    /// connection drops; on drop, sleep [`RECONNECT_BACKOFF`] and retry.
    pub async fn run(&self, tx: mpsc::Sender<VesselRecord>) {
        let mut state = ClientState::Idle;
        while !self.stop.load(Ordering::Relaxed) {
            self.connected.store(false, Ordering::Relaxed);
            state = ClientState::Connecting;
            info!(?state, url = %self.stream_url, "connecting to upstream");

            let connected = tokio_tungstenite::connect_async(&self.stream_url).await;
            let mut socket = match connected {
                Ok((socket, _response)) => socket,
                Err(error) => {
                    state = ClientState::Failed;
                    warn!(?state, %error, "upstream connection failed");
                    self.stats.record_error(ErrorKind::UpstreamTransport);
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                    continue;
                }
            };

            state = ClientState::Subscribing;
            let payload = self.subscription_payload();
            let subscribe = timeout(SUBSCRIBE_DEADLINE, socket.send(WsMessage::Text(payload)));
            if let Err(_elapsed) = subscribe.await {
                state = ClientState::Failed;
                warn!(?state, "subscription handshake timed out");
                self.stats.record_error(ErrorKind::UpstreamTransport);
                tokio::time::sleep(RECONNECT_BACKOFF).await;
                continue;
            }

            state = ClientState::Receiving;
            self.connected.store(true, Ordering::Relaxed);
            info!(?state, "subscribed, receiving vessel traffic");
            'receive: loop {
                if self.stop.load(Ordering::Relaxed) {
                    break 'receive;
                }
                let next = tokio::time::timeout(STOP_GRACE, socket.next()).await;
                let message = match next {
                    Ok(Some(Ok(message))) => message,
                    Ok(Some(Err(error))) => {
                        state = ClientState::Failed;
                        warn!(?state, %error, "upstream transport error");
                        self.stats.record_error(ErrorKind::UpstreamTransport);
                        break 'receive;
                    }
                    Ok(None) => {
                        state = ClientState::Failed;
                        warn!(?state, "upstream closed the connection");
                        break 'receive;
                    }
                    Err(_elapsed) => continue 'receive,
                };

                let payload = match message {
                    WsMessage::Text(text) => text.into_bytes(),
                    WsMessage::Binary(bytes) => bytes,
                    WsMessage::Close(_) => break 'receive,
                    _ => continue,
                };

                self.stats.record_received();
                match decode::decode(&payload) {
                    Ok(DecodeOutcome::Record(record)) => {
                        if tx.send(record).await.is_err() {
                            break 'receive;
                        }
                    }
                    Ok(DecodeOutcome::Ignored) => {}
                    Err(error) => {
                        debug!(%error, "failed to decode upstream frame");
                        self.stats.record_error(ErrorKind::UpstreamDecode);
                    }
                }
            }

            self.connected.store(false, Ordering::Relaxed);
            state = ClientState::Closing;
            info!(?state, "upstream connection closed, will retry");
            if !self.stop.load(Ordering::Relaxed) {
                tokio::time::sleep(RECONNECT_BACKOFF).await;
            }
        }
        info!(state = ?ClientState::Idle, "upstream client stopped");
    }

    /// Replace the bounding box used on the *next* subscription attempt.
    /// Does not affect an already-open connection; the controller is
    /// responsible for stopping and respawning the client to apply it.
    pub fn set_bounding_box(&self, bbox: BoundingBox) {
        *self.bounding_box.lock().expect("bounding box mutex poisoned") = bbox;
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RelayConfig {
        RelayConfig {
            api_key: "key123".into(),
            stream_url: "wss://example.invalid".into(),
            bounding_box: BoundingBox { north: 49.0, south: 48.0, east: -122.0, west: -123.0 },
            network: crate::config::NetworkConfig {
                enable_stream: true,
                enable_datagram: false,
                stream: crate::config::StreamServerConfig {
                    host: "0.0.0.0".parse().unwrap(),
                    port: 2000,
                    max_connections: 8,
                },
                datagram: crate::config::DatagramConfig {
                    host: "255.255.255.255".parse().unwrap(),
                    port: 2001,
                },
            },
            logging: crate::config::LoggingConfig { statistics_interval_seconds: 30 },
        }
    }

    #[test]
    fn subscription_payload_uses_south_west_north_east_order() {
        let client = UpstreamClient::new(&test_config(), Arc::new(Stats::new()));
        let payload = client.subscription_payload();
        assert!(payload.contains("\"APIKey\":\"key123\""));
        assert!(payload.contains("48.0"));
        assert!(payload.contains("-123.0"));
    }

    #[test]
    fn freshly_constructed_client_is_not_connected() {
        let client = UpstreamClient::new(&test_config(), Arc::new(Stats::new()));
        assert!(!client.is_connected());
    }
}
