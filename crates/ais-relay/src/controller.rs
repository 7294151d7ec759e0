//! Component C7: owns the upstream client, the broadcast sinks, and the
//! stats reporter, and wires them together into one running service.
//!
//! Exposes independent start/stop for each of C4/C5/C6 plus a status
//! snapshot, for an optional external supervisor per the specified control
//! surface.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ais_core::encode;
use ais_core::model::VesselRecord;
use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::broadcast::{DatagramEmitter, StreamServer};
use crate::config::{BoundingBox, RelayConfig};
use crate::stats::{ErrorKind, Stats};
use crate::upstream::UpstreamClient;

/// Records in flight between the upstream client and the sink fan-out are
/// queued on a bounded channel; once full, the oldest-arriving client drops
/// new sends rather than blocking the whole pipeline on a slow consumer.
const RECORD_CHANNEL_CAPACITY: usize = 1024;
/// Ceiling on draining in-flight broadcasts when the service is asked to
/// stop, per the specified exit behavior.
const SHUTDOWN_DRAIN_CEILING: Duration = Duration::from_secs(2);

/// A point-in-time snapshot of the service's running state and counters,
/// for the read-status half of the control surface.
#[derive(Debug, Clone, Copy)]
pub struct ControllerStatus {
    pub upstream_connected: bool,
    pub stream_running: bool,
    pub datagram_running: bool,
    pub received: u64,
    pub converted: u64,
    pub broadcast_sentences: u64,
    pub errors: u64,
    pub uptime_seconds: u64,
}

pub struct ServiceController {
    config: RelayConfig,
    stats: Arc<Stats>,
    stream_server: Option<Arc<StreamServer>>,
    stream_enabled: Arc<AtomicBool>,
    datagram_emitter: Option<Arc<DatagramEmitter>>,
    datagram_enabled: Arc<AtomicBool>,
    upstream: Arc<UpstreamClient>,
    upstream_task: Option<JoinHandle<()>>,
    stream_task: Option<JoinHandle<()>>,
    fanout_task: Option<JoinHandle<()>>,
    stats_task: Option<JoinHandle<()>>,
}

/// Inspect a completed task's join result: a panic is counted as
/// [`ErrorKind::UnexpectedPanic`], a plain cancellation (from `.abort()`) is
/// not, since that's an expected outcome of stopping a component.
async fn join_checked(stats: &Stats, label: &'static str, handle: JoinHandle<()>) {
    match handle.await {
        Ok(()) => {}
        Err(join_error) => record_join_error(stats, label, join_error),
    }
}

fn record_join_error(stats: &Stats, label: &'static str, join_error: JoinError) {
    if join_error.is_panic() {
        stats.record_error(ErrorKind::UnexpectedPanic);
        error!(task = label, "task panicked");
    } else {
        debug!(task = label, "task cancelled");
    }
}

impl ServiceController {
    pub async fn build(config: RelayConfig) -> Result<Self> {
        let stats = Arc::new(Stats::new());

        let stream_server = if config.network.enable_stream {
            Some(StreamServer::new(config.network.stream.max_connections, stats.clone()))
        } else {
            None
        };

        let datagram_emitter = if config.network.enable_datagram {
            let destination =
                SocketAddr::new(config.network.datagram.host, config.network.datagram.port);
            Some(Arc::new(DatagramEmitter::bind(destination).map_err(|error| {
                stats.record_error(ErrorKind::BindFailure);
                error
            })?))
        } else {
            None
        };

        let upstream = Arc::new(UpstreamClient::new(&config, stats.clone()));
        let stream_enabled = Arc::new(AtomicBool::new(config.network.enable_stream));
        let datagram_enabled = Arc::new(AtomicBool::new(config.network.enable_datagram));

        Ok(ServiceController {
            config,
            stats,
            stream_server,
            stream_enabled,
            datagram_emitter,
            datagram_enabled,
            upstream,
            upstream_task: None,
            stream_task: None,
            fanout_task: None,
            stats_task: None,
        })
    }

    pub fn stats(&self) -> Arc<Stats> {
        self.stats.clone()
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            upstream_connected: self.upstream.is_connected(),
            stream_running: self.stream_task.is_some(),
            datagram_running: self.datagram_enabled.load(Ordering::Relaxed),
            received: self.stats.received.load(Ordering::Relaxed),
            converted: self.stats.converted.load(Ordering::Relaxed),
            broadcast_sentences: self.stats.broadcast_sentences.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
            uptime_seconds: self.stats.uptime_seconds(),
        }
    }

    /// Start every component that's enabled in the configuration: the
    /// stream listener, the upstream client, the record-to-sentence
    /// fan-out, and the periodic stats reporter.
    pub async fn run(&mut self) -> Result<()> {
        self.start_stream().await?;
        self.start_upstream();
        self.stats_task.get_or_insert_with(|| spawn_stats_reporter(&self.stats, &self.config));
        Ok(())
    }

    /// Bind and accept on the configured stream address. A no-op if the
    /// stream server isn't configured, or is already running.
    pub async fn start_stream(&mut self) -> Result<()> {
        if self.stream_task.is_some() {
            return Ok(());
        }
        let Some(server) = self.stream_server.clone() else {
            return Ok(());
        };
        let addr = SocketAddr::new(self.config.network.stream.host, self.config.network.stream.port);
        let stats = self.stats.clone();
        self.stream_task = Some(tokio::spawn(async move {
            if let Err(error) = server.serve(addr).await {
                warn!(%error, "stream server terminated");
                stats.record_error(ErrorKind::BindFailure);
            }
        }));
        self.stream_enabled.store(true, Ordering::Relaxed);
        info!("stream server started");
        Ok(())
    }

    /// Stop accepting new stream connections and suppress further
    /// broadcasts. Already-connected peers are left to the sweep.
    pub async fn stop_stream(&mut self) {
        self.stream_enabled.store(false, Ordering::Relaxed);
        if let Some(task) = self.stream_task.take() {
            task.abort();
            join_checked(&self.stats, "stream", task).await;
        }
        info!("stream server stopped");
    }

    /// Enable datagram emission. A no-op if the emitter isn't configured.
    pub fn start_datagram(&self) {
        if self.datagram_emitter.is_some() {
            self.datagram_enabled.store(true, Ordering::Relaxed);
            info!("datagram emitter started");
        }
    }

    pub fn stop_datagram(&self) {
        self.datagram_enabled.store(false, Ordering::Relaxed);
        info!("datagram emitter stopped");
    }

    /// Spawn the upstream client and the fan-out task that consumes its
    /// decoded records. A no-op if already running.
    pub fn start_upstream(&mut self) {
        if self.upstream_task.is_some() {
            return;
        }
        let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let upstream = self.upstream.clone();
        self.upstream_task = Some(tokio::spawn(async move {
            upstream.run(tx).await;
        }));
        self.fanout_task = Some(self.spawn_fanout(rx));
        info!("upstream client started");
    }

    /// Stop the upstream client and drain the fan-out task that depends on
    /// it, within [`SHUTDOWN_DRAIN_CEILING`].
    pub async fn stop_upstream(&mut self) {
        self.upstream.request_stop();
        let upstream_task = self.upstream_task.take();
        let fanout_task = self.fanout_task.take();
        let stats = self.stats.clone();
        let drain = async move {
            if let Some(task) = upstream_task {
                join_checked(&stats, "upstream", task).await;
            }
            if let Some(task) = fanout_task {
                join_checked(&stats, "fanout", task).await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_DRAIN_CEILING, drain).await.is_err() {
            warn!("upstream/fan-out drain exceeded the shutdown ceiling");
        }
        info!("upstream client stopped");
    }

    fn spawn_fanout(&self, mut rx: mpsc::Receiver<VesselRecord>) -> JoinHandle<()> {
        let stats = self.stats.clone();
        let stream_server = self.stream_server.clone();
        let stream_enabled = self.stream_enabled.clone();
        let datagram_emitter = self.datagram_emitter.clone();
        let datagram_enabled = self.datagram_enabled.clone();

        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                let kind = record.kind;
                let sentences = encode::encode(&record);
                if sentences.is_empty() {
                    stats.record_error(ErrorKind::EncoderUnsupported);
                    continue;
                }
                stats.record_converted(kind);
                stats.record_broadcast_sentences(sentences.len() as u64);
                for sentence in &sentences {
                    let line = sentence.render();
                    if let Some(server) = &stream_server {
                        if stream_enabled.load(Ordering::Relaxed) {
                            let _sent_count = server.broadcast(&line).await;
                        }
                    }
                    if let Some(emitter) = &datagram_emitter {
                        if datagram_enabled.load(Ordering::Relaxed) {
                            let _ = emitter.emit(&line, &stats).await;
                        }
                    }
                }
            }
        })
    }

    /// Stop the upstream client, wait for it to settle, and respawn it with
    /// a new bounding box. The stream and datagram sinks are untouched.
    pub async fn replace_bounding_box(&mut self, bbox: BoundingBox) {
        self.stop_upstream().await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        self.config.bounding_box = bbox;
        self.upstream = Arc::new(UpstreamClient::new(&self.config, self.stats.clone()));
        self.start_upstream();
        info!(?bbox, "replaced upstream bounding box");
    }

    /// Request every component to stop and wait up to two seconds for
    /// in-flight broadcasts to drain before returning.
    pub async fn shutdown(mut self) {
        self.stop_stream().await;
        self.stop_datagram();
        self.stop_upstream().await;
        if let Some(task) = self.stats_task.take() {
            task.abort();
        }
    }
}

fn spawn_stats_reporter(stats: &Arc<Stats>, config: &RelayConfig) -> JoinHandle<()> {
    let stats = stats.clone();
    let interval_seconds = config.logging.statistics_interval_seconds;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
        loop {
            interval.tick().await;
            info!(
                received = stats.received.load(Ordering::Relaxed),
                converted = stats.converted.load(Ordering::Relaxed),
                broadcast_sentences = stats.broadcast_sentences.load(Ordering::Relaxed),
                errors = stats.errors.load(Ordering::Relaxed),
                uptime_seconds = stats.uptime_seconds(),
                "relay statistics"
            );
        }
    })
}
