//! Runtime counters and the error taxonomy (§7) surfaced through logging.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use ais_core::model::VesselKind;
use thiserror::Error;

/// Broad error classes the controller reports against, independent of the
/// concrete `thiserror` type that produced them. Kept coarse on purpose: the
/// stats reporter logs counts per kind, not every distinct error value.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    #[error("configuration invalid")]
    ConfigInvalid,
    #[error("upstream transport failure")]
    UpstreamTransport,
    #[error("upstream frame failed to decode")]
    UpstreamDecode,
    #[error("encoder does not support this vessel kind")]
    EncoderUnsupported,
    #[error("write to a connected peer failed")]
    PeerWrite,
    #[error("failed to bind a listening socket")]
    BindFailure,
    #[error("a worker task panicked")]
    UnexpectedPanic,
}

/// Process-lifetime counters. Every counter is a plain atomic; the
/// per-kind histogram is the only field that needs a lock, since it grows an
/// unbounded key set.
#[derive(Debug)]
pub struct Stats {
    pub received: AtomicU64,
    pub converted: AtomicU64,
    pub broadcast_sentences: AtomicU64,
    pub errors: AtomicU64,
    error_histogram: Mutex<HashMap<ErrorKind, u64>>,
    kind_histogram: Mutex<HashMap<VesselKind, u64>>,
    process_start: Instant,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            received: AtomicU64::new(0),
            converted: AtomicU64::new(0),
            broadcast_sentences: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            error_histogram: Mutex::new(HashMap::new()),
            kind_histogram: Mutex::new(HashMap::new()),
            process_start: Instant::now(),
        }
    }
}

impl Stats {
    pub fn new() -> Self {
        Stats::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_converted(&self, kind: VesselKind) {
        self.converted.fetch_add(1, Ordering::Relaxed);
        *self.kind_histogram.lock().expect("kind histogram mutex poisoned").entry(kind).or_insert(0) += 1;
    }

    pub fn record_broadcast_sentences(&self, count: u64) {
        self.broadcast_sentences.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_error(&self, kind: ErrorKind) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        *self.error_histogram.lock().expect("error histogram mutex poisoned").entry(kind).or_insert(0) += 1;
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.process_start.elapsed().as_secs()
    }

    pub fn kind_snapshot(&self) -> HashMap<VesselKind, u64> {
        self.kind_histogram.lock().expect("kind histogram mutex poisoned").clone()
    }

    pub fn error_snapshot(&self) -> HashMap<ErrorKind, u64> {
        self.error_histogram.lock().expect("error histogram mutex poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = Stats::new();
        stats.record_received();
        stats.record_received();
        stats.record_converted(VesselKind::PositionClassA);
        stats.record_broadcast_sentences(3);
        stats.record_error(ErrorKind::PeerWrite);

        assert_eq!(stats.received.load(Ordering::Relaxed), 2);
        assert_eq!(stats.converted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.broadcast_sentences.load(Ordering::Relaxed), 3);
        assert_eq!(stats.errors.load(Ordering::Relaxed), 1);
        assert_eq!(stats.kind_snapshot().get(&VesselKind::PositionClassA), Some(&1));
        assert_eq!(stats.error_snapshot().get(&ErrorKind::PeerWrite), Some(&1));
    }
}
