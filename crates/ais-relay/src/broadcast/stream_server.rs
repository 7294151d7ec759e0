//! Component C5: accepts TCP connections and fans every rendered sentence
//! out to all of them, evicting peers whose writes fail.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::stats::{ErrorKind, Stats};

const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

struct Peer {
    id: u64,
    addr: SocketAddr,
    socket: TcpStream,
}

/// A single mutex guarding the connected-peer list, per the redesign away
/// from per-peer locks: a broadcast only ever takes the lock once, to copy
/// the peer list out, and releases it before doing any network I/O.
pub struct StreamServer {
    peers: Mutex<Vec<Peer>>,
    next_id: AtomicU64,
    max_connections: usize,
    stats: Arc<Stats>,
}

impl StreamServer {
    pub fn new(max_connections: usize, stats: Arc<Stats>) -> Arc<Self> {
        Arc::new(StreamServer {
            peers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            max_connections,
            stats,
        })
    }

    /// Bind `addr` and accept connections until the returned task is
    /// aborted. Each accepted socket is stashed for the next [`Self::broadcast`]
    /// call; the server never reads from peers.
    pub async fn serve(self: Arc<Self>, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await.map_err(|error| {
            self.stats.record_error(ErrorKind::BindFailure);
            error
        })?;
        info!(%addr, "stream server listening");

        {
            let server = self.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(SWEEP_INTERVAL);
                loop {
                    interval.tick().await;
                    server.sweep_dead_peers().await;
                }
            });
        }

        loop {
            let (socket, peer_addr) = listener.accept().await?;
            let mut peers = self.peers.lock().await;
            if peers.len() >= self.max_connections {
                warn!(%peer_addr, max = self.max_connections, "rejecting connection, at capacity");
                drop(peers);
                continue;
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            info!(%peer_addr, id, "peer connected");
            peers.push(Peer { id, addr: peer_addr, socket });
            drop(peers);
        }
    }

    /// Write `line` followed by CRLF to every connected peer, returning the
    /// number of peers that accepted the full write. Peers whose write
    /// fails are dropped from the registry; they are not retried.
    pub async fn broadcast(&self, line: &str) -> usize {
        let mut framed = String::with_capacity(line.len() + 2);
        framed.push_str(line);
        framed.push_str("\r\n");

        let mut peers = self.peers.lock().await;
        let mut targets = std::mem::take(&mut *peers);
        drop(peers);

        let mut survivors = Vec::with_capacity(targets.len());
        for mut peer in targets.drain(..) {
            match peer.socket.write_all(framed.as_bytes()).await {
                Ok(()) => survivors.push(peer),
                Err(error) => {
                    debug!(id = peer.id, addr = %peer.addr, %error, "dropping peer after write failure");
                    self.stats.record_error(ErrorKind::PeerWrite);
                }
            }
        }

        let sent_count = survivors.len();
        let mut peers = self.peers.lock().await;
        peers.extend(survivors);
        sent_count
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.lock().await.len()
    }

    async fn sweep_dead_peers(&self) {
        let mut peers = self.peers.lock().await;
        let before = peers.len();
        peers.retain(|peer| {
            let mut probe = [0u8; 0];
            match peer.socket.try_read(&mut probe) {
                Ok(_) => true,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => true,
                Err(_) => false,
            }
        });
        let evicted = before - peers.len();
        if evicted > 0 {
            debug!(evicted, remaining = peers.len(), "swept dead peers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream as ClientStream;

    #[tokio::test]
    async fn broadcasts_to_connected_peers() {
        let stats = Arc::new(Stats::new());
        let server = StreamServer::new(8, stats);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_for_accept = server.clone();
        tokio::spawn(async move {
            let (socket, peer_addr) = listener.accept().await.unwrap();
            let id = server_for_accept.next_id.fetch_add(1, Ordering::Relaxed);
            server_for_accept.peers.lock().await.push(Peer { id, addr: peer_addr, socket });
        });

        let mut client = ClientStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let sent_count = server.broadcast("!AIVDM,1,1,,A,test,0*00").await;
        assert_eq!(sent_count, 1);

        let mut buf = [0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        let received = String::from_utf8_lossy(&buf[..n]);
        assert_eq!(received, "!AIVDM,1,1,,A,test,0*00\r\n");
    }
}
