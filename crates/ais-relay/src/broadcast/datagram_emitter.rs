//! Component C6: emits each rendered sentence as a single UDP datagram,
//! broadcast onto the configured subnet.

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::warn;

use crate::stats::{ErrorKind, Stats};

pub struct DatagramEmitter {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl DatagramEmitter {
    /// Bind a UDP socket with `SO_BROADCAST` set, so datagrams addressed to
    /// a broadcast address (e.g. `255.255.255.255`) actually leave the host.
    pub fn bind(destination: SocketAddr) -> std::io::Result<Self> {
        let domain = if destination.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let raw = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        raw.set_broadcast(true)?;
        raw.set_reuse_address(true)?;
        let bind_addr: SocketAddr = if destination.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };
        raw.bind(&bind_addr.into())?;
        raw.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(raw.into())?;
        Ok(DatagramEmitter { socket, destination })
    }

    /// Send `line` followed by CRLF as a single datagram, returning whether
    /// the send succeeded. A send failure is logged and counted, never
    /// propagated: one lost datagram is not a reason to stall the broadcast
    /// pipeline.
    pub async fn emit(&self, line: &str, stats: &Stats) -> bool {
        let mut framed = String::with_capacity(line.len() + 2);
        framed.push_str(line);
        framed.push_str("\r\n");
        match self.socket.send_to(framed.as_bytes(), self.destination).await {
            Ok(_) => true,
            Err(error) => {
                warn!(%error, destination = %self.destination, "datagram send failed");
                stats.record_error(ErrorKind::PeerWrite);
                false
            }
        }
    }
}
