//! UDP transport implementation using `tokio::net::UdpSocket`.

use std::io::ErrorKind;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::shutdown::ShutdownSignal;
use crate::{Connection, ConnectionId, TransportError};

/// Largest datagram the socket will send or receive, checksum trailer
/// included.
pub const MAX_UDP_DATAGRAM: usize = 512;

/// A UDP socket connected to a single remote peer.
pub struct UdpConnection {
    id: ConnectionId,
    socket: UdpSocket,
    shutdown: ShutdownSignal,
}

impl UdpConnection {
    /// Binds `local` and connects the socket to `remote`.
    ///
    /// "Connecting" a UDP socket only fixes the default destination and
    /// filters inbound datagrams to that peer; no packets are exchanged.
    pub async fn connect(
        local: &str,
        remote: &str,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(local)
            .await
            .map_err(TransportError::BindFailed)?;
        socket
            .connect(remote)
            .await
            .map_err(TransportError::BindFailed)?;

        let id = ConnectionId::next();
        tracing::debug!(%id, local, remote, "UDP connection ready");
        Ok(Self {
            id,
            socket,
            shutdown: ShutdownSignal::default(),
        })
    }

    /// Binds `local` without a peer. Call [`connect_to`](Self::connect_to)
    /// once the remote address is known.
    pub async fn bind(local: &str) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(local)
            .await
            .map_err(TransportError::BindFailed)?;
        Ok(Self {
            id: ConnectionId::next(),
            socket,
            shutdown: ShutdownSignal::default(),
        })
    }

    /// Fixes the remote peer of a socket created with [`bind`](Self::bind).
    pub async fn connect_to(
        &self,
        remote: SocketAddr,
    ) -> Result<(), TransportError> {
        self.socket
            .connect(remote)
            .await
            .map_err(TransportError::BindFailed)
    }

    /// Returns the local address the socket is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Connection for UdpConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.shutdown.is_triggered() {
            return Err(TransportError::ConnectionClosed(
                "local end closed".into(),
            ));
        }
        if data.len() > MAX_UDP_DATAGRAM {
            return Err(TransportError::Oversized {
                len: data.len(),
                max: MAX_UDP_DATAGRAM,
            });
        }
        match self.socket.send(data).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                tracing::trace!(id = %self.id, "peer port unreachable, datagram lost");
                Ok(())
            }
            Err(e) => Err(TransportError::SendFailed(e)),
        }
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut buf = vec![0u8; MAX_UDP_DATAGRAM];
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.wait() => return Ok(None),
                res = self.socket.recv(&mut buf) => match res {
                    Ok(n) => {
                        buf.truncate(n);
                        return Ok(Some(buf));
                    }
                    // An ICMP error for an earlier send, reported late on a
                    // connected socket.
                    Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                        tracing::trace!(id = %self.id, "peer port unreachable");
                    }
                    Err(e) => return Err(TransportError::ReceiveFailed(e)),
                }
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.shutdown.trigger();
        tracing::debug!(id = %self.id, "UDP connection closed");
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
