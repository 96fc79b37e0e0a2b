//! Datagram transport abstraction for seqlink.
//!
//! Provides the [`Connection`] trait: a point-to-point link that moves whole
//! datagrams, with no ordering or delivery guarantee. Everything above this
//! crate (sequencing, acknowledgment, reassembly) assumes exactly that.
//!
//! # Feature Flags
//!
//! - `udp` (default) — UDP transport via `tokio::net::UdpSocket`
//!
//! [`MemoryConnection`] is always available; it links two endpoints through
//! in-process channels and is what the higher crates use in tests.

mod error;
mod memory;
mod shutdown;
#[cfg(feature = "udp")]
mod udp;

pub use error::TransportError;
pub use memory::MemoryConnection;
#[cfg(feature = "udp")]
pub use udp::{MAX_UDP_DATAGRAM, UdpConnection};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-wide unique id.
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A single link that can send and receive datagrams.
///
/// Datagrams may be dropped, duplicated or reordered by the implementation;
/// callers must not rely on anything beyond "each received buffer is one
/// datagram the peer sent".
///
/// The futures are `Send` so a connection can be driven from a spawned task.
pub trait Connection: Send + Sync + 'static {
    /// Sends one datagram to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next datagram from the remote peer.
    ///
    /// Returns `Ok(None)` once the connection has been closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the connection. Pending and future `recv` calls return `None`.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
