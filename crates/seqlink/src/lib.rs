//! # Seqlink
//!
//! Reliable, ordered, arbitrarily large messages over an unreliable
//! datagram link.
//!
//! The layers, bottom up:
//!
//! - [`seqlink_transport`] moves raw datagrams ([`Connection`]).
//! - [`seqlink_protocol`] defines the bytes on the wire.
//! - [`seqlink_channel`] turns datagrams into an ordered payload stream
//!   ([`ReliableChannel`]), without doing any I/O.
//! - This crate drives a channel over a connection from a Tokio task
//!   ([`ChannelDriver`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use seqlink::prelude::*;
//!
//! # async fn run() -> Result<(), SeqlinkError> {
//! let conn = UdpConnection::connect("127.0.0.1:4000", "127.0.0.1:4001").await?;
//! let channel = ReliableChannel::new(ChannelConfig::default(), KeyedCrc);
//! let mut handle = ChannelDriver::spawn(conn, channel);
//!
//! handle.connect().await?;
//! handle.send(b"hello".to_vec()).await?;
//! if let Some(reply) = handle.recv().await {
//!     println!("{} bytes back", reply.len());
//! }
//! handle.disconnect().await?;
//! handle.join().await
//! # }
//! ```

mod driver;
mod error;

pub use driver::{ChannelDriver, DriverHandle, DriverStatus};
pub use error::SeqlinkError;
pub use seqlink_channel::{
    ChannelConfig, ChannelError, ChannelStats, ReliableChannel, SessionState,
};
pub use seqlink_protocol::{Checksum, KeyedCrc, NoChecksum, ProtocolError};
pub use seqlink_transport::{
    Connection, ConnectionId, MemoryConnection, TransportError, UdpConnection,
};

/// Everything needed to drive a channel, in one import.
pub mod prelude {
    pub use crate::{
        ChannelConfig, ChannelDriver, ChannelStats, Checksum, Connection,
        DriverHandle, DriverStatus, KeyedCrc, MemoryConnection, NoChecksum,
        ReliableChannel, SeqlinkError, SessionState, UdpConnection,
    };
}
