//! Error types for the channel layer.
//!
//! Only outbound operations fail. Anything wrong with an inbound datagram
//! (bad checksum, stale sequence, unknown opcode) is dropped, logged and
//! counted in [`ChannelStats`](crate::ChannelStats) instead.

/// Errors returned by [`ReliableChannel`](crate::ReliableChannel) operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The message needs more datagrams than the receive window admits.
    #[error("message of {len} bytes exceeds maximum of {max}")]
    MessageTooLarge { len: usize, max: usize },

    /// The session was torn down; nothing more can be sent.
    #[error("channel closed")]
    Closed,

    /// A disconnect was asked for before any session identifier existed.
    #[error("no session has been requested")]
    NoSession,
}
