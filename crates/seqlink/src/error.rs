//! Unified error type for seqlink.

use seqlink_channel::ChannelError;
use seqlink_protocol::ProtocolError;
use seqlink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `seqlink` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
#[derive(Debug, thiserror::Error)]
pub enum SeqlinkError {
    /// A transport-level error (bind, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A wire-format error (truncated datagram, unknown opcode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A channel-level error (message too large, closed).
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The driver task is gone; its handle can no longer reach it.
    #[error("channel driver has stopped")]
    DriverStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let seqlink_err: SeqlinkError = err.into();
        assert!(matches!(seqlink_err, SeqlinkError::Transport(_)));
        assert!(seqlink_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::UnknownOpcode(0x42);
        let seqlink_err: SeqlinkError = err.into();
        assert!(matches!(seqlink_err, SeqlinkError::Protocol(_)));
        assert!(seqlink_err.to_string().contains("0x0042"));
    }

    #[test]
    fn test_from_channel_error() {
        let err = ChannelError::Closed;
        let seqlink_err: SeqlinkError = err.into();
        assert!(matches!(seqlink_err, SeqlinkError::Channel(_)));
        assert_eq!(seqlink_err.to_string(), "channel closed");
    }
}
