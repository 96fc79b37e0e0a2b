//! Error types for the protocol layer.
//!
//! Each crate in seqlink defines its own error enum. A `ProtocolError`
//! always means the bytes themselves were wrong, never that a peer or
//! socket misbehaved.

/// Errors that can occur while decoding or encoding datagrams.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The datagram is shorter than its opcode's fixed layout.
    ///
    /// `needed` is the minimum length for the layout, `got` what arrived.
    #[error("datagram truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    /// The first two bytes do not name an opcode this crate understands.
    #[error("unknown opcode {0:#06x}")]
    UnknownOpcode(u16),

    /// The datagram decodes but violates a protocol rule, e.g. a session
    /// request whose constant field is not 2.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
