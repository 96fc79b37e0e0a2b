//! Opcodes, layout constants, and the decoded frame type.
//!
//! All multi-byte fields are big-endian. Every datagram starts with a
//! 16-bit opcode; sequenced datagrams (data, fragments, acks) follow it
//! with a 16-bit sequence number.
//!
//! ```text
//! Packet          | op | seq | payload ...                 |
//! Fragment head   | op | seq | total_len (u32) | payload   |
//! Continuation    | op | seq | payload ...                 |
//! Ack             | op | seq |
//! SessionRequest  | op | 2 (u32) | session_id | max_length |
//! SessionResponse | op | session_id | key | trailer | flags | 0 | max_length | 0 |
//! Disconnect      | op | session_id |
//! SessionStat     | op | ack_timeout | batch_delay |
//! ```

use std::fmt;

use crate::{ProtocolError, SequenceNumber};

/// Largest datagram on the wire, checksum trailer included.
pub const MAX_DATAGRAM_SIZE: usize = 512;

/// Bytes at the end of every datagram held back for the checksum trailer.
pub const TRAILER_RESERVE: usize = 4;

/// Largest framed datagram (opcode through payload) before stamping.
pub const MAX_FRAMED_LEN: usize = MAX_DATAGRAM_SIZE - TRAILER_RESERVE;

/// Opcode plus sequence number.
pub const HEADER_LEN: usize = 4;

/// Opcode, sequence number, and the 32-bit total length of a fragment head.
pub const FRAGMENT_HEAD_LEN: usize = 8;

/// Payload bytes carried by a packet or a fragment continuation.
pub const FRAGMENT_CAPACITY: usize = MAX_FRAMED_LEN - HEADER_LEN;

/// Payload bytes that fit in a fragment head after its 8-byte framing.
pub const FRAGMENT_HEAD_CAPACITY: usize = MAX_FRAMED_LEN - FRAGMENT_HEAD_LEN;

/// Per-datagram payload the receiver assumes when it sizes a fragmented
/// message: the full datagram less the sequenced header.
///
/// This overestimates what a datagram really carries, see
/// [`fragment_span`](crate::fragment_span).
pub const SPAN_UNIT: usize = MAX_DATAGRAM_SIZE - HEADER_LEN;

/// Constant second field of every session request.
pub const SESSION_REQUEST_TAG: u32 = 2;

pub(crate) const SESSION_REQUEST_LEN: usize = 14;
pub(crate) const SESSION_RESPONSE_LEN: usize = 21;
pub(crate) const SESSION_DISCONNECT_LEN: usize = 6;
pub(crate) const SESSION_STAT_LEN: usize = 10;

// ---------------------------------------------------------------------------
// Opcode
// ---------------------------------------------------------------------------

/// The 16-bit tag at the front of every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Client → server handshake.
    SessionRequest = 0x01,
    /// Server → client handshake reply carrying the checksum key.
    SessionResponse = 0x02,
    /// Either direction: tear the session down.
    SessionDisconnect = 0x05,
    /// Parameter negotiation (ack timeout tolerance, batching delay).
    SessionStatRequest = 0x07,
    /// One sequenced application payload.
    Packet = 0x09,
    /// One piece of a fragmented message (head or continuation).
    Fragment = 0x0d,
    /// Cumulative acknowledgment.
    Ack = 0x15,
}

impl Opcode {
    /// Returns the wire value.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Whether datagrams with this opcode carry a checksum trailer.
    ///
    /// The handshake pair travels before a key exists, so it never does.
    pub fn is_stamped(self) -> bool {
        !matches!(self, Self::SessionRequest | Self::SessionResponse)
    }

    /// Whether the opcode is followed by a sequence number.
    pub fn is_sequenced(self) -> bool {
        matches!(self, Self::Packet | Self::Fragment | Self::Ack)
    }
}

impl TryFrom<u16> for Opcode {
    type Error = ProtocolError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        match raw {
            0x01 => Ok(Self::SessionRequest),
            0x02 => Ok(Self::SessionResponse),
            0x05 => Ok(Self::SessionDisconnect),
            0x07 => Ok(Self::SessionStatRequest),
            0x09 => Ok(Self::Packet),
            0x0d => Ok(Self::Fragment),
            0x15 => Ok(Self::Ack),
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// A decoded datagram, borrowing its payload from the input buffer.
///
/// `Fragment` only exposes the sequence number: whether a fragment datagram
/// is a message head or a continuation depends on where the receiver's
/// cursor is, not on anything in the datagram itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame<'a> {
    Packet {
        seq: SequenceNumber,
        payload: &'a [u8],
    },
    Fragment {
        seq: SequenceNumber,
    },
    Ack {
        seq: SequenceNumber,
    },
    SessionRequest {
        session_id: u32,
        max_length: u32,
    },
    SessionResponse {
        session_id: u32,
        crc_key: u32,
        max_length: u32,
    },
    SessionDisconnect {
        session_id: u32,
    },
    SessionStat {
        ack_timeout: u32,
        batch_delay: u32,
    },
}

impl Frame<'_> {
    /// The opcode this frame was decoded from.
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Packet { .. } => Opcode::Packet,
            Self::Fragment { .. } => Opcode::Fragment,
            Self::Ack { .. } => Opcode::Ack,
            Self::SessionRequest { .. } => Opcode::SessionRequest,
            Self::SessionResponse { .. } => Opcode::SessionResponse,
            Self::SessionDisconnect { .. } => Opcode::SessionDisconnect,
            Self::SessionStat { .. } => Opcode::SessionStatRequest,
        }
    }
}
