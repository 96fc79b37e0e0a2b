//! Wire protocol for seqlink.
//!
//! This crate defines the bytes that cross the datagram transport:
//!
//! - **Sequence numbers** ([`SequenceNumber`]) — the cyclic 16-bit space
//!   every reliable datagram is numbered in.
//! - **Framing** ([`Opcode`], [`Frame`], the `encode_*` functions) — how a
//!   datagram is laid out, big-endian throughout.
//! - **Fragmentation** ([`split_message`], [`fragment_span`]) — how a
//!   message larger than one datagram is carried by several.
//! - **Checksums** ([`Checksum`], [`NoChecksum`], [`KeyedCrc`]) — the keyed
//!   trailer stamped on outbound datagrams and verified on inbound ones.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw datagrams) and the
//! channel (ordering and reliability). It keeps no state.
//!
//! ```text
//! Transport (datagrams) → Protocol (Frame) → Channel (ordered payloads)
//! ```

mod checksum;
mod codec;
mod error;
mod fragment;
mod sequence;
mod types;

#[cfg(feature = "crc")]
pub use checksum::KeyedCrc;
pub use checksum::{Checksum, NoChecksum};
pub use codec::{
    encode_ack, encode_fragment_continuation, encode_fragment_head,
    encode_packet, encode_session_disconnect, encode_session_request,
    encode_session_response, encode_session_stat, peek_opcode,
    read_fragment_total, read_sequence,
};
pub use error::ProtocolError;
pub use fragment::{fragment_span, split_message};
pub use sequence::SequenceNumber;
pub use types::{
    FRAGMENT_CAPACITY, FRAGMENT_HEAD_CAPACITY, FRAGMENT_HEAD_LEN, Frame,
    HEADER_LEN, MAX_DATAGRAM_SIZE, MAX_FRAMED_LEN, Opcode, SESSION_REQUEST_TAG,
    SPAN_UNIT, TRAILER_RESERVE,
};
