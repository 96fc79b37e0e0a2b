//! Encoding and decoding of datagrams.
//!
//! Encoders return freshly allocated buffers without a checksum trailer;
//! stamping is a separate step (see [`Checksum`](crate::Checksum)) because
//! the key belongs to the session, not to the frame.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::types::{
    SESSION_DISCONNECT_LEN, SESSION_REQUEST_LEN, SESSION_RESPONSE_LEN,
    SESSION_STAT_LEN,
};
use crate::{
    Frame, HEADER_LEN, Opcode, ProtocolError,
    SESSION_REQUEST_TAG, SequenceNumber,
};

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

impl<'a> Frame<'a> {
    /// Decodes one datagram (checksum trailer already removed).
    ///
    /// # Errors
    /// - [`ProtocolError::Truncated`] if the buffer is shorter than the
    ///   opcode's layout
    /// - [`ProtocolError::UnknownOpcode`] for unrecognised opcodes
    /// - [`ProtocolError::InvalidMessage`] for a session request whose
    ///   constant field is wrong
    pub fn parse(data: &'a [u8]) -> Result<Self, ProtocolError> {
        let opcode = peek_opcode(data)?;
        let mut cur = Cursor::new(data);
        cur.set_position(2);

        let frame = match opcode {
            Opcode::Packet => {
                let seq = read_sequence(data)?;
                Frame::Packet {
                    seq,
                    payload: &data[HEADER_LEN..],
                }
            }
            Opcode::Fragment => Frame::Fragment {
                seq: read_sequence(data)?,
            },
            Opcode::Ack => Frame::Ack {
                seq: read_sequence(data)?,
            },
            Opcode::SessionRequest => {
                require(data, SESSION_REQUEST_LEN)?;
                let tag = read_u32(&mut cur)?;
                if tag != SESSION_REQUEST_TAG {
                    return Err(ProtocolError::InvalidMessage(format!(
                        "session request tag {tag}, expected {SESSION_REQUEST_TAG}"
                    )));
                }
                Frame::SessionRequest {
                    session_id: read_u32(&mut cur)?,
                    max_length: read_u32(&mut cur)?,
                }
            }
            Opcode::SessionResponse => {
                require(data, SESSION_RESPONSE_LEN)?;
                let session_id = read_u32(&mut cur)?;
                let crc_key = read_u32(&mut cur)?;
                // Trailer length, encoding flags, reserved.
                cur.set_position(cur.position() + 3);
                let max_length = read_u32(&mut cur)?;
                Frame::SessionResponse {
                    session_id,
                    crc_key,
                    max_length,
                }
            }
            Opcode::SessionDisconnect => {
                require(data, SESSION_DISCONNECT_LEN)?;
                Frame::SessionDisconnect {
                    session_id: read_u32(&mut cur)?,
                }
            }
            Opcode::SessionStatRequest => {
                require(data, SESSION_STAT_LEN)?;
                Frame::SessionStat {
                    ack_timeout: read_u32(&mut cur)?,
                    batch_delay: read_u32(&mut cur)?,
                }
            }
        };
        Ok(frame)
    }
}

/// Reads the opcode without decoding the rest.
pub fn peek_opcode(data: &[u8]) -> Result<Opcode, ProtocolError> {
    let mut cur = Cursor::new(data);
    Opcode::try_from(read_u16(&mut cur)?)
}

/// Reads the sequence number at bytes 2..4.
pub fn read_sequence(data: &[u8]) -> Result<SequenceNumber, ProtocolError> {
    let mut cur = Cursor::new(data);
    cur.set_position(2);
    Ok(SequenceNumber(read_u16(&mut cur)?))
}

/// Reads the total message length carried by a fragment head.
pub fn read_fragment_total(data: &[u8]) -> Result<u32, ProtocolError> {
    let mut cur = Cursor::new(data);
    cur.set_position(HEADER_LEN as u64);
    read_u32(&mut cur)
}

fn require(data: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if data.len() < needed {
        return Err(ProtocolError::Truncated {
            needed,
            got: data.len(),
        });
    }
    Ok(())
}

fn read_u16(cur: &mut Cursor<&[u8]>) -> Result<u16, ProtocolError> {
    let needed = cur.position() as usize + 2;
    let got = cur.get_ref().len();
    cur.read_u16::<BigEndian>()
        .map_err(|_| ProtocolError::Truncated { needed, got })
}

fn read_u32(cur: &mut Cursor<&[u8]>) -> Result<u32, ProtocolError> {
    let needed = cur.position() as usize + 4;
    let got = cur.get_ref().len();
    cur.read_u32::<BigEndian>()
        .map_err(|_| ProtocolError::Truncated { needed, got })
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn header(opcode: Opcode, capacity: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(capacity);
    let _ = buf.write_u16::<BigEndian>(opcode.as_u16());
    buf
}

fn sequenced(opcode: Opcode, seq: SequenceNumber, extra: usize) -> Vec<u8> {
    let mut buf = header(opcode, HEADER_LEN + extra);
    let _ = buf.write_u16::<BigEndian>(seq.get());
    buf
}

/// A cumulative acknowledgment for `seq`.
pub fn encode_ack(seq: SequenceNumber) -> Vec<u8> {
    sequenced(Opcode::Ack, seq, 0)
}

/// A single-datagram application payload.
pub fn encode_packet(seq: SequenceNumber, payload: &[u8]) -> Vec<u8> {
    let mut buf = sequenced(Opcode::Packet, seq, payload.len());
    buf.extend_from_slice(payload);
    buf
}

/// The first datagram of a fragmented message of `total_len` bytes.
pub fn encode_fragment_head(
    seq: SequenceNumber,
    total_len: u32,
    chunk: &[u8],
) -> Vec<u8> {
    let mut buf = sequenced(Opcode::Fragment, seq, 4 + chunk.len());
    let _ = buf.write_u32::<BigEndian>(total_len);
    buf.extend_from_slice(chunk);
    buf
}

/// A continuation datagram of a fragmented message.
pub fn encode_fragment_continuation(
    seq: SequenceNumber,
    chunk: &[u8],
) -> Vec<u8> {
    let mut buf = sequenced(Opcode::Fragment, seq, chunk.len());
    buf.extend_from_slice(chunk);
    buf
}

/// Handshake opening a session with the given identifier.
pub fn encode_session_request(session_id: u32, max_length: u32) -> Vec<u8> {
    let mut buf = header(Opcode::SessionRequest, SESSION_REQUEST_LEN);
    let _ = buf.write_u32::<BigEndian>(SESSION_REQUEST_TAG);
    let _ = buf.write_u32::<BigEndian>(session_id);
    let _ = buf.write_u32::<BigEndian>(max_length);
    buf
}

/// Handshake reply installing `crc_key` for the session.
///
/// `trailer_len` advertises how many checksum bytes stamped datagrams carry.
pub fn encode_session_response(
    session_id: u32,
    crc_key: u32,
    trailer_len: u8,
    max_length: u32,
) -> Vec<u8> {
    let mut buf = header(Opcode::SessionResponse, SESSION_RESPONSE_LEN);
    let _ = buf.write_u32::<BigEndian>(session_id);
    let _ = buf.write_u32::<BigEndian>(crc_key);
    let _ = buf.write_u8(trailer_len);
    let _ = buf.write_u8(0);
    let _ = buf.write_u8(0);
    let _ = buf.write_u32::<BigEndian>(max_length);
    let _ = buf.write_u32::<BigEndian>(0);
    buf
}

/// Teardown of the session with the given identifier.
pub fn encode_session_disconnect(session_id: u32) -> Vec<u8> {
    let mut buf = header(Opcode::SessionDisconnect, SESSION_DISCONNECT_LEN);
    let _ = buf.write_u32::<BigEndian>(session_id);
    buf
}

/// Parameter negotiation: the peer should tolerate `ack_timeout` before
/// expecting an ack and wait at most `batch_delay` between queued sends.
pub fn encode_session_stat(ack_timeout: u32, batch_delay: u32) -> Vec<u8> {
    let mut buf = header(Opcode::SessionStatRequest, SESSION_STAT_LEN);
    let _ = buf.write_u32::<BigEndian>(ack_timeout);
    let _ = buf.write_u32::<BigEndian>(batch_delay);
    buf
}
