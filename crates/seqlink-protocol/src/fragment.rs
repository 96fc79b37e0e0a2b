//! Splitting messages that exceed one datagram.

use crate::{FRAGMENT_CAPACITY, FRAGMENT_HEAD_CAPACITY, SPAN_UNIT};

/// Number of datagrams the receiver reserves for a fragmented message of
/// `total_len` bytes: `floor(total_len / 508) + 1`.
///
/// This assumes every datagram carries 508 bytes, while a head carries at
/// most 500 and a continuation 504. The estimate can therefore fall short
/// of what [`split_message`] produces: by one datagram when the head
/// overflows (501..=507 bytes) and by about one per 64 KB on long
/// messages. The receiver extends its estimate when it runs short.
///
/// Returned as `usize` because a length field from the wire can claim far
/// more datagrams than the 16-bit sequence space holds.
pub fn fragment_span(total_len: u32) -> usize {
    total_len as usize / SPAN_UNIT + 1
}

/// Splits `message` into the chunks carried by a head datagram followed by
/// continuations.
///
/// The head takes up to [`FRAGMENT_HEAD_CAPACITY`] bytes, every
/// continuation up to [`FRAGMENT_CAPACITY`]. An empty message yields one
/// empty head chunk.
pub fn split_message(message: &[u8]) -> Vec<&[u8]> {
    let head_len = message.len().min(FRAGMENT_HEAD_CAPACITY);
    let (head, rest) = message.split_at(head_len);

    let mut chunks = Vec::with_capacity(1 + rest.len() / FRAGMENT_CAPACITY + 1);
    chunks.push(head);
    chunks.extend(rest.chunks(FRAGMENT_CAPACITY));
    chunks
}
