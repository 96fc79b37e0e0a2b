//! Classifying an incoming sequence number against the receive cursor.

use std::fmt;

use seqlink_protocol::SequenceNumber;

/// Where an incoming sequence number sits relative to the one expected next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencePosition {
    /// Exactly the expected sequence number.
    Present,
    /// Ahead of the cursor, inside the look-ahead window: buffer it.
    Future,
    /// Already consumed, or too far away to be trusted: drop it.
    Past,
}

impl fmt::Display for SequencePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Future => write!(f, "future"),
            Self::Past => write!(f, "past"),
        }
    }
}

/// Classifies `got` relative to `expected` with a look-ahead of `window`.
///
/// `got` is [`Future`](SequencePosition::Future) when its cyclic forward
/// distance from `expected` is in `1..window`, or when it is numerically
/// below `expected - window`: the sender has wrapped past 65535 while this
/// side still sits high in the space.
///
/// The second rule only applies once `expected >= window`. Below that the
/// threshold would wrap to a huge value and swallow nearly every stale
/// number, so values just under `expected`, or far below it across the
/// wrap, are [`Past`](SequencePosition::Past).
pub fn classify(
    got: SequenceNumber,
    expected: SequenceNumber,
    window: u16,
) -> SequencePosition {
    if got == expected {
        return SequencePosition::Present;
    }
    if got.distance_from(expected) < window {
        return SequencePosition::Future;
    }
    match expected.get().checked_sub(window) {
        Some(threshold) if got.get() < threshold => SequencePosition::Future,
        _ => SequencePosition::Past,
    }
}
