//! Cyclic 16-bit sequence numbers.
//!
//! Every datagram that takes part in reliable delivery carries a sequence
//! number from a space of 65536 values. Arithmetic wraps: the successor of
//! 65535 is 0, and "how far ahead is B of A" is `B - A mod 65536`.
//!
//! `SequenceNumber` deliberately does not implement `Ord`. Whether 10 is
//! before or after 60000 depends on the window the comparison happens in,
//! so callers ask for a [`distance_from`](SequenceNumber::distance_from)
//! and decide against their own window.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A position in the cyclic sequence space.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SequenceNumber(pub u16);

impl SequenceNumber {
    /// Number of distinct sequence numbers.
    pub const SPACE: usize = 1 << 16;

    /// Wraps a raw value.
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    pub const fn get(self) -> u16 {
        self.0
    }

    /// The successor, wrapping 65535 → 0.
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// The predecessor, wrapping 0 → 65535.
    pub const fn prev(self) -> Self {
        Self(self.0.wrapping_sub(1))
    }

    pub const fn wrapping_add(self, n: u16) -> Self {
        Self(self.0.wrapping_add(n))
    }

    pub const fn wrapping_sub(self, n: u16) -> Self {
        Self(self.0.wrapping_sub(n))
    }

    /// Cyclic forward distance from `earlier` to `self`.
    ///
    /// `SequenceNumber(3).distance_from(SequenceNumber(65534)) == 5`.
    pub const fn distance_from(self, earlier: Self) -> u16 {
        self.0.wrapping_sub(earlier.0)
    }

    /// Slot index into a table of [`Self::SPACE`] entries.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u16> for SequenceNumber {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
