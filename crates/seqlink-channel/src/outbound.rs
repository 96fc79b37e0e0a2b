//! Send side: sequence allocation and retention until acknowledged.

use seqlink_protocol::SequenceNumber;
use tracing::{debug, trace};

use crate::{ChannelConfig, SlotTable};

/// Holds a copy of every sent datagram until the peer acknowledges it.
///
/// There is no retransmission timer; retention is released by
/// acknowledgments alone.
#[derive(Debug)]
pub struct OutboundRetention {
    retained: SlotTable,
    next: SequenceNumber,
    window: u16,
}

impl OutboundRetention {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            retained: SlotTable::new(),
            next: SequenceNumber::default(),
            window: config.window,
        }
    }

    /// Allocates the sequence number for the next outbound datagram.
    pub fn next_sequence(&mut self) -> SequenceNumber {
        let seq = self.next;
        self.next = self.next.next();
        seq
    }

    /// The sequence number the next call to `next_sequence` will return.
    pub fn peek_next(&self) -> SequenceNumber {
        self.next
    }

    /// Keeps a copy of `datagram`, sent as `seq`.
    pub fn record(&mut self, seq: SequenceNumber, datagram: &[u8]) {
        if self
            .retained
            .insert(seq, datagram.to_vec().into_boxed_slice())
            .is_some()
        {
            // The sequence space wrapped with this slot never acknowledged.
            debug!(%seq, "overwrote unacknowledged datagram");
        }
    }

    /// Releases the unbroken run of retained datagrams ending at `seq`.
    ///
    /// Walks backward from `seq` for at most `window` steps and stops at
    /// the first slot with nothing in it. Returns how many were released.
    pub fn on_ack(&mut self, seq: SequenceNumber) -> usize {
        let mut released = 0;
        let mut cursor = seq;
        for _ in 0..self.window {
            if self.retained.take(cursor).is_none() {
                break;
            }
            released += 1;
            cursor = cursor.prev();
        }
        trace!(%seq, released, "ack processed");
        released
    }

    /// Number of datagrams still waiting for acknowledgment.
    pub fn outstanding(&self) -> usize {
        self.retained.len()
    }

    pub fn retained(&self, seq: SequenceNumber) -> Option<&[u8]> {
        self.retained.get(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(n: u16) -> SequenceNumber {
        SequenceNumber(n)
    }

    fn retention() -> OutboundRetention {
        OutboundRetention::new(&ChannelConfig::default())
    }

    #[test]
    fn test_next_sequence_counts_up_and_wraps() {
        let mut out = retention();
        assert_eq!(out.next_sequence(), seq(0));
        assert_eq!(out.next_sequence(), seq(1));
        assert_eq!(out.peek_next(), seq(2));

        let mut out = retention();
        out.next = seq(65535);
        assert_eq!(out.next_sequence(), seq(65535));
        assert_eq!(out.next_sequence(), seq(0));
    }

    #[test]
    fn test_on_ack_releases_cumulative_run() {
        let mut out = retention();
        for n in 10..=15 {
            out.record(seq(n), &[n as u8]);
        }

        assert_eq!(out.on_ack(seq(15)), 6);
        assert_eq!(out.outstanding(), 0);

        assert_eq!(out.on_ack(seq(15)), 0);
    }

    #[test]
    fn test_on_ack_stops_at_gap() {
        let mut out = retention();
        out.record(seq(10), b"ten");
        out.record(seq(12), b"twelve");

        assert_eq!(out.on_ack(seq(12)), 1);

        assert!(out.retained(seq(12)).is_none());
        assert_eq!(out.retained(seq(10)), Some(&b"ten"[..]));
    }

    #[test]
    fn test_on_ack_partial_run_keeps_later() {
        let mut out = retention();
        for n in 0..5 {
            out.record(seq(n), b"x");
        }

        assert_eq!(out.on_ack(seq(2)), 3);
        assert_eq!(out.outstanding(), 2);
        assert!(out.retained(seq(3)).is_some());
    }

    #[test]
    fn test_on_ack_across_wrap() {
        let mut out = retention();
        for n in [65534, 65535, 0, 1] {
            out.record(seq(n), b"w");
        }

        assert_eq!(out.on_ack(seq(1)), 4);
    }

    #[test]
    fn test_on_ack_walk_bounded_by_window() {
        let config = ChannelConfig {
            window: 3,
            ..ChannelConfig::default()
        };
        let mut out = OutboundRetention::new(&config);
        for n in 0..10 {
            out.record(seq(n), b"x");
        }

        assert_eq!(out.on_ack(seq(9)), 3);
        assert_eq!(out.outstanding(), 7);
    }
}
