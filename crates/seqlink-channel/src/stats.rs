use serde::Serialize;

/// Running counters for one channel.
///
/// Inbound anomalies never surface as errors, so these counters are how a
/// caller finds out that datagrams were dropped and why.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    /// Application payloads handed to the delivery queue.
    pub delivered: u64,
    /// Datagrams discarded as already consumed or repeated.
    pub duplicates: u64,
    /// Buffered datagrams replaced by a later copy for the same sequence.
    pub replaced_slots: u64,
    /// Datagrams or reassembled messages that failed verification.
    pub checksum_failures: u64,
    /// Datagrams too short or otherwise undecodable.
    pub malformed: u64,
    pub acks_sent: u64,
    pub datagrams_sent: u64,
    /// Retained outbound datagrams freed by acknowledgments.
    pub released: u64,
}
