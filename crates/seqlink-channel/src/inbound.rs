//! Receive side: buffering, reassembly and in-order delivery.
//!
//! The assembler is handed datagrams whose checksum trailer has already been
//! verified and stripped. It keeps every datagram that arrives ahead of the
//! cursor in a [`SlotTable`], moves the cursor forward whenever the slot it
//! points at can be consumed, and reports which cumulative acknowledgments
//! the caller should send.

use std::collections::VecDeque;

use seqlink_protocol::{
    Checksum, FRAGMENT_HEAD_LEN, HEADER_LEN, Opcode, SequenceNumber,
    fragment_span, peek_opcode, read_fragment_total, read_sequence,
};
use tracing::{debug, trace};

use crate::{ChannelConfig, ChannelStats, SequencePosition, SlotTable, classify};

/// Checks a reassembled message with the session's checksum and key.
#[derive(Clone, Copy)]
pub struct Verifier<'a> {
    checksum: &'a dyn Checksum,
    key: u32,
}

impl<'a> Verifier<'a> {
    pub fn new(checksum: &'a dyn Checksum, key: u32) -> Self {
        Self { checksum, key }
    }

    fn verify(&self, data: &[u8]) -> Option<usize> {
        self.checksum.verify(data, self.key)
    }
}

/// The fragmented message currently being collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentAssembly {
    /// Sequence number of the head datagram.
    pub start: SequenceNumber,
    /// First sequence number after the message (exclusive).
    pub end: SequenceNumber,
    /// Sequence number of the last progress acknowledgment.
    pub milestone: SequenceNumber,
    /// Declared length of the reassembled message.
    pub total_len: usize,
}

/// Turns datagrams arriving in any order into an ordered payload stream.
#[derive(Debug)]
pub struct InboundAssembler {
    pending: SlotTable,
    delivery: VecDeque<Vec<u8>>,
    fragment: Option<FragmentAssembly>,
    expected: SequenceNumber,
    window: u16,
    progress_interval: u16,
}

impl InboundAssembler {
    pub fn new(config: &ChannelConfig) -> Self {
        Self::starting_at(config, SequenceNumber::default())
    }

    /// Creates an assembler whose cursor starts at `expected`.
    pub fn starting_at(config: &ChannelConfig, expected: SequenceNumber) -> Self {
        Self {
            pending: SlotTable::new(),
            delivery: VecDeque::new(),
            fragment: None,
            expected,
            window: config.window,
            progress_interval: config.progress_ack_interval,
        }
    }

    /// Processes one sequenced datagram (a Packet or a Fragment).
    ///
    /// `raw` is the framed datagram without its checksum trailer.
    /// `is_fragment` says whether it carries the Fragment opcode; whether
    /// that makes it a message head is decided by where the cursor is.
    ///
    /// Returns the sequence numbers to acknowledge, in the order the
    /// acknowledgments should go out.
    pub fn on_datagram(
        &mut self,
        raw: Box<[u8]>,
        is_fragment: bool,
        verifier: &Verifier<'_>,
        stats: &mut ChannelStats,
    ) -> Vec<SequenceNumber> {
        let mut acks = Vec::new();
        let seq = match read_sequence(&raw) {
            Ok(seq) => seq,
            Err(e) => {
                debug!(error = %e, "dropping unsequenced datagram");
                stats.malformed += 1;
                return acks;
            }
        };

        let position = classify(seq, self.expected, self.window);
        trace!(%seq, expected = %self.expected, %position, is_fragment, "inbound datagram");

        match position {
            SequencePosition::Present if self.fragment.is_some() => {
                // The cursor sits on the head of an assembly in progress, so
                // this is a repeat of that head.
                stats.duplicates += 1;
            }
            SequencePosition::Present if is_fragment => {
                self.store(seq, raw, stats);
                if self.begin_fragment(stats) {
                    if !self.try_complete_fragment(verifier, stats, &mut acks) {
                        self.maybe_progress_ack(seq, &mut acks);
                    }
                } else {
                    self.drain_buffered(verifier, stats, &mut acks);
                    acks.push(self.expected.prev());
                }
            }
            SequencePosition::Present => {
                self.deliver(raw[HEADER_LEN..].to_vec(), stats);
                self.expected = self.expected.next();
                self.drain_buffered(verifier, stats, &mut acks);
                acks.push(self.expected.prev());
            }
            SequencePosition::Future => {
                self.store(seq, raw, stats);
                if self.fragment.is_some()
                    && !self.try_complete_fragment(verifier, stats, &mut acks)
                {
                    self.maybe_progress_ack(seq, &mut acks);
                }
            }
            SequencePosition::Past => {
                trace!(%seq, "dropping stale datagram");
                stats.duplicates += 1;
            }
        }
        acks
    }

    /// Takes the next payload ready for the application.
    pub fn pop_delivery(&mut self) -> Option<Vec<u8>> {
        self.delivery.pop_front()
    }

    /// Number of payloads waiting in the delivery queue.
    pub fn ready(&self) -> usize {
        self.delivery.len()
    }

    /// The next sequence number needed for in-order delivery.
    pub fn expected(&self) -> SequenceNumber {
        self.expected
    }

    /// Datagrams held for later consumption.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn fragment(&self) -> Option<&FragmentAssembly> {
        self.fragment.as_ref()
    }

    fn store(&mut self, seq: SequenceNumber, raw: Box<[u8]>, stats: &mut ChannelStats) {
        if self.pending.insert(seq, raw).is_some() {
            trace!(%seq, "replaced buffered datagram");
            stats.replaced_slots += 1;
        }
    }

    fn deliver(&mut self, payload: Vec<u8>, stats: &mut ChannelStats) {
        stats.delivered += 1;
        self.delivery.push_back(payload);
    }

    /// Starts an assembly from the fragment head stored at the cursor.
    ///
    /// A head too short to carry its length field, or claiming more
    /// datagrams than the window admits, is consumed and skipped; returns
    /// `false` in that case.
    fn begin_fragment(&mut self, stats: &mut ChannelStats) -> bool {
        let start = self.expected;
        let total = self.pending.get(start).map(read_fragment_total);
        let total_len = match total {
            Some(Ok(total)) => total as usize,
            Some(Err(e)) => {
                debug!(%start, error = %e, "skipping truncated fragment head");
                return self.skip_cursor(stats);
            }
            None => return false,
        };
        let span = fragment_span(total_len as u32);
        if span > self.window as usize {
            debug!(%start, total_len, span, "fragment head exceeds window, skipping");
            return self.skip_cursor(stats);
        }

        let end = start.wrapping_add(span as u16);
        debug!(%start, %end, total_len, "fragment assembly started");
        self.fragment = Some(FragmentAssembly {
            start,
            end,
            milestone: start,
            total_len,
        });
        true
    }

    fn skip_cursor(&mut self, stats: &mut ChannelStats) -> bool {
        self.pending.take(self.expected);
        self.expected = self.expected.next();
        stats.malformed += 1;
        false
    }

    /// Completes the active assembly if every datagram is in, then drains
    /// whatever became consumable behind it.
    ///
    /// Returns `true` when the assembly finished (delivered or discarded).
    fn try_complete_fragment(
        &mut self,
        verifier: &Verifier<'_>,
        stats: &mut ChannelStats,
        acks: &mut Vec<SequenceNumber>,
    ) -> bool {
        if !self.finish_fragment(verifier, stats) {
            return false;
        }
        acks.push(self.expected.prev());
        let end = self.expected;
        self.drain_buffered(verifier, stats, acks);
        if self.expected != end {
            acks.push(self.expected.prev());
        }
        true
    }

    /// Reassembles the active fragment when complete, moving the cursor to
    /// its end. Emits no acknowledgments.
    fn finish_fragment(&mut self, verifier: &Verifier<'_>, stats: &mut ChannelStats) -> bool {
        let Some(mut assembly) = self.fragment else {
            return false;
        };

        let corrupt = loop {
            let Some(collected) = self.collected_len(&assembly) else {
                return false;
            };
            if collected == assembly.total_len {
                break false;
            }
            // A declared length the span rule undercounts: the sender needed
            // one datagram more than the estimate.
            let span = assembly.end.distance_from(assembly.start);
            if collected < assembly.total_len && span < self.window {
                assembly.end = assembly.end.next();
                self.fragment = Some(assembly);
                trace!(end = %assembly.end, "extending fragment end");
                continue;
            }
            break true;
        };

        let mut message = Vec::with_capacity(assembly.total_len);
        let mut seq = assembly.start;
        while seq != assembly.end {
            if let Some(datagram) = self.pending.take(seq) {
                let framing = if seq == assembly.start {
                    FRAGMENT_HEAD_LEN
                } else {
                    HEADER_LEN
                };
                message.extend_from_slice(datagram.get(framing..).unwrap_or_default());
            }
            seq = seq.next();
        }
        self.expected = assembly.end;
        self.fragment = None;

        if corrupt {
            debug!(
                start = %assembly.start,
                declared = assembly.total_len,
                collected = message.len(),
                "discarding fragment with inconsistent length"
            );
            stats.checksum_failures += 1;
            return true;
        }
        match verifier.verify(&message) {
            Some(body_len) => {
                message.truncate(body_len);
                debug!(start = %assembly.start, len = body_len, "fragment reassembled");
                self.deliver(message, stats);
            }
            None => {
                debug!(start = %assembly.start, "discarding fragment with bad checksum");
                stats.checksum_failures += 1;
            }
        }
        true
    }

    /// Payload bytes held for `assembly`, or `None` while a slot is missing.
    fn collected_len(&self, assembly: &FragmentAssembly) -> Option<usize> {
        let mut collected = 0;
        let mut seq = assembly.start;
        while seq != assembly.end {
            let datagram = self.pending.get(seq)?;
            let framing = if seq == assembly.start {
                FRAGMENT_HEAD_LEN
            } else {
                HEADER_LEN
            };
            collected += datagram.len().saturating_sub(framing);
            seq = seq.next();
        }
        Some(collected)
    }

    /// Consumes buffered datagrams from the cursor onward until a gap or an
    /// incomplete fragment.
    ///
    /// Every fragment completed here is acknowledged at its last datagram,
    /// and again at the final cursor if the drain carried on past it, in the
    /// order nested completions would emit them.
    fn drain_buffered(
        &mut self,
        verifier: &Verifier<'_>,
        stats: &mut ChannelStats,
        acks: &mut Vec<SequenceNumber>,
    ) {
        let mut completed = Vec::new();
        loop {
            if self.fragment.is_some() {
                if !self.finish_fragment(verifier, stats) {
                    break;
                }
                acks.push(self.expected.prev());
                completed.push(self.expected);
                continue;
            }
            let Some(datagram) = self.pending.get(self.expected) else {
                break;
            };
            if matches!(peek_opcode(datagram), Ok(Opcode::Fragment)) {
                self.begin_fragment(stats);
                continue;
            }
            if let Some(datagram) = self.pending.take(self.expected) {
                self.deliver(datagram[HEADER_LEN..].to_vec(), stats);
            }
            self.expected = self.expected.next();
        }

        for end in completed.into_iter().rev() {
            if self.expected != end {
                acks.push(self.expected.prev());
            }
        }
    }

    /// Acknowledges `got` early when it is far enough past the last
    /// milestone of an incomplete assembly.
    fn maybe_progress_ack(&mut self, got: SequenceNumber, acks: &mut Vec<SequenceNumber>) {
        let Some(assembly) = self.fragment.as_mut() else {
            return;
        };
        let delta = got.distance_from(assembly.milestone);
        if delta >= self.progress_interval && delta < self.window {
            trace!(%got, milestone = %assembly.milestone, "progress ack");
            assembly.milestone = got;
            acks.push(got);
        }
    }
}
