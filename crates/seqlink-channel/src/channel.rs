//! The reliable channel: every component wired together, no I/O.

use std::collections::VecDeque;

use seqlink_protocol::{
    Checksum, FRAGMENT_CAPACITY, FRAGMENT_HEAD_CAPACITY, Frame,
    MAX_DATAGRAM_SIZE, MAX_FRAMED_LEN, Opcode, TRAILER_RESERVE, SequenceNumber, encode_ack, encode_fragment_continuation,
    encode_fragment_head, encode_packet, peek_opcode, split_message,
};
use tracing::{debug, trace};

use crate::{
    ChannelConfig, ChannelError, ChannelStats, InboundAssembler,
    OutboundRetention, SessionControl, SessionState, Verifier,
};

/// Ordered, gap-free, duplicate-free delivery over an unreliable datagram
/// link.
///
/// The channel performs no I/O. Feed it what the transport receives with
/// [`handle_datagram`](Self::handle_datagram), drain what it wants sent with
/// [`poll_transmit`](Self::poll_transmit), and collect application payloads
/// with [`poll_delivery`](Self::poll_delivery). All calls for one channel
/// must come from one thread of control; see `seqlink::ChannelDriver` for
/// an async pump over a real connection.
///
/// # Example
///
/// ```
/// use seqlink_channel::{ChannelConfig, ReliableChannel};
/// use seqlink_protocol::NoChecksum;
///
/// let mut a = ReliableChannel::new(ChannelConfig::default(), NoChecksum);
/// let mut b = ReliableChannel::new(ChannelConfig::default(), NoChecksum);
///
/// a.send(b"hello").unwrap();
/// while let Some(datagram) = a.poll_transmit() {
///     b.handle_datagram(&datagram);
/// }
/// assert_eq!(b.poll_delivery(), Some(b"hello".to_vec()));
/// ```
#[derive(Debug)]
pub struct ReliableChannel<C> {
    config: ChannelConfig,
    checksum: C,
    inbound: InboundAssembler,
    outbound: OutboundRetention,
    session: SessionControl,
    outbox: VecDeque<Vec<u8>>,
    stats: ChannelStats,
}

impl<C: Checksum> ReliableChannel<C> {
    pub fn new(config: ChannelConfig, checksum: C) -> Self {
        debug_assert!(checksum.trailer_len() <= TRAILER_RESERVE);
        let config = config.validated();
        Self {
            inbound: InboundAssembler::new(&config),
            outbound: OutboundRetention::new(&config),
            session: SessionControl::new(config.max_datagram_size),
            outbox: VecDeque::new(),
            stats: ChannelStats::default(),
            checksum,
            config,
        }
    }

    /// Processes one datagram received from the transport.
    ///
    /// Never fails: anything unusable is dropped and counted in
    /// [`stats`](Self::stats).
    pub fn handle_datagram(&mut self, raw: &[u8]) {
        if self.session.is_closed() {
            trace!(len = raw.len(), "channel closed, dropping datagram");
            return;
        }

        let opcode = match peek_opcode(raw) {
            Ok(opcode) => opcode,
            Err(e) => {
                debug!(error = %e, len = raw.len(), "dropping undecodable datagram");
                self.stats.malformed += 1;
                return;
            }
        };
        let body = if opcode.is_stamped() {
            match self.checksum.verify(raw, self.session.crc_key()) {
                Some(len) => &raw[..len],
                None => {
                    debug!(%opcode, len = raw.len(), "dropping datagram with bad checksum");
                    self.stats.checksum_failures += 1;
                    return;
                }
            }
        } else {
            raw
        };
        let frame = match Frame::parse(body) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(%opcode, error = %e, "dropping malformed datagram");
                self.stats.malformed += 1;
                return;
            }
        };

        match frame {
            Frame::Packet { .. } | Frame::Fragment { .. } => {
                let verifier = Verifier::new(&self.checksum, self.session.crc_key());
                let acks = self.inbound.on_datagram(
                    body.into(),
                    opcode == Opcode::Fragment,
                    &verifier,
                    &mut self.stats,
                );
                for seq in acks {
                    self.send_ack(seq);
                }
            }
            Frame::Ack { seq } => {
                let released = self.outbound.on_ack(seq);
                self.stats.released += released as u64;
            }
            Frame::SessionRequest { session_id, .. } => {
                if let Some(reply) =
                    self.session.on_request(session_id, self.checksum.trailer_len())
                {
                    self.push_unstamped(reply);
                }
            }
            Frame::SessionResponse {
                session_id,
                crc_key,
                ..
            } => {
                self.session.on_response(session_id, crc_key);
            }
            Frame::SessionDisconnect { session_id } => {
                self.session.on_disconnect(session_id);
            }
            Frame::SessionStat {
                ack_timeout,
                batch_delay,
            } => {
                debug!(ack_timeout, batch_delay, "peer requested session parameters");
            }
        }
    }

    /// Queues `payload` for delivery to the peer.
    ///
    /// Payloads up to 504 bytes travel in one datagram; larger ones are
    /// checksummed as a whole and fragmented.
    ///
    /// # Errors
    /// - [`ChannelError::Closed`] after either side disconnected
    /// - [`ChannelError::MessageTooLarge`] if the fragments would not fit
    ///   in the receive window
    pub fn send(&mut self, payload: &[u8]) -> Result<(), ChannelError> {
        if self.session.is_closed() {
            return Err(ChannelError::Closed);
        }

        if payload.len() <= FRAGMENT_CAPACITY {
            let seq = self.outbound.next_sequence();
            self.push_sequenced(seq, encode_packet(seq, payload));
            return Ok(());
        }

        let max = self.max_message_len();
        if payload.len() > max {
            return Err(ChannelError::MessageTooLarge {
                len: payload.len(),
                max,
            });
        }

        let mut message = payload.to_vec();
        self.checksum.stamp(&mut message, self.session.crc_key());
        let total_len = message.len() as u32;
        let chunks = split_message(&message);
        debug!(
            len = payload.len(),
            datagrams = chunks.len(),
            start = %self.outbound.peek_next(),
            "fragmenting message"
        );

        for (i, chunk) in chunks.into_iter().enumerate() {
            let seq = self.outbound.next_sequence();
            let datagram = if i == 0 {
                encode_fragment_head(seq, total_len, chunk)
            } else {
                encode_fragment_continuation(seq, chunk)
            };
            self.push_sequenced(seq, datagram);
        }
        Ok(())
    }

    /// Largest payload [`send`](Self::send) accepts: a head plus
    /// `window - 1` continuations, minus the checksum trailer.
    pub fn max_message_len(&self) -> usize {
        let datagrams = self.config.window as usize;
        (FRAGMENT_HEAD_CAPACITY + FRAGMENT_CAPACITY * (datagrams - 1))
            .saturating_sub(self.checksum.trailer_len())
    }

    /// Takes the next in-order payload received from the peer.
    pub fn poll_delivery(&mut self) -> Option<Vec<u8>> {
        self.inbound.pop_delivery()
    }

    /// Takes the next datagram that should go out on the transport.
    pub fn poll_transmit(&mut self) -> Option<Vec<u8>> {
        self.outbox.pop_front()
    }

    /// Queues a cumulative acknowledgment for `seq`.
    pub fn send_ack(&mut self, seq: SequenceNumber) {
        trace!(%seq, "queueing ack");
        self.stats.acks_sent += 1;
        self.push_stamped(encode_ack(seq));
    }

    /// Re-acknowledges the last in-order sequence number to signal
    /// liveness.
    pub fn send_keep_alive_ack(&mut self) {
        if self.session.is_closed() {
            return;
        }
        self.send_ack(self.inbound.expected().prev());
    }

    /// Starts a session handshake under a random identifier.
    pub fn connect(&mut self) -> Result<(), ChannelError> {
        if self.session.is_closed() {
            return Err(ChannelError::Closed);
        }
        let request = self.session.request();
        self.push_unstamped(request);
        Ok(())
    }

    /// Tears the session down and tells the peer.
    ///
    /// # Errors
    /// [`ChannelError::NoSession`] if no session identifier exists yet,
    /// [`ChannelError::Closed`] if already closed.
    pub fn disconnect(&mut self) -> Result<(), ChannelError> {
        if self.session.is_closed() {
            return Err(ChannelError::Closed);
        }
        let datagram = self.session.disconnect()?;
        self.push_stamped(datagram);
        Ok(())
    }

    /// Asks the peer to raise its ack-timeout tolerance and lower its
    /// batching delay, using the values from [`ChannelConfig`].
    pub fn request_max_timeout(&mut self) -> Result<(), ChannelError> {
        if self.session.is_closed() {
            return Err(ChannelError::Closed);
        }
        let datagram = self.session.stat_request(
            self.config.ack_timeout_request,
            self.config.batch_delay_request,
        );
        self.push_stamped(datagram);
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session_id(&self) -> Option<u32> {
        self.session.session_id()
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// The next inbound sequence number needed for in-order delivery.
    pub fn expected_sequence(&self) -> SequenceNumber {
        self.inbound.expected()
    }

    /// Inbound datagrams buffered ahead of the cursor.
    pub fn pending_inbound(&self) -> usize {
        self.inbound.pending_len()
    }

    /// Sent datagrams not yet acknowledged.
    pub fn outstanding(&self) -> usize {
        self.outbound.outstanding()
    }

    /// Whether datagrams are waiting in the outbox.
    pub fn has_transmit(&self) -> bool {
        !self.outbox.is_empty()
    }

    fn push_sequenced(&mut self, seq: SequenceNumber, mut datagram: Vec<u8>) {
        debug_assert!(datagram.len() <= MAX_FRAMED_LEN);
        self.checksum.stamp(&mut datagram, self.session.crc_key());
        debug_assert!(datagram.len() <= MAX_DATAGRAM_SIZE);
        self.outbound.record(seq, &datagram);
        self.stats.datagrams_sent += 1;
        self.outbox.push_back(datagram);
    }

    fn push_stamped(&mut self, mut datagram: Vec<u8>) {
        self.checksum.stamp(&mut datagram, self.session.crc_key());
        self.push_unstamped(datagram);
    }

    fn push_unstamped(&mut self, datagram: Vec<u8>) {
        self.stats.datagrams_sent += 1;
        self.outbox.push_back(datagram);
    }
}

#[cfg(test)]
mod tests {
    use seqlink_protocol::{KeyedCrc, NoChecksum};

    use super::*;

    fn pair<C: Checksum + Clone>(
        checksum: C,
    ) -> (ReliableChannel<C>, ReliableChannel<C>) {
        (
            ReliableChannel::new(ChannelConfig::default(), checksum.clone()),
            ReliableChannel::new(ChannelConfig::default(), checksum),
        )
    }

    /// Moves everything `from` wants to send into `to`.
    fn pump<C: Checksum>(from: &mut ReliableChannel<C>, to: &mut ReliableChannel<C>) -> usize {
        let mut moved = 0;
        while let Some(datagram) = from.poll_transmit() {
            to.handle_datagram(&datagram);
            moved += 1;
        }
        moved
    }

    fn deliveries<C: Checksum>(channel: &mut ReliableChannel<C>) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| channel.poll_delivery()).collect()
    }

    #[test]
    fn test_send_small_payload_is_one_packet() {
        let (mut a, _) = pair(NoChecksum);
        a.send(b"ping").unwrap();

        let datagram = a.poll_transmit().unwrap();
        assert_eq!(
            Frame::parse(&datagram).unwrap(),
            Frame::Packet {
                seq: SequenceNumber(0),
                payload: b"ping"
            }
        );
        assert!(a.poll_transmit().is_none());
        assert_eq!(a.outstanding(), 1);
    }

    #[test]
    fn test_send_then_ack_releases_retention() {
        let (mut a, mut b) = pair(KeyedCrc);
        a.send(b"one").unwrap();
        a.send(b"two").unwrap();

        pump(&mut a, &mut b);
        assert_eq!(deliveries(&mut b), vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(b.stats().acks_sent, 2);

        pump(&mut b, &mut a);
        assert_eq!(a.outstanding(), 0);
        assert_eq!(a.stats().released, 2);
    }

    #[test]
    fn test_send_large_payload_fragments_and_reassembles() {
        let (mut a, mut b) = pair(KeyedCrc);
        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 253) as u8).collect();

        a.send(&payload).unwrap();
        let sent = pump(&mut a, &mut b);

        assert_eq!(sent, 10);
        assert_eq!(deliveries(&mut b), vec![payload]);
        assert_eq!(b.expected_sequence(), SequenceNumber(10));
    }

    #[test]
    fn test_send_boundary_payloads_round_trip() {
        let (mut a, mut b) = pair(KeyedCrc);
        // Around the packet limit, the head overflow band and the point
        // where long messages outgrow the receiver's span estimate.
        let lengths = [503, 504, 505, 506, 1001, 1002, 1003, 1010, 1011, 50_000];
        for len in lengths {
            a.send(&vec![len as u8; len]).unwrap();
        }
        pump(&mut a, &mut b);

        let got = deliveries(&mut b);
        assert_eq!(got.len(), lengths.len());
        for (payload, len) in got.iter().zip(lengths) {
            assert_eq!(payload.len(), len);
        }
        assert_eq!(b.pending_inbound(), 0);
    }

    #[test]
    fn test_send_too_large_is_rejected() {
        let config = ChannelConfig {
            window: 4,
            ..ChannelConfig::default()
        };
        let mut a = ReliableChannel::new(config, KeyedCrc);
        let max = a.max_message_len();
        assert_eq!(max, 500 + 504 * 3 - 2);

        let err = a.send(&vec![0u8; max + 1]).unwrap_err();
        assert!(matches!(err, ChannelError::MessageTooLarge { len, .. } if len == max + 1));

        a.send(&vec![0u8; max]).unwrap();
        assert_eq!(std::iter::from_fn(|| a.poll_transmit()).count(), 4);
    }

    #[test]
    fn test_send_never_exceeds_max_datagram_size() {
        let (mut a, _) = pair(KeyedCrc);
        a.send(&[1u8; 504]).unwrap();
        a.send(&[2u8; 1200]).unwrap();

        let sizes: Vec<usize> = std::iter::from_fn(|| a.poll_transmit())
            .map(|d| d.len())
            .collect();
        // 508 framed bytes plus the 2-byte trailer; the stamped 1200-byte
        // message splits 500/504/198.
        assert_eq!(sizes, vec![510, 510, 510, 204]);

        a.send(&vec![3u8; 50_000]).unwrap();
        a.connect().unwrap();
        a.request_max_timeout().unwrap();
        while let Some(datagram) = a.poll_transmit() {
            assert!(datagram.len() <= MAX_DATAGRAM_SIZE, "{} bytes", datagram.len());
        }
    }

    #[test]
    fn test_handle_datagram_bad_checksum_is_counted() {
        let (mut a, mut b) = pair(KeyedCrc);
        a.send(b"data").unwrap();
        let mut datagram = a.poll_transmit().unwrap();
        datagram[4] ^= 0xFF;

        b.handle_datagram(&datagram);

        assert_eq!(b.stats().checksum_failures, 1);
        assert!(b.poll_delivery().is_none());
        assert!(b.poll_transmit().is_none());
    }

    #[test]
    fn test_handle_datagram_garbage_is_malformed() {
        let (_, mut b) = pair(NoChecksum);
        b.handle_datagram(&[0xFF]);
        b.handle_datagram(&[0xAB, 0xCD, 0, 0]);
        assert_eq!(b.stats().malformed, 2);
    }

    #[test]
    fn test_handshake_installs_shared_key() {
        let (mut client, mut server) = pair(KeyedCrc);

        client.connect().unwrap();
        assert_eq!(client.state(), SessionState::Requested);
        pump(&mut client, &mut server);
        assert_eq!(server.state(), SessionState::Established);
        pump(&mut server, &mut client);
        assert_eq!(client.state(), SessionState::Established);
        assert_eq!(client.session_id(), server.session_id());

        client.send(b"keyed").unwrap();
        pump(&mut client, &mut server);
        assert_eq!(server.poll_delivery(), Some(b"keyed".to_vec()));
        assert_eq!(server.stats().checksum_failures, 0);
    }

    #[test]
    fn test_repeated_session_request_keeps_key() {
        let (mut client, mut server) = pair(KeyedCrc);
        client.connect().unwrap();
        let request = client.poll_transmit().unwrap();

        server.handle_datagram(&request);
        server.handle_datagram(&request);
        pump(&mut server, &mut client);
        assert_eq!(client.state(), SessionState::Established);

        client.send(b"hello").unwrap();
        pump(&mut client, &mut server);
        assert_eq!(server.poll_delivery(), Some(b"hello".to_vec()));
        assert_eq!(server.stats().checksum_failures, 0);
    }

    #[test]
    fn test_disconnect_closes_both_sides() {
        let (mut client, mut server) = pair(KeyedCrc);
        client.connect().unwrap();
        pump(&mut client, &mut server);
        pump(&mut server, &mut client);

        client.disconnect().unwrap();
        pump(&mut client, &mut server);

        assert_eq!(client.state(), SessionState::Closed);
        assert_eq!(server.state(), SessionState::Closed);
        assert!(matches!(client.send(b"x"), Err(ChannelError::Closed)));
        assert!(matches!(server.send(b"x"), Err(ChannelError::Closed)));
        assert!(matches!(client.disconnect(), Err(ChannelError::Closed)));
    }

    #[test]
    fn test_disconnect_before_handshake_is_no_session() {
        let (mut a, _) = pair(NoChecksum);
        assert!(matches!(a.disconnect(), Err(ChannelError::NoSession)));
    }

    #[test]
    fn test_closed_channel_drops_inbound() {
        let (mut a, mut b) = pair(NoChecksum);
        b.connect().unwrap();
        b.disconnect().unwrap();
        while b.poll_transmit().is_some() {}

        a.send(b"late").unwrap();
        pump(&mut a, &mut b);

        assert!(b.poll_delivery().is_none());
        assert!(!b.has_transmit());
    }

    #[test]
    fn test_keep_alive_acks_last_in_order() {
        let (mut a, mut b) = pair(NoChecksum);
        a.send(b"one").unwrap();
        pump(&mut a, &mut b);
        while b.poll_transmit().is_some() {}

        b.send_keep_alive_ack();

        let datagram = b.poll_transmit().unwrap();
        assert_eq!(
            Frame::parse(&datagram).unwrap(),
            Frame::Ack {
                seq: SequenceNumber(0)
            }
        );
    }

    #[test]
    fn test_request_max_timeout_uses_config() {
        let (mut a, mut b) = pair(KeyedCrc);
        a.request_max_timeout().unwrap();

        let datagram = a.poll_transmit().unwrap();
        let body = KeyedCrc.verify(&datagram, 0).unwrap();
        assert_eq!(
            Frame::parse(&datagram[..body]).unwrap(),
            Frame::SessionStat {
                ack_timeout: 5_000_000,
                batch_delay: 25,
            }
        );

        b.handle_datagram(&datagram);
        assert_eq!(b.stats().malformed, 0);
        assert_eq!(b.stats().checksum_failures, 0);
    }

    #[test]
    fn test_new_validates_config() {
        let config = ChannelConfig {
            window: 0,
            ..ChannelConfig::default()
        };
        let channel = ReliableChannel::new(config, NoChecksum);
        assert_eq!(channel.config().window, 1);
    }
}
