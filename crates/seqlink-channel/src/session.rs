//! Session handshake, teardown and parameter negotiation.

use std::fmt;

use rand::Rng;
use seqlink_protocol::{
    encode_session_disconnect, encode_session_request, encode_session_response,
    encode_session_stat,
};
use tracing::{debug, info};

use crate::ChannelError;

/// Lifecycle of a session.
///
/// ```text
/// Idle ──request──▶ Requested ──response──▶ Established
///   │                                          │
///   └───────peer request (responder)───────────┘
///
/// any state ──disconnect──▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Requested,
    Established,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Requested => write!(f, "requested"),
            Self::Established => write!(f, "established"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Session identity and checksum key for one channel.
///
/// Builds the session datagrams (unstamped) and applies the peer's. Until a
/// key is negotiated the key is 0 on both sides, so peers that skip the
/// handshake still agree.
#[derive(Debug)]
pub struct SessionControl {
    state: SessionState,
    session_id: Option<u32>,
    crc_key: u32,
    max_length: u32,
}

impl SessionControl {
    pub fn new(max_length: u32) -> Self {
        Self {
            state: SessionState::Idle,
            session_id: None,
            crc_key: 0,
            max_length,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<u32> {
        self.session_id
    }

    /// Key used to stamp and verify datagrams.
    pub fn crc_key(&self) -> u32 {
        self.crc_key
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Opens a session under a fresh random identifier.
    pub fn request(&mut self) -> Vec<u8> {
        let session_id: u32 = rand::rng().random();
        self.session_id = Some(session_id);
        self.state = SessionState::Requested;
        debug!(session_id, "session requested");
        encode_session_request(session_id, self.max_length)
    }

    /// Applies the peer's handshake reply.
    ///
    /// Returns `false` if it does not answer our outstanding request.
    pub fn on_response(&mut self, session_id: u32, crc_key: u32) -> bool {
        if self.state != SessionState::Requested || self.session_id != Some(session_id) {
            debug!(session_id, state = %self.state, "ignoring unsolicited session response");
            return false;
        }
        self.crc_key = crc_key;
        self.state = SessionState::Established;
        info!(session_id, "session established");
        true
    }

    /// Answers the peer's handshake as the responding side.
    ///
    /// Adopts the peer's identifier, picks a random checksum key and returns
    /// the reply that hands the key over. A repeat of the request that
    /// established the session gets the same key again. `None` once closed,
    /// or for a request under another identifier while established.
    pub fn on_request(&mut self, session_id: u32, trailer_len: usize) -> Option<Vec<u8>> {
        match self.state {
            SessionState::Closed => return None,
            SessionState::Established if self.session_id == Some(session_id) => {
                debug!(session_id, "repeated session request, resending key");
            }
            SessionState::Established => {
                debug!(
                    session_id,
                    current = ?self.session_id,
                    "ignoring session request for another session"
                );
                return None;
            }
            SessionState::Idle | SessionState::Requested => {
                self.session_id = Some(session_id);
                self.crc_key = rand::rng().random();
                self.state = SessionState::Established;
                info!(session_id, "session accepted");
            }
        }
        Some(encode_session_response(
            session_id,
            self.crc_key,
            trailer_len as u8,
            self.max_length,
        ))
    }

    /// Closes the session and returns the teardown datagram for the peer.
    pub fn disconnect(&mut self) -> Result<Vec<u8>, ChannelError> {
        let session_id = self.session_id.ok_or(ChannelError::NoSession)?;
        self.state = SessionState::Closed;
        info!(session_id, "session closed locally");
        Ok(encode_session_disconnect(session_id))
    }

    /// Applies the peer's teardown. A mismatched identifier is ignored.
    pub fn on_disconnect(&mut self, session_id: u32) -> bool {
        if self.session_id != Some(session_id) {
            debug!(session_id, "ignoring disconnect for another session");
            return false;
        }
        self.state = SessionState::Closed;
        info!(session_id, "session closed by peer");
        true
    }

    /// Asks the peer to tolerate `ack_timeout` before expecting an ack and
    /// to batch for at most `batch_delay`.
    pub fn stat_request(&self, ack_timeout: u32, batch_delay: u32) -> Vec<u8> {
        encode_session_stat(ack_timeout, batch_delay)
    }
}
