//! Channel configuration.

use std::time::Duration;

use seqlink_protocol::MAX_DATAGRAM_SIZE;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Tunables for a [`ReliableChannel`](crate::ReliableChannel).
///
/// Missing fields take their defaults when deserialized, so a config file
/// only has to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Look-ahead span in sequence numbers. Datagrams less than `window`
    /// ahead of the cursor are buffered; everything else is stale.
    pub window: u16,

    /// A progress ack is sent mid-fragment whenever a datagram arrives at
    /// least this far past the last one.
    pub progress_ack_interval: u16,

    /// Largest datagram advertised to the peer during the handshake.
    pub max_datagram_size: u32,

    /// Ack-timeout tolerance asked of the peer by
    /// [`request_max_timeout`](crate::ReliableChannel::request_max_timeout).
    pub ack_timeout_request: u32,

    /// Batching delay asked of the peer alongside `ack_timeout_request`.
    pub batch_delay_request: u32,

    /// How often the driver re-sends the last cumulative ack to signal
    /// liveness.
    pub keepalive_interval: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            window: 2048,
            progress_ack_interval: 10,
            max_datagram_size: MAX_DATAGRAM_SIZE as u32,
            ack_timeout_request: 5_000_000,
            batch_delay_request: 25,
            keepalive_interval: Duration::from_secs(5),
        }
    }
}

impl ChannelConfig {
    /// Largest usable window: half the sequence space, so "ahead" and
    /// "behind" never overlap.
    pub const MAX_WINDOW: u16 = 32768;

    /// Clamp any out-of-range values so the config is safe to use.
    ///
    /// Called by [`ReliableChannel::new`](crate::ReliableChannel::new).
    pub fn validated(mut self) -> Self {
        if self.window == 0 || self.window > Self::MAX_WINDOW {
            let clamped = self.window.clamp(1, Self::MAX_WINDOW);
            warn!(
                window = self.window,
                clamped, "window out of range, clamping"
            );
            self.window = clamped;
        }
        if self.progress_ack_interval == 0 {
            warn!("progress_ack_interval of 0 would ack every datagram, using 1");
            self.progress_ack_interval = 1;
        }
        if self.max_datagram_size < MAX_DATAGRAM_SIZE as u32 {
            warn!(
                max_datagram_size = self.max_datagram_size,
                "max_datagram_size smaller than one framed datagram, raising"
            );
            self.max_datagram_size = MAX_DATAGRAM_SIZE as u32;
        }
        if self.keepalive_interval.is_zero() {
            warn!("keepalive_interval of 0, using default");
            self.keepalive_interval = Self::default().keepalive_interval;
        }
        self
    }
}
