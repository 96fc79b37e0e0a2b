//! Reliable, ordered delivery over an unreliable datagram link.
//!
//! This crate is sans-IO: it turns received datagrams into ordered
//! application payloads and application payloads into datagrams to send,
//! and leaves moving bytes to the caller.
//!
//! - **Window** ([`classify`]) — where an incoming sequence number sits
//!   relative to the receive cursor.
//! - **Inbound** ([`InboundAssembler`]) — buffering ahead of the cursor,
//!   fragment reassembly and cumulative acknowledgments.
//! - **Outbound** ([`OutboundRetention`]) — sent datagrams kept until
//!   acknowledged.
//! - **Session** ([`SessionControl`]) — handshake, teardown and parameter
//!   negotiation.
//! - **Channel** ([`ReliableChannel`]) — all of the above behind one type.
//!
//! # Architecture
//!
//! ```text
//! transport ─▶ checksum ─▶ classify ─▶ InboundAssembler ─▶ poll_delivery
//!                                          │
//!                                          └─▶ acks ─▶ poll_transmit
//! send ─▶ fragment ─▶ OutboundRetention ─▶ poll_transmit
//! ```

mod channel;
mod config;
mod error;
mod inbound;
mod outbound;
mod session;
mod slots;
mod stats;
mod window;

pub use channel::ReliableChannel;
pub use config::ChannelConfig;
pub use error::ChannelError;
pub use inbound::{FragmentAssembly, InboundAssembler, Verifier};
pub use outbound::OutboundRetention;
pub use session::{SessionControl, SessionState};
pub use slots::SlotTable;
pub use stats::ChannelStats;
pub use window::{SequencePosition, classify};
