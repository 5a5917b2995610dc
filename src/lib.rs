//! peerwire - BitTorrent peer-wire networking core
//!
//! This library provides the two pieces a BitTorrent client needs between
//! its sockets and its session logic: a codec for the BEP-3 peer wire
//! protocol, and a rate-controlled scheduler that multiplexes many
//! non-blocking connections over a shared bandwidth budget.
//!
//! # Modules
//!
//! - [`peer`] - BEP-3 messages, framing, transports and connection buffering
//! - [`scheduler`] - Rate-controlled entity scheduling and the event waiter
//! - [`net`] - Connection groups and the upload/download network manager
//! - [`config`] - Scheduler configuration
//! - [`constants`] - Protocol constants and tuning parameters

pub mod config;
pub mod constants;
pub mod net;
pub mod peer;
pub mod scheduler;

pub use config::{NetworkConfig, SchedulerConfig};
pub use net::{ConnectionGroup, Direction, NetworkManager, PeerHandle};
pub use peer::{
    Bitfield, Handshake, Message, MessageCodec, MessageId, PeerConnection, PeerError, PeerId,
    ProtocolError, TcpTransport, Transport,
};
pub use scheduler::{
    EntityEvent, EntityId, EventWaiter, Priority, RateControlScheduler, RateControlledEntity,
    SchedulerHandle, TickReport,
};

#[cfg(test)]
pub(crate) mod testing;
