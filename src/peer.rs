//! Peer wire protocol (BEP-3)
//!
//! This module implements the base BitTorrent peer wire protocol: the
//! message set and its framing, the non-blocking transport contract, and the
//! per-connection buffering that sits between them.

mod bitfield;
mod codec;
mod connection;
mod error;
mod message;
mod peer_id;
mod transport;

pub use bitfield::Bitfield;
pub use codec::{decode, decode_handshake, encode, MessageCodec};
pub use connection::{PeerConnection, PeerState};
pub use error::{PeerError, ProtocolError};
pub use message::{Handshake, Message, MessageId};
pub use peer_id::PeerId;
pub use transport::{TcpTransport, Transport};
