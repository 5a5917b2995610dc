use thiserror::Error;

/// A peer violated the wire protocol.
///
/// Protocol errors are fatal to the connection that produced them and to
/// nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The 68-byte handshake was malformed.
    #[error("invalid handshake: {0}")]
    InvalidHandshake(&'static str),

    /// The frame carried a message ID outside the base protocol.
    #[error("unknown message id: {0}")]
    UnknownMessageId(u8),

    /// The frame length does not fit the message type.
    #[error("invalid length {length} for message id {id}")]
    InvalidLength { id: u8, length: usize },

    /// The length prefix exceeds the accepted maximum.
    #[error("message too large: {0} bytes")]
    MessageTooLarge(usize),
}

/// Errors that can occur while moving bytes for a peer.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent something we cannot parse.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The connection was closed locally or by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation timed out.
    #[error("timeout")]
    Timeout,
}

impl PeerError {
    /// Returns true if the error came from the wire format rather than the socket.
    pub fn is_protocol(&self) -> bool {
        matches!(self, PeerError::Protocol(_))
    }
}
