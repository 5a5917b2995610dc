use super::bitfield::Bitfield;
use super::error::ProtocolError;
use crate::constants::{
    HANDSHAKE_LEN, LENGTH_PREFIX_LEN, PROTOCOL, PROTOCOL_LEN, PROTOCOL_VERSION,
};
use bytes::{BufMut, Bytes, BytesMut};

/// Stable type IDs of the base protocol messages.
///
/// `Handshake` and `KeepAlive` never appear as an ID byte on the wire: the
/// handshake has its own framing and a keep-alive is an empty frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum MessageId {
    Handshake = -1,
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
    KeepAlive = 9,
}

impl MessageId {
    /// The ID byte written after the length prefix, if the message has one.
    pub fn wire_id(self) -> Option<u8> {
        match self {
            MessageId::Handshake | MessageId::KeepAlive => None,
            id => Some(id as i8 as u8),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageId::Handshake => "BT_HANDSHAKE",
            MessageId::Choke => "BT_CHOKE",
            MessageId::Unchoke => "BT_UNCHOKE",
            MessageId::Interested => "BT_INTERESTED",
            MessageId::NotInterested => "BT_UNINTERESTED",
            MessageId::Have => "BT_HAVE",
            MessageId::Bitfield => "BT_BITFIELD",
            MessageId::Request => "BT_REQUEST",
            MessageId::Piece => "BT_PIECE",
            MessageId::Cancel => "BT_CANCEL",
            MessageId::KeepAlive => "BT_KEEP_ALIVE",
        }
    }
}

impl TryFrom<u8> for MessageId {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            _ => Err(ProtocolError::UnknownMessageId(value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub reserved: [u8; 8],
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self {
            reserved: [0u8; 8],
            info_hash,
            peer_id,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub(crate) fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(PROTOCOL_LEN);
        buf.put_slice(PROTOCOL);
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);
    }

    /// Decodes a complete handshake. A short buffer is an error here; use
    /// [`MessageCodec`](super::MessageCodec) when bytes arrive incrementally.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        check_handshake_prefix(data)?;
        if data.len() < HANDSHAKE_LEN {
            return Err(ProtocolError::InvalidHandshake("buffer too short"));
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&data[20..28]);

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[28..48]);

        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);

        Ok(Self {
            reserved,
            info_hash,
            peer_id,
        })
    }
}

/// Validates whatever part of the length byte and protocol string is present.
pub(crate) fn check_handshake_prefix(data: &[u8]) -> Result<(), ProtocolError> {
    match data.first() {
        None => Ok(()),
        Some(&len) if len != PROTOCOL_LEN => {
            Err(ProtocolError::InvalidHandshake("bad protocol string length"))
        }
        Some(_) => {
            let available = data.len().min(1 + PROTOCOL.len());
            if data[1..available] != PROTOCOL[..available - 1] {
                return Err(ProtocolError::InvalidHandshake("bad protocol string"));
            }
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Handshake(Handshake),
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece: u32 },
    Bitfield(Bytes),
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, data: Bytes },
    Cancel { index: u32, begin: u32, length: u32 },
}

impl Message {
    pub fn from_bitfield(bitfield: &Bitfield) -> Self {
        Message::Bitfield(bitfield.to_bytes())
    }

    pub fn id(&self) -> MessageId {
        match self {
            Message::Handshake(_) => MessageId::Handshake,
            Message::KeepAlive => MessageId::KeepAlive,
            Message::Choke => MessageId::Choke,
            Message::Unchoke => MessageId::Unchoke,
            Message::Interested => MessageId::Interested,
            Message::NotInterested => MessageId::NotInterested,
            Message::Have { .. } => MessageId::Have,
            Message::Bitfield(_) => MessageId::Bitfield,
            Message::Request { .. } => MessageId::Request,
            Message::Piece { .. } => MessageId::Piece,
            Message::Cancel { .. } => MessageId::Cancel,
        }
    }

    pub fn version(&self) -> u8 {
        PROTOCOL_VERSION
    }

    pub fn description(&self) -> &'static str {
        self.id().name()
    }

    /// Body length as written in the length prefix. Zero for the handshake,
    /// which is not length-prefixed.
    fn body_len(&self) -> usize {
        match self {
            Message::Handshake(_) | Message::KeepAlive => 0,
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => 1,
            Message::Have { .. } => 5,
            Message::Bitfield(bits) => 1 + bits.len(),
            Message::Request { .. } | Message::Cancel { .. } => 13,
            Message::Piece { data, .. } => 9 + data.len(),
        }
    }

    /// Total number of bytes this message occupies on the wire.
    pub fn wire_len(&self) -> usize {
        match self {
            Message::Handshake(_) => HANDSHAKE_LEN,
            other => LENGTH_PREFIX_LEN + other.body_len(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());

        if let Message::Handshake(handshake) = self {
            handshake.encode_into(&mut buf);
            return buf.freeze();
        }

        buf.put_u32(self.body_len() as u32);
        if let Some(id) = self.id().wire_id() {
            buf.put_u8(id);
        }

        match self {
            Message::Have { piece } => buf.put_u32(*piece),
            Message::Bitfield(bits) => buf.put_slice(bits),
            Message::Request {
                index,
                begin,
                length,
            }
            | Message::Cancel {
                index,
                begin,
                length,
            } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            }
            Message::Piece { index, begin, data } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_slice(data);
            }
            _ => {}
        }

        buf.freeze()
    }
}
