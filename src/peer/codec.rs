//! Incremental framing of peer-wire messages.
//!
//! Decoders never consume input on their own: they inspect a buffer and
//! either report `Ok(None)` because the frame is still incomplete, or return
//! the message together with the exact number of bytes it occupied so the
//! caller can advance its read cursor.

use super::error::ProtocolError;
use super::message::{check_handshake_prefix, Handshake, Message, MessageId};
use crate::constants::{HANDSHAKE_LEN, LENGTH_PREFIX_LEN, MAX_MESSAGE_SIZE};
use bytes::{Buf, Bytes};

/// Encodes a message into its wire form.
pub fn encode(message: &Message) -> Bytes {
    message.encode()
}

/// Decodes one length-prefixed frame from the front of `data`.
///
/// Returns `Ok(None)` while the frame is incomplete. Errors are reported as
/// soon as the offending bytes are visible: an oversized prefix fails before
/// the body arrives, and an unknown ID fails once its byte is buffered.
pub fn decode(data: &[u8]) -> Result<Option<(Message, usize)>, ProtocolError> {
    decode_with_limit(data, MAX_MESSAGE_SIZE)
}

fn decode_with_limit(
    data: &[u8],
    max_message_size: usize,
) -> Result<Option<(Message, usize)>, ProtocolError> {
    if data.len() < LENGTH_PREFIX_LEN {
        return Ok(None);
    }

    let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if length > max_message_size {
        return Err(ProtocolError::MessageTooLarge(length));
    }

    if length == 0 {
        return Ok(Some((Message::KeepAlive, LENGTH_PREFIX_LEN)));
    }

    if data.len() < LENGTH_PREFIX_LEN + 1 {
        return Ok(None);
    }

    let raw_id = data[LENGTH_PREFIX_LEN];
    let id = MessageId::try_from(raw_id)?;
    check_length(id, raw_id, length)?;

    let total = LENGTH_PREFIX_LEN + length;
    if data.len() < total {
        return Ok(None);
    }

    let mut body = &data[LENGTH_PREFIX_LEN + 1..total];
    let message = match id {
        MessageId::Choke => Message::Choke,
        MessageId::Unchoke => Message::Unchoke,
        MessageId::Interested => Message::Interested,
        MessageId::NotInterested => Message::NotInterested,
        MessageId::Have => Message::Have {
            piece: body.get_u32(),
        },
        MessageId::Bitfield => Message::Bitfield(Bytes::copy_from_slice(body)),
        MessageId::Request => Message::Request {
            index: body.get_u32(),
            begin: body.get_u32(),
            length: body.get_u32(),
        },
        MessageId::Piece => {
            let index = body.get_u32();
            let begin = body.get_u32();
            Message::Piece {
                index,
                begin,
                data: Bytes::copy_from_slice(body),
            }
        }
        MessageId::Cancel => Message::Cancel {
            index: body.get_u32(),
            begin: body.get_u32(),
            length: body.get_u32(),
        },
        MessageId::Handshake | MessageId::KeepAlive => {
            return Err(ProtocolError::UnknownMessageId(raw_id));
        }
    };

    Ok(Some((message, total)))
}

fn check_length(id: MessageId, raw_id: u8, length: usize) -> Result<(), ProtocolError> {
    let valid = match id {
        MessageId::Choke | MessageId::Unchoke | MessageId::Interested | MessageId::NotInterested => {
            length == 1
        }
        MessageId::Have => length == 5,
        MessageId::Request | MessageId::Cancel => length == 13,
        MessageId::Piece => length >= 9,
        MessageId::Bitfield => true,
        MessageId::Handshake | MessageId::KeepAlive => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ProtocolError::InvalidLength { id: raw_id, length })
    }
}

/// Decodes a handshake from the front of `data`, `Ok(None)` while short.
pub fn decode_handshake(data: &[u8]) -> Result<Option<(Handshake, usize)>, ProtocolError> {
    check_handshake_prefix(data)?;
    if data.len() < HANDSHAKE_LEN {
        return Ok(None);
    }
    Handshake::decode(&data[..HANDSHAKE_LEN]).map(|hs| Some((hs, HANDSHAKE_LEN)))
}

/// Stateful decoder for one connection's inbound stream.
///
/// A connection starts with the fixed-size handshake and switches to
/// length-prefixed frames once it has been decoded.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    awaiting_handshake: bool,
    max_message_size: usize,
}

impl MessageCodec {
    /// Creates a codec that expects the handshake first.
    pub fn new() -> Self {
        Self {
            awaiting_handshake: true,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Creates a codec for a stream whose handshake was already exchanged.
    pub fn framed() -> Self {
        Self {
            awaiting_handshake: false,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    pub fn is_awaiting_handshake(&self) -> bool {
        self.awaiting_handshake
    }

    pub fn encode(&self, message: &Message) -> Bytes {
        message.encode()
    }

    pub fn decode(&mut self, data: &[u8]) -> Result<Option<(Message, usize)>, ProtocolError> {
        if self.awaiting_handshake {
            return match decode_handshake(data)? {
                Some((handshake, consumed)) => {
                    self.awaiting_handshake = false;
                    Ok(Some((Message::Handshake(handshake), consumed)))
                }
                None => Ok(None),
            };
        }
        decode_with_limit(data, self.max_message_size)
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}
