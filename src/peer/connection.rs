use super::codec::MessageCodec;
use super::error::PeerError;
use super::message::{Handshake, Message};
use super::transport::Transport;
use crate::constants::{MAX_READ_CHUNK, READ_BUFFER_SIZE};
use crate::scheduler::EventWaiter;
use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// The protocol state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Waiting for the peer's handshake.
    Handshaking,
    /// Handshake received, exchanging framed messages.
    Connected,
    /// Closed locally or after an error.
    Closed,
}

/// Buffered, non-blocking state for a single peer connection.
///
/// Outbound messages are encoded when queued and written in bounded chunks
/// by [`flush`](Self::flush); inbound bytes are pulled in by
/// [`fill`](Self::fill) and decoded into a message queue. Neither call
/// blocks, which is what lets a scheduler drive many connections from one
/// thread.
///
/// # Examples
///
/// ```no_run
/// use peerwire::peer::{Handshake, Message, PeerConnection, PeerId, TcpTransport};
/// use peerwire::scheduler::EventWaiter;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = TcpTransport::connect("192.168.1.100:6881".parse()?).await?;
/// let waiter = Arc::new(EventWaiter::new());
/// let mut conn = PeerConnection::new(Box::new(transport), waiter);
///
/// let handshake = Handshake::new([0u8; 20], *PeerId::generate().as_bytes());
/// conn.send(Message::Handshake(handshake))?;
/// conn.send(Message::Interested)?;
/// # Ok(())
/// # }
/// ```
pub struct PeerConnection {
    transport: Box<dyn Transport>,
    codec: MessageCodec,
    state: PeerState,
    read_buf: BytesMut,
    outbound: VecDeque<Bytes>,
    queued_bytes: usize,
    inbound: VecDeque<Message>,
    remote_handshake: Option<Handshake>,
    waiter: Arc<EventWaiter>,
    connected_at: Instant,
    last_message_at: Instant,
    bytes_read: u64,
    bytes_written: u64,
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("peer", &self.transport.description())
            .field("state", &self.state)
            .field("queued_bytes", &self.queued_bytes)
            .field("inbound", &self.inbound.len())
            .finish()
    }
}

impl PeerConnection {
    /// Wraps a fresh transport; the first inbound bytes must be a handshake.
    pub fn new(transport: Box<dyn Transport>, waiter: Arc<EventWaiter>) -> Self {
        Self::with_codec(transport, waiter, MessageCodec::new(), PeerState::Handshaking)
    }

    /// Wraps a transport whose handshake was exchanged elsewhere.
    pub fn established(transport: Box<dyn Transport>, waiter: Arc<EventWaiter>) -> Self {
        Self::with_codec(transport, waiter, MessageCodec::framed(), PeerState::Connected)
    }

    fn with_codec(
        transport: Box<dyn Transport>,
        waiter: Arc<EventWaiter>,
        codec: MessageCodec,
        state: PeerState,
    ) -> Self {
        let now = Instant::now();
        Self {
            transport,
            codec,
            state,
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            outbound: VecDeque::new(),
            queued_bytes: 0,
            inbound: VecDeque::new(),
            remote_handshake: None,
            waiter,
            connected_at: now,
            last_message_at: now,
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    pub fn description(&self) -> String {
        self.transport.description()
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn is_handshaking(&self) -> bool {
        self.state == PeerState::Handshaking
    }

    pub fn is_closed(&self) -> bool {
        self.state == PeerState::Closed
    }

    pub fn remote_handshake(&self) -> Option<&Handshake> {
        self.remote_handshake.as_ref()
    }

    /// Queues a message for sending and wakes the scheduler.
    pub fn send(&mut self, message: Message) -> Result<(), PeerError> {
        if self.is_closed() {
            return Err(PeerError::ConnectionClosed);
        }

        let data = message.encode();
        trace!(message = message.description(), len = data.len(), "queued");
        self.queued_bytes += data.len();
        self.outbound.push_back(data);
        self.waiter.signal();
        Ok(())
    }

    /// Next decoded inbound message, if any.
    pub fn receive(&mut self) -> Option<Message> {
        self.inbound.pop_front()
    }

    pub fn has_pending_write(&self) -> bool {
        self.queued_bytes > 0
    }

    pub fn bytes_ready_to_write(&self) -> usize {
        self.queued_bytes
    }

    pub fn is_ready_for_write(&self) -> bool {
        !self.is_closed() && self.has_pending_write() && self.transport.is_ready_for_write()
    }

    pub fn is_ready_for_read(&self) -> bool {
        !self.is_closed() && self.transport.is_ready_for_read()
    }

    /// Writes at most `max_bytes` of queued data. Returns the bytes written.
    pub fn flush(&mut self, max_bytes: usize) -> Result<usize, PeerError> {
        if self.is_closed() {
            return Err(PeerError::ConnectionClosed);
        }
        if max_bytes == 0 || self.outbound.is_empty() {
            return Ok(0);
        }

        let mut view = Vec::with_capacity(self.outbound.len());
        let mut remaining = max_bytes;
        for buf in &self.outbound {
            if remaining == 0 {
                break;
            }
            let take = buf.len().min(remaining);
            view.push(buf.slice(..take));
            remaining -= take;
        }

        let written = match self.transport.write(&view, 0, view.len()) {
            Ok(n) => n,
            Err(e) => {
                self.close();
                return Err(e.into());
            }
        };

        self.consume_outbound(written);
        self.bytes_written += written as u64;
        Ok(written)
    }

    fn consume_outbound(&mut self, written: usize) {
        let mut left = written;
        while left > 0 {
            let Some(front) = self.outbound.front_mut() else {
                break;
            };
            if left >= front.len() {
                left -= front.len();
                self.outbound.pop_front();
            } else {
                front.advance(left);
                left = 0;
            }
        }
        self.queued_bytes -= written - left;
    }

    /// Reads at most `max_bytes` and decodes every complete message.
    ///
    /// A protocol violation closes the connection.
    pub fn fill(&mut self, max_bytes: usize) -> Result<usize, PeerError> {
        if self.is_closed() {
            return Err(PeerError::ConnectionClosed);
        }
        let chunk = max_bytes.min(MAX_READ_CHUNK);
        if chunk == 0 {
            return Ok(0);
        }

        let start = self.read_buf.len();
        self.read_buf.resize(start + chunk, 0);
        let read = match self.transport.read(&mut self.read_buf[start..]) {
            Ok(n) => n,
            Err(e) => {
                self.read_buf.truncate(start);
                self.close();
                return Err(e.into());
            }
        };
        self.read_buf.truncate(start + read);

        if read > 0 {
            self.bytes_read += read as u64;
            self.decode_buffered()?;
        }
        Ok(read)
    }

    fn decode_buffered(&mut self) -> Result<(), PeerError> {
        loop {
            match self.codec.decode(&self.read_buf) {
                Ok(Some((message, consumed))) => {
                    self.read_buf.advance(consumed);
                    self.last_message_at = Instant::now();
                    if let Message::Handshake(handshake) = &message {
                        self.remote_handshake = Some(handshake.clone());
                        self.state = PeerState::Connected;
                    }
                    self.inbound.push_back(message);
                }
                Ok(None) => return Ok(()),
                Err(e) => {
                    debug!(peer = %self.description(), error = %e, "protocol violation");
                    self.close();
                    return Err(e.into());
                }
            }
        }
    }

    /// Drops queued output and marks the connection closed.
    pub fn close(&mut self) {
        self.state = PeerState::Closed;
        self.outbound.clear();
        self.queued_bytes = 0;
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    pub fn last_message_at(&self) -> Instant {
        self.last_message_at
    }
}
