use super::error::PeerError;
use crate::constants::CONNECT_TIMEOUT;
use bytes::Bytes;
use std::io::{self, IoSlice, Read, Write};
use std::net::SocketAddr;
use tokio::time::timeout;

/// A non-blocking byte stream to a peer.
///
/// This is the only surface entities use to move bytes. Both calls return
/// immediately: `Ok(0)` means the socket had nothing to give or no room to
/// take, never end of stream. A closed stream is reported as an
/// [`io::ErrorKind::UnexpectedEof`] error from `read`.
pub trait Transport: Send {
    /// Human readable description for diagnostics.
    fn description(&self) -> String;

    /// Reads available bytes into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Gathering write of `bufs[offset..offset + count]`.
    ///
    /// May write fewer bytes than offered; the caller tracks how far into
    /// the buffers it got.
    fn write(&mut self, bufs: &[Bytes], offset: usize, count: usize) -> io::Result<usize>;

    /// Hint that a `read` would return data (or an error).
    fn is_ready_for_read(&self) -> bool {
        true
    }

    /// Hint that a `write` would accept bytes.
    fn is_ready_for_write(&self) -> bool {
        true
    }
}

/// TCP implementation of [`Transport`] over a non-blocking socket.
pub struct TcpTransport {
    stream: std::net::TcpStream,
    peer_addr: SocketAddr,
}

impl TcpTransport {
    pub fn new(stream: std::net::TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;
        Ok(Self { stream, peer_addr })
    }

    /// Takes over a stream accepted or connected through tokio.
    pub fn from_tokio(stream: tokio::net::TcpStream) -> io::Result<Self> {
        Self::new(stream.into_std()?)
    }

    pub async fn connect(addr: SocketAddr) -> Result<Self, PeerError> {
        let stream = timeout(CONNECT_TIMEOUT, tokio::net::TcpStream::connect(addr))
            .await
            .map_err(|_| PeerError::Timeout)??;
        Ok(Self::from_tokio(stream)?)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

fn would_block(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl Transport for TcpTransport {
    fn description(&self) -> String {
        format!("tcp {}", self.peer_addr)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.stream.read(buf) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            )),
            Ok(n) => Ok(n),
            Err(e) if would_block(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, bufs: &[Bytes], offset: usize, count: usize) -> io::Result<usize> {
        let start = offset.min(bufs.len());
        let end = offset.saturating_add(count).min(bufs.len());
        let slices: Vec<IoSlice<'_>> = bufs[start..end]
            .iter()
            .map(|b| IoSlice::new(b))
            .collect();
        if slices.is_empty() {
            return Ok(0);
        }

        match self.stream.write_vectored(&slices) {
            Ok(n) => Ok(n),
            Err(e) if would_block(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn is_ready_for_read(&self) -> bool {
        let mut probe = [0u8; 1];
        match self.stream.peek(&mut probe) {
            // Zero means end of stream, which `read` must get to report.
            Ok(_) => true,
            Err(e) => !would_block(&e),
        }
    }
}
