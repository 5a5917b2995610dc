use crate::peer::Transport;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

/// Scripted socket state, shared with the test that owns the transport.
#[derive(Debug, Default)]
pub struct MockState {
    pub incoming: VecDeque<u8>,
    pub written: Vec<u8>,
    /// Most bytes a single write accepts. `None` = unlimited.
    pub write_capacity: Option<usize>,
    pub read_error: Option<io::ErrorKind>,
    pub write_error: Option<io::ErrorKind>,
    pub eof: bool,
}

impl MockState {
    pub fn push_incoming(&mut self, data: &[u8]) {
        self.incoming.extend(data.iter().copied());
    }
}

pub struct MockTransport {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new(name: &str) -> (Self, Arc<Mutex<MockState>>) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                name: name.to_string(),
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl Transport for MockTransport {
    fn description(&self) -> String {
        format!("mock {}", self.name)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if let Some(kind) = state.read_error {
            return Err(io::Error::new(kind, "scripted read failure"));
        }
        let n = buf.len().min(state.incoming.len());
        if n == 0 && state.eof {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            ));
        }
        for slot in buf.iter_mut().take(n) {
            *slot = state.incoming.pop_front().unwrap_or_default();
        }
        Ok(n)
    }

    fn write(&mut self, bufs: &[Bytes], offset: usize, count: usize) -> io::Result<usize> {
        let mut state = self.state.lock();
        if let Some(kind) = state.write_error {
            return Err(io::Error::new(kind, "scripted write failure"));
        }
        let mut budget = state.write_capacity.unwrap_or(usize::MAX);
        let mut written = 0;
        for buf in bufs.iter().skip(offset).take(count) {
            let take = buf.len().min(budget);
            state.written.extend_from_slice(&buf[..take]);
            written += take;
            budget -= take;
            if budget == 0 {
                break;
            }
        }
        Ok(written)
    }

    fn is_ready_for_read(&self) -> bool {
        let state = self.state.lock();
        !state.incoming.is_empty() || state.eof || state.read_error.is_some()
    }
}
