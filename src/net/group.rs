use crate::peer::{PeerConnection, PeerError};
use crate::scheduler::{EventWaiter, Priority, RateControlledEntity};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// A connection shared between the session layer and the schedulers.
pub type SharedConnection = Arc<Mutex<PeerConnection>>;

/// Which half of the traffic an entity moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Writes queued outbound data.
    Upload,
    /// Reads and decodes inbound data.
    Download,
}

/// A connection dropped from a group after an I/O or protocol failure.
#[derive(Debug)]
pub struct FailedConnection {
    pub connection: SharedConnection,
    pub error: PeerError,
}

struct GroupInner {
    priority: Priority,
    connections: Vec<SharedConnection>,
    next: usize,
    failed: Vec<FailedConnection>,
    /// Every connection has closed; the next op reports it.
    drained: bool,
}

impl GroupInner {
    /// Moves connections closed elsewhere, e.g. by the opposite direction's
    /// group, into `failed`.
    fn prune_closed(&mut self, direction: Direction) {
        if self.connections.is_empty() {
            return;
        }
        let (closed, open): (Vec<_>, Vec<_>) = std::mem::take(&mut self.connections)
            .into_iter()
            .partition(|c| c.lock().is_closed());
        self.connections = open;
        if closed.is_empty() {
            return;
        }
        for connection in closed {
            debug!(
                ?direction,
                peer = %connection.lock().description(),
                "dropping closed connection from group"
            );
            self.failed.push(FailedConnection {
                connection,
                error: PeerError::ConnectionClosed,
            });
        }
        self.next = 0;
        self.drained = self.connections.is_empty();
    }
}

/// Schedulable owner of one or more peer connections for one direction.
///
/// Each processing op services a single ready connection, rotating through
/// them so a busy connection cannot monopolise the group's turns. A failing
/// connection, or one closed through the group for the other direction, is
/// dropped and parked in [`take_failed`](Self::take_failed). Only when none
/// are left does an error reach the scheduler, which then removes the group.
pub struct ConnectionGroup {
    direction: Direction,
    boost_handshakes: bool,
    inner: Mutex<GroupInner>,
}

impl ConnectionGroup {
    pub fn new(direction: Direction, priority: Priority, boost_handshakes: bool) -> Self {
        Self {
            direction,
            boost_handshakes,
            inner: Mutex::new(GroupInner {
                priority,
                connections: Vec::new(),
                next: 0,
                failed: Vec::new(),
                drained: false,
            }),
        }
    }

    pub fn with_connections(
        direction: Direction,
        priority: Priority,
        boost_handshakes: bool,
        connections: Vec<SharedConnection>,
    ) -> Self {
        let group = Self::new(direction, priority, boost_handshakes);
        group.inner.lock().connections = connections;
        group
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn add(&self, connection: SharedConnection) {
        let mut inner = self.inner.lock();
        inner.connections.push(connection);
        inner.drained = false;
    }

    /// Removes a connection. Returns false if it was not part of the group.
    pub fn remove(&self, connection: &SharedConnection) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.connections.len();
        inner.connections.retain(|c| !Arc::ptr_eq(c, connection));
        inner.next = 0;
        inner.connections.len() != before
    }

    pub fn connections(&self) -> Vec<SharedConnection> {
        self.inner.lock().connections.clone()
    }

    pub fn set_priority(&self, priority: Priority) {
        self.inner.lock().priority = priority;
    }

    /// Connections dropped since the last call. The owner is expected to
    /// drain this; [`NetworkManager::remove_peer`](super::NetworkManager::remove_peer)
    /// does so for its groups.
    pub fn take_failed(&self) -> Vec<FailedConnection> {
        std::mem::take(&mut self.inner.lock().failed)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().connections.is_empty()
    }

    fn is_ready(&self, connection: &PeerConnection) -> bool {
        match self.direction {
            Direction::Upload => connection.is_ready_for_write(),
            Direction::Download => connection.is_ready_for_read(),
        }
    }
}

impl RateControlledEntity for ConnectionGroup {
    fn can_process(&self, _waiter: &EventWaiter) -> bool {
        let mut inner = self.inner.lock();
        inner.prune_closed(self.direction);
        inner.drained || inner.connections.iter().any(|c| self.is_ready(&c.lock()))
    }

    fn do_processing(&self, _waiter: &EventWaiter, max_bytes: usize) -> Result<usize, PeerError> {
        let mut inner = self.inner.lock();
        inner.prune_closed(self.direction);
        if inner.drained {
            return Err(PeerError::ConnectionClosed);
        }
        let count = inner.connections.len();

        for step in 0..count {
            let index = (inner.next + step) % count;
            let connection = Arc::clone(&inner.connections[index]);

            let result = {
                let mut conn = connection.lock();
                if !self.is_ready(&conn) {
                    continue;
                }
                match self.direction {
                    Direction::Upload => conn.flush(max_bytes),
                    Direction::Download => conn.fill(max_bytes),
                }
            };

            match result {
                Ok(bytes) => {
                    inner.next = (index + 1) % count;
                    return Ok(bytes);
                }
                Err(error) => {
                    inner.connections.remove(index);
                    if inner.connections.is_empty() {
                        inner.next = 0;
                        return Err(error);
                    }
                    debug!(
                        direction = ?self.direction,
                        peer = %connection.lock().description(),
                        %error,
                        "dropping failed connection from group"
                    );
                    inner.next = index % inner.connections.len();
                    inner.failed.push(FailedConnection { connection, error });
                    return Ok(0);
                }
            }
        }

        Ok(0)
    }

    fn priority(&self) -> Priority {
        self.inner.lock().priority
    }

    fn priority_boost(&self) -> bool {
        self.boost_handshakes
            && self
                .inner
                .lock()
                .connections
                .iter()
                .any(|c| c.lock().is_handshaking())
    }

    fn bytes_ready_to_write(&self) -> u64 {
        self.inner
            .lock()
            .connections
            .iter()
            .map(|c| c.lock().bytes_ready_to_write() as u64)
            .sum()
    }

    fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    fn ready_connection_count(&self, _waiter: &EventWaiter) -> usize {
        let inner = self.inner.lock();
        inner
            .connections
            .iter()
            .filter(|c| self.is_ready(&c.lock()))
            .count()
    }

    fn description(&self) -> String {
        let inner = self.inner.lock();
        let peers: Vec<String> = inner
            .connections
            .iter()
            .map(|c| c.lock().description())
            .collect();
        format!("{:?} group [{}]", self.direction, peers.join(", "))
    }
}
