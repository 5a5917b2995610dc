use super::waiter::EventWaiter;
use crate::peer::PeerError;
use std::fmt;

/// Scheduling tier of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    /// Fair round-robin scheduling of processing ops.
    #[default]
    Normal,
    /// Serviced before any normal entity, each up to its need.
    High,
}

/// Identifier handed out by the scheduler on registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub(crate) u64);

impl EntityId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// A unit of bandwidth scheduling that owns one or more connections.
///
/// All methods must return promptly. "Nothing to do" is expressed with
/// `false` / `Ok(0)`; `Err` is reserved for failures that should remove the
/// entity from scheduling.
pub trait RateControlledEntity: Send + Sync {
    /// True if at least one byte could be moved right now without blocking.
    fn can_process(&self, waiter: &EventWaiter) -> bool;

    /// Performs one bounded unit of I/O moving at most `max_bytes`.
    ///
    /// Returns the number of bytes moved; zero means the attempt made no
    /// progress.
    fn do_processing(&self, waiter: &EventWaiter, max_bytes: usize) -> Result<usize, PeerError>;

    fn priority(&self) -> Priority;

    /// Temporary elevation to high priority, e.g. while handshaking.
    fn priority_boost(&self) -> bool {
        false
    }

    fn bytes_ready_to_write(&self) -> u64;

    fn connection_count(&self) -> usize;

    /// How many of the owned connections are ready this round. Normal
    /// entities get this many ops per turn.
    fn ready_connection_count(&self, waiter: &EventWaiter) -> usize;

    fn description(&self) -> String;
}
