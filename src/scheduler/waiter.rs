use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Level-triggered wake-up token for a scheduling thread.
///
/// Connections and the I/O layer call [`signal`](Self::signal) when they have
/// new work; the scheduler calls [`wait`](Self::wait) when a round found
/// nothing to do. Any number of signals before a wait collapse into a single
/// wake.
#[derive(Debug, Default)]
pub struct EventWaiter {
    signalled: Mutex<bool>,
    cond: Condvar,
}

impl EventWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        let mut signalled = self.signalled.lock();
        *signalled = true;
        self.cond.notify_one();
    }

    /// Blocks until signalled or until `timeout` elapses.
    ///
    /// Returns true if a signal was consumed. The flag is cleared either way.
    /// A timeout too large to express as a deadline waits for a signal only.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut signalled = self.signalled.lock();
        while !*signalled {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut signalled, deadline).timed_out() {
                        break;
                    }
                }
                None => self.cond.wait(&mut signalled),
            }
        }
        std::mem::replace(&mut *signalled, false)
    }

    pub fn is_signalled(&self) -> bool {
        *self.signalled.lock()
    }
}
