// Binary wakeup events for producer/consumer flow control

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A binary latch built on a mutex and condition variable.
///
/// `signal` sets the latch; `wait` blocks until it is set and consumes it.
/// Signals are idempotent: signalling an already-set latch is a no-op, so a
/// burst of signals wakes at most one waiter per consumed latch.
pub(crate) struct Event {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub(crate) fn new() -> Self {
        Self {
            signaled: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Set the latch and wake waiters.
    pub(crate) fn signal(&self) {
        let mut signaled = self.signaled.lock().unwrap();
        *signaled = true;
        // Several producers may be parked on the same event; wake them all
        // and let the first one through consume the latch.
        self.cond.notify_all();
    }

    /// Block until the latch is set, then consume it. `None` waits
    /// indefinitely. Returns whether the latch was observed set.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut signaled = self.signaled.lock().unwrap();
        match timeout {
            None => {
                while !*signaled {
                    signaled = self.cond.wait(signaled).unwrap();
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !*signaled {
                    let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                        return false;
                    };
                    let (guard, _) = self.cond.wait_timeout(signaled, remaining).unwrap();
                    signaled = guard;
                }
            }
        }
        *signaled = false;
        true
    }
}
