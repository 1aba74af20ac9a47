//! Manual-reset event built on `Mutex` + `Condvar`.
//!
//! Once set, the event stays signaled until explicitly reset, waking
//! every waiter in between. Used only for the long-wait tier of the
//! adaptive backoff; the hot path never touches it.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A manual-reset synchronization event.
#[derive(Debug)]
pub(crate) struct Event {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    /// Create an event in the given initial state.
    pub fn new(signaled: bool) -> Self {
        Self {
            signaled: Mutex::new(signaled),
            cond: Condvar::new(),
        }
    }

    /// Signal the event and wake all current waiters. The event stays
    /// signaled until [`reset`](Self::reset).
    pub fn set(&self) {
        let mut signaled = self.signaled.lock().unwrap();
        *signaled = true;
        self.cond.notify_all();
    }

    /// Clear the signal.
    pub fn reset(&self) {
        *self.signaled.lock().unwrap() = false;
    }

    /// Whether the event is currently signaled.
    pub fn is_set(&self) -> bool {
        *self.signaled.lock().unwrap()
    }

    /// Block until the event is signaled or `timeout` elapses.
    /// Returns `true` if the event was signaled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.signaled.lock().unwrap();
        let (guard, _result) = self
            .cond
            .wait_timeout_while(guard, timeout, |signaled| !*signaled)
            .unwrap();
        *guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_in_requested_state() {
        assert!(Event::new(true).is_set());
        assert!(!Event::new(false).is_set());
    }

    #[test]
    fn set_wakes_waiter_and_stays_signaled() {
        let event = Arc::new(Event::new(false));
        let waiter = {
            let event = Arc::clone(&event);
            thread::spawn(move || event.wait_timeout(Duration::from_secs(5)))
        };
        event.set();
        assert!(waiter.join().unwrap());
        // Manual reset: a second wait still succeeds immediately.
        assert!(event.wait_timeout(Duration::ZERO));
    }

    #[test]
    fn timeout_expires_when_unsignaled() {
        let event = Event::new(false);
        assert!(!event.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn reset_clears_the_signal() {
        let event = Event::new(true);
        event.reset();
        assert!(!event.is_set());
        assert!(!event.wait_timeout(Duration::from_millis(1)));
    }
}
