#![forbid(unsafe_code)]

//! Cooperative interruption of async condition workers.
//!
//! A worker thread cannot be stopped from outside, so every dispatch hands
//! its body an [`InterruptSignal`]. Slow bodies should park on
//! [`InterruptSignal::wait_timeout`] rather than `thread::sleep`; a cancel or
//! a newer dispatch then releases the thread at once.
//!
//! A body that ignores the signal still runs to the end. Whatever it reports
//! afterwards is dropped by the criteria.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::lock_unpoisoned;

struct Flag {
    raised: Mutex<bool>,
    wake: Condvar,
}

/// Worker side of an interrupt: read-only and cheap to clone.
#[derive(Clone)]
pub struct InterruptSignal {
    flag: Arc<Flag>,
}

impl InterruptSignal {
    /// A fresh, unraised signal and the trigger that raises it.
    pub(crate) fn new() -> (Self, InterruptTrigger) {
        let flag = Arc::new(Flag {
            raised: Mutex::new(false),
            wake: Condvar::new(),
        });
        (
            Self {
                flag: Arc::clone(&flag),
            },
            InterruptTrigger { flag },
        )
    }

    /// Returns `true` once the dispatch was cancelled or superseded.
    pub fn is_interrupted(&self) -> bool {
        *lock_unpoisoned(&self.flag.raised)
    }

    /// Park the calling thread for up to `duration`.
    ///
    /// Returns `true` as soon as the signal is raised (immediately if it
    /// already was), `false` if `duration` passed without an interrupt.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let raised = lock_unpoisoned(&self.flag.raised);
        let (raised, _) = self
            .flag
            .wake
            .wait_timeout_while(raised, duration, |raised| !*raised)
            .unwrap_or_else(PoisonError::into_inner);
        *raised
    }
}

impl std::fmt::Debug for InterruptSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptSignal")
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

/// Slot side of an interrupt.
pub(crate) struct InterruptTrigger {
    flag: Arc<Flag>,
}

impl InterruptTrigger {
    /// Raise the signal and wake any waiting worker. Raising twice is a no-op.
    pub(crate) fn interrupt(&self) {
        *lock_unpoisoned(&self.flag.raised) = true;
        self.flag.wake.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn signal_starts_clear() {
        let (signal, _trigger) = InterruptSignal::new();
        assert!(!signal.is_interrupted());
    }

    #[test]
    fn trigger_sets_signal() {
        let (signal, trigger) = InterruptSignal::new();
        trigger.interrupt();
        assert!(signal.is_interrupted());
        trigger.interrupt();
        assert!(signal.is_interrupted());
    }

    #[test]
    fn wait_returns_true_when_already_interrupted() {
        let (signal, trigger) = InterruptSignal::new();
        trigger.interrupt();
        let start = Instant::now();
        assert!(signal.wait_timeout(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn wait_times_out_without_trigger() {
        let (signal, _trigger) = InterruptSignal::new();
        let start = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn interrupt_wakes_waiting_thread() {
        let (signal, trigger) = InterruptSignal::new();
        let start = Instant::now();
        let waiter = thread::spawn(move || signal.wait_timeout(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(10));
        trigger.interrupt();
        assert!(waiter.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
