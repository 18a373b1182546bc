//! One-shot event
//!
//! Single-use signal between exactly one waiter and one triggerer. The state
//! goes not-happened → happened once and stays there.
//!
//! `has_happened` and `is_waiting` are separate words, so the two sides form a
//! store/load handshake: the waiter publishes `is_waiting` and then reads
//! `has_happened`, while the triggerer publishes `has_happened` and then reads
//! `is_waiting`. Both pairs are `SeqCst`, so at least one side sees the other's
//! store and a sleeping waiter is never missed. When nobody is waiting the
//! trigger costs no syscall.

use std::sync::atomic::Ordering;

use crate::futex::Futex;

const NOT_HAPPENED: u32 = 0;
const HAPPENED: u32 = 1;

#[derive(Debug, Default)]
pub struct OneShotEvent {
    has_happened: Futex,
    is_waiting: Futex,
}

impl OneShotEvent {
    pub const fn new() -> Self {
        Self {
            has_happened: Futex::new(NOT_HAPPENED),
            is_waiting: Futex::new(0),
        }
    }

    #[inline]
    pub fn has_happened(&self) -> bool {
        self.has_happened.load() == HAPPENED
    }

    /// Block until `trigger` has been called
    ///
    /// Everything written before `trigger` is visible once this returns.
    pub fn wait(&self) {
        if self.has_happened() {
            return;
        }

        self.is_waiting.as_atomic().store(1, Ordering::SeqCst);
        while self.has_happened.as_atomic().load(Ordering::SeqCst) != HAPPENED {
            self.has_happened.wait(NOT_HAPPENED, None);
        }
    }

    /// Signal the event; must be called at most once
    pub fn trigger(&self) {
        let previous = self.has_happened.as_atomic().swap(HAPPENED, Ordering::SeqCst);
        debug_assert_eq!(previous, NOT_HAPPENED, "one-shot event triggered twice");

        if self.is_waiting.as_atomic().load(Ordering::SeqCst) != 0 {
            self.has_happened.wake_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_trigger_before_wait() {
        let ev = OneShotEvent::new();
        assert!(!ev.has_happened());
        ev.trigger();
        assert!(ev.has_happened());
        ev.wait();
        ev.wait();
    }

    #[test]
    fn test_wait_blocks_until_trigger() {
        let ev = Arc::new(OneShotEvent::new());
        let data = Arc::new(AtomicU64::new(0));

        let (ev2, data2) = (ev.clone(), data.clone());
        let trigger = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            data2.store(99, Ordering::Relaxed);
            ev2.trigger();
        });

        ev.wait();
        // The relaxed store is published by trigger's SeqCst swap
        assert_eq!(data.load(Ordering::Relaxed), 99);
        trigger.join().unwrap();
    }

    #[test]
    fn test_many_fresh_events_no_lost_wakeups() {
        for _ in 0..2_000 {
            let ev = Arc::new(OneShotEvent::new());
            let ev2 = ev.clone();
            let t = thread::spawn(move || ev2.trigger());
            ev.wait();
            t.join().unwrap();
            assert!(ev.has_happened());
        }
    }
}
