//! Circular index pair
//!
//! `front` and `back` are free-running `u32` counters. A slot is addressed by
//! `counter & (capacity - 1)`, and occupancy is `back.wrapping_sub(front)`.
//! Because the capacity is a power of two, 2^32 is a multiple of it and the
//! slot mapping stays continuous when a counter wraps past `u32::MAX`.
//!
//! Each counter doubles as a futex word: the side waiting for the other to
//! move sleeps on it, and the moving side wakes it when asked to.

use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_utils::CachePadded;

use crate::futex::Futex;

/// A monotonically increasing counter that can be waited on
#[derive(Debug, Default)]
pub struct CircularIndex {
    value: Futex,
    /// Threads inside `wait_until_not_equal`; lets `increment` skip the wake
    /// syscall when nobody sleeps
    waiters: AtomicU32,
}

impl CircularIndex {
    pub const fn new(start: u32) -> Self {
        Self {
            value: Futex::new(start),
            waiters: AtomicU32::new(0),
        }
    }

    /// Acquire read of the counter
    #[inline]
    pub fn get(&self) -> u32 {
        self.value.load()
    }

    /// Block while the counter equals `v`; returns the first value seen that
    /// differs
    pub fn wait_until_not_equal(&self, v: u32) -> u32 {
        let current = self.value.load();
        if current != v {
            return current;
        }

        self.waiters.fetch_add(1, Ordering::SeqCst);
        let current = loop {
            let current = self.value.as_atomic().load(Ordering::SeqCst);
            if current != v {
                break current;
            }
            self.value.wait(v, None);
        };
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        current
    }

    /// Publish +1 (release) and, if `should_wake`, wake one sleeper if any;
    /// returns the new value
    #[inline]
    pub fn increment(&self, should_wake: bool) -> u32 {
        let next = self.value.increment();
        if should_wake && self.waiters.load(Ordering::SeqCst) != 0 {
            self.value.wake_one();
        }
        next
    }

    /// Overwrite the counter; only for an owner that knows no other thread
    /// can observe it
    #[inline]
    pub(crate) fn reset(&self, value: u32) {
        self.value.store(value);
    }

    #[inline]
    pub fn has_waiters(&self) -> bool {
        self.waiters.load(Ordering::Relaxed) != 0
    }
}

/// `front` (consumer-owned) and `back` (producer-owned) on separate cache lines
#[derive(Debug, Default)]
pub struct IndexPair {
    pub front: CachePadded<CircularIndex>,
    pub back: CachePadded<CircularIndex>,
}

impl IndexPair {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Start both counters at `start`; tests use this to cross the wrap point
    pub(crate) fn starting_at(start: u32) -> Self {
        Self {
            front: CachePadded::new(CircularIndex::new(start)),
            back: CachePadded::new(CircularIndex::new(start)),
        }
    }

    /// Number of published, not yet consumed entries
    #[inline]
    pub fn occupancy(&self) -> u32 {
        self.back.get().wrapping_sub(self.front.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_wait_fast_path() {
        let idx = CircularIndex::new(3);
        assert_eq!(idx.wait_until_not_equal(2), 3);
        assert!(!idx.has_waiters());
    }

    #[test]
    fn test_increment_wakes_waiter() {
        let idx = Arc::new(CircularIndex::new(0));
        let idx2 = idx.clone();
        let waiter = thread::spawn(move || idx2.wait_until_not_equal(0));

        thread::sleep(Duration::from_millis(30));
        assert_eq!(idx.increment(true), 1);
        assert_eq!(waiter.join().unwrap(), 1);
        assert!(!idx.has_waiters());
    }

    #[test]
    fn test_occupancy_across_wrap() {
        let pair = IndexPair::starting_at(u32::MAX - 1);
        for _ in 0..4 {
            pair.back.increment(false);
        }
        assert_eq!(pair.back.get(), 2);
        assert_eq!(pair.occupancy(), 4);

        pair.front.increment(false);
        pair.front.increment(false);
        assert_eq!(pair.front.get(), 0);
        assert_eq!(pair.occupancy(), 2);
    }

    #[test]
    fn test_ping_pong() {
        // Two threads alternately advance their own counter, each waiting for
        // the other: every handoff needs a wake to make progress.
        let pair = Arc::new(IndexPair::new());
        let p2 = pair.clone();
        const ROUNDS: u32 = 5_000;

        let other = thread::spawn(move || {
            for i in 0..ROUNDS {
                p2.back.wait_until_not_equal(i);
                p2.front.increment(true);
            }
        });

        for i in 0..ROUNDS {
            pair.back.increment(true);
            pair.front.wait_until_not_equal(i);
        }
        other.join().unwrap();
        assert_eq!(pair.occupancy(), 0);
        assert_eq!(pair.front.get(), ROUNDS);
    }
}
