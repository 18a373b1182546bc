//! Futex word: a 32-bit atomic that threads can sleep on
//!
//! `wait(expected)` sleeps only if the word still equals `expected` at the
//! instant the kernel (or the fallback's bucket lock) checks it, which closes
//! the check-then-sleep race. `wake(n)` wakes up to `n` sleepers. Only
//! process-private waits are used.
//!
//! Ordering helpers: plain reads are `Acquire`, plain writes are `Release`.
//! A payload written before a `Release` store is visible to a thread whose
//! `Acquire` load observes that store; the queue relies on nothing else.
//! `increment` is `SeqCst` because it also takes part in a store/load
//! handshake with a separate waiter counter.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        mod linux;
        use linux as platform;
    } else {
        mod fallback;
        use fallback as platform;
    }
}

/// A 32-bit futex word
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct Futex {
    word: AtomicU32,
}

impl Futex {
    pub const fn new(value: u32) -> Self {
        Self {
            word: AtomicU32::new(value),
        }
    }

    /// Acquire read
    #[inline]
    pub fn load(&self) -> u32 {
        self.word.load(Ordering::Acquire)
    }

    /// Release write
    #[inline]
    pub fn store(&self, value: u32) {
        self.word.store(value, Ordering::Release)
    }

    /// Wrapping +1, returning the new value
    #[inline]
    pub fn increment(&self) -> u32 {
        self.word.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    /// Direct access for the handshakes that need `SeqCst`
    #[inline]
    pub fn as_atomic(&self) -> &AtomicU32 {
        &self.word
    }

    /// Sleep while the word equals `expected`
    ///
    /// Returns `false` only when `timeout` elapsed. A `true` return may still
    /// be spurious; callers re-check the word in a loop.
    #[inline]
    pub fn wait(&self, expected: u32, timeout: Option<Duration>) -> bool {
        platform::wait(&self.word, expected, timeout)
    }

    /// Wake up to `n` threads sleeping on this word
    #[inline]
    pub fn wake(&self, n: u32) {
        platform::wake(&self.word, n)
    }

    #[inline]
    pub fn wake_one(&self) {
        self.wake(1)
    }
}
