//! Portable futex emulation using `std::sync::Condvar`
//!
//! Used on platforms without a futex syscall. Words hash into a fixed table
//! of mutex/condvar buckets. A waiter re-checks the word under the bucket
//! lock before sleeping, and a waker takes the same lock before notifying,
//! so a store followed by `wake` can never slip between the check and the
//! sleep. Buckets are shared, so `wake` notifies everyone in the bucket and
//! unrelated waiters see a spurious wakeup.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

const BUCKETS: usize = 64;

struct Bucket {
    lock: Mutex<()>,
    cond: Condvar,
}

impl Bucket {
    const fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }
}

static TABLE: [Bucket; BUCKETS] = [const { Bucket::new() }; BUCKETS];

fn bucket(word: &AtomicU32) -> &'static Bucket {
    let addr = word as *const AtomicU32 as usize;
    &TABLE[(addr >> 2) % BUCKETS]
}

pub(super) fn wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> bool {
    let b = bucket(word);
    let guard = b.lock.lock().unwrap_or_else(PoisonError::into_inner);
    if word.load(Ordering::SeqCst) != expected {
        return true;
    }
    match timeout {
        None => {
            drop(b.cond.wait(guard).unwrap_or_else(PoisonError::into_inner));
            true
        }
        Some(t) => {
            let (_guard, result) = b
                .cond
                .wait_timeout(guard, t)
                .unwrap_or_else(PoisonError::into_inner);
            !result.timed_out()
        }
    }
}

pub(super) fn wake(word: &AtomicU32, _n: u32) {
    let b = bucket(word);
    let _guard = b.lock.lock().unwrap_or_else(PoisonError::into_inner);
    b.cond.notify_all();
}
