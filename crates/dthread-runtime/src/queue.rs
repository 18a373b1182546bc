//! Bounded single-producer / single-consumer queue
//!
//! A fixed ring of `capacity` slots (a power of two) over an [`IndexPair`].
//! The ring is split by ownership rather than guarded by a lock:
//!
//! ```text
//!   released ≤ front ≤ back ≤ released + capacity      (wrapping u32)
//!
//!   [released, front)  popped, value still alive; producer drops it in cleanup()
//!   [front, back)      published; consumer may read/mutate via front()
//!   [back, released)   free; producer writes here in push()
//! ```
//!
//! The producer writes a slot, then `Release`-increments `back`; the consumer
//! `Acquire`-reads `back` before touching the slot. The same pairing on
//! `front` hands vacated slots back to the producer.
//!
//! Values are not moved out by `pop()`. They stay in the slot until the
//! producer's next `push()`/`cleanup()` drops them, so a producer-owned
//! resource (such as slab memory) is released on the producer thread.
//!
//! Wake batching: a push only wakes a sleeping consumer once occupancy reaches
//! `min(wake_threshold, capacity / 2)`; a pop only wakes a blocked producer once
//! occupancy falls to `(capacity + 1) / 2`. Either side still wakes the other
//! before it could block on a full or empty ring.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dthread_core::constants::MAX_QUEUE_CAPACITY;

use crate::index::IndexPair;

/// Capacity actually used for a requested minimum: the next power of two
///
/// # Panics
///
/// If `min_capacity` is zero or above `MAX_QUEUE_CAPACITY`.
pub fn capacity_for(min_capacity: usize) -> usize {
    assert!(min_capacity > 0, "queue capacity must be non-zero");
    assert!(
        min_capacity <= MAX_QUEUE_CAPACITY,
        "queue capacity {} exceeds {}",
        min_capacity,
        MAX_QUEUE_CAPACITY
    );
    min_capacity.next_power_of_two()
}

struct Shared<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: u32,
    capacity: u32,
    indices: IndexPair,
    /// Producer's cleanup cursor, mirrored for Drop
    released: AtomicU32,
}

// Safety: slot access is partitioned by the index protocol described above;
// values cross threads, hence T: Send.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    #[inline]
    fn slot(&self, index: u32) -> *mut MaybeUninit<T> {
        self.slots[(index & self.mask) as usize].get()
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let front = self.indices.front.get();
        let back = self.indices.back.get();

        let mut i = *self.released.get_mut();
        while i != back {
            // Safety: [released, back) is initialized and both handles are gone
            unsafe { (*self.slot(i)).assume_init_drop() };
            i = i.wrapping_add(1);
        }

        if front != back && !std::thread::panicking() {
            panic!(
                "spsc queue dropped with {} unconsumed items",
                back.wrapping_sub(front)
            );
        }
    }
}

/// Producer half: `push` and `cleanup`
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
    back: u32,
    released: u32,
}

/// Consumer half: `front` and `pop`
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    front: u32,
}

/// Create a queue holding at least `min_capacity` items
///
/// The capacity is rounded up to the next power of two; see [`capacity_for`].
pub fn channel<T: Send>(min_capacity: usize) -> (Producer<T>, Consumer<T>) {
    channel_starting_at(min_capacity, 0)
}

/// Like [`channel`] with both counters starting at `start` (to exercise
/// counter wraparound)
pub(crate) fn channel_starting_at<T: Send>(min_capacity: usize, start: u32) -> (Producer<T>, Consumer<T>) {
    let capacity = capacity_for(min_capacity);
    let slots = (0..capacity)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let shared = Arc::new(Shared {
        slots,
        mask: (capacity - 1) as u32,
        capacity: capacity as u32,
        indices: IndexPair::starting_at(start),
        released: AtomicU32::new(start),
    });

    (
        Producer {
            shared: Arc::clone(&shared),
            back: start,
            released: start,
        },
        Consumer { shared, front: start },
    )
}

impl<T> Producer<T> {
    /// Append `value`, blocking while the queue is full
    ///
    /// Runs `cleanup()` first. The consumer is woken only if occupancy after
    /// the push is at least `min(wake_threshold, capacity / 2)`, so `0` always
    /// wakes and larger values batch wakeups.
    pub fn push(&mut self, value: T, wake_threshold: usize) {
        let back = self.back;
        let capacity = self.shared.capacity;

        // The slot at `back` is free only once everything a full lap behind
        // it has been popped *and* released
        self.cleanup();
        while back.wrapping_sub(self.released) == capacity {
            self.shared.indices.front.wait_until_not_equal(self.released);
            self.cleanup();
        }

        let shared = &*self.shared;
        // Safety: slot `back` is in the free region; only we write there
        unsafe { (*shared.slot(back)).write(value) };
        self.back = back.wrapping_add(1);

        let threshold = wake_threshold.min(shared.capacity as usize / 2) as u32;
        let occupancy = self.back.wrapping_sub(shared.indices.front.get());
        shared.indices.back.increment(occupancy >= threshold);
    }

    /// Drop every value the consumer has popped since the last cleanup;
    /// returns how many were released
    pub fn cleanup(&mut self) -> usize {
        let shared = &*self.shared;
        let front = shared.indices.front.get();
        let mut released = 0;
        while self.released != front {
            // Safety: [released, front) was popped; the consumer no longer
            // touches it and the Acquire read of front orders its last access
            unsafe { (*shared.slot(self.released)).assume_init_drop() };
            self.released = self.released.wrapping_add(1);
            released += 1;
        }
        shared.released.store(self.released, Ordering::Relaxed);
        released
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity as usize
    }

    /// Items pushed but not yet popped
    #[inline]
    pub fn len(&self) -> usize {
        self.back.wrapping_sub(self.shared.indices.front.get()) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumer has popped everything and cleanup has released it
    #[inline]
    pub fn is_drained(&self) -> bool {
        self.is_empty() && self.released == self.back
    }

    /// Drop everything still in the ring after the consumer half is gone;
    /// returns how many items had not been consumed
    ///
    /// # Panics
    ///
    /// If the consumer half is still alive.
    pub fn discard_unconsumed(&mut self) -> usize {
        assert_eq!(
            Arc::strong_count(&self.shared),
            1,
            "discard_unconsumed with the consumer still attached"
        );
        self.cleanup();

        let shared = &*self.shared;
        let unconsumed = self.back.wrapping_sub(self.released) as usize;
        while self.released != self.back {
            // Safety: [released, back) is initialized and no consumer exists
            unsafe { (*shared.slot(self.released)).assume_init_drop() };
            self.released = self.released.wrapping_add(1);
        }
        shared.indices.front.reset(self.back);
        shared.released.store(self.released, Ordering::Relaxed);
        unconsumed
    }
}

impl<T> Consumer<T> {
    /// Block until an item is available and return it without removing it
    pub fn front(&mut self) -> &mut T {
        let shared = &*self.shared;
        let mut back = shared.indices.back.get();
        while back == self.front {
            back = shared.indices.back.wait_until_not_equal(self.front);
        }
        // Safety: front < back, so the slot is published and ours until pop
        unsafe { (*shared.slot(self.front)).assume_init_mut() }
    }

    /// Non-blocking `front`
    pub fn try_front(&mut self) -> Option<&mut T> {
        let shared = &*self.shared;
        if shared.indices.back.get() == self.front {
            return None;
        }
        // Safety: as in front()
        Some(unsafe { (*shared.slot(self.front)).assume_init_mut() })
    }

    /// Remove the oldest item, blocking until one exists
    ///
    /// The value itself is dropped later by the producer's cleanup. Wakes
    /// the producer only once occupancy has fallen to `(capacity + 1) / 2`.
    pub fn pop(&mut self) {
        let shared = &*self.shared;
        let mut back = shared.indices.back.get();
        while back == self.front {
            back = shared.indices.back.wait_until_not_equal(self.front);
        }

        self.front = self.front.wrapping_add(1);
        let occupancy = shared.indices.back.get().wrapping_sub(self.front);
        let release_at = (shared.capacity + 1) / 2;
        shared.indices.front.increment(occupancy <= release_at);
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity as usize
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shared.indices.back.get().wrapping_sub(self.front) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_capacity_rounds_to_power_of_two() {
        assert_eq!(capacity_for(1), 1);
        assert_eq!(capacity_for(2), 2);
        assert_eq!(capacity_for(5), 8);
        assert_eq!(capacity_for(9), 16);
        assert_eq!(capacity_for(16), 16);
        assert_eq!(capacity_for(2047), 2048);

        let (p, c) = channel::<u8>(5);
        assert_eq!(p.capacity(), 8);
        assert_eq!(c.capacity(), 8);
    }

    #[test]
    #[should_panic(expected = "non-zero")]
    fn test_zero_capacity_panics() {
        let _ = channel::<u8>(0);
    }

    #[test]
    fn test_single_thread_push_pop() {
        let (mut p, mut c) = channel(4);
        assert!(c.try_front().is_none());

        p.push(10u32, 0);
        p.push(20u32, 0);
        assert_eq!(p.len(), 2);
        assert_eq!(*c.front(), 10);
        *c.front() += 1;
        assert_eq!(c.try_front().copied(), Some(11));
        c.pop();
        assert_eq!(*c.front(), 20);
        c.pop();
        assert!(c.is_empty());

        assert_eq!(p.cleanup(), 2);
        assert!(p.is_drained());
    }

    #[test]
    fn test_fifo_across_threads_and_wrap() {
        const N: u32 = 100_000;
        let (mut p, mut c) = channel_starting_at::<u32>(8, u32::MAX - 1000);

        let consumer = thread::spawn(move || {
            let mut expected = 0u32;
            loop {
                let v = *c.front();
                c.pop();
                if v == u32::MAX {
                    break;
                }
                assert_eq!(v, expected);
                expected += 1;
            }
            expected
        });

        for i in 0..N {
            p.push(i, 0);
        }
        p.push(u32::MAX, 0);
        assert_eq!(consumer.join().unwrap(), N);

        p.cleanup();
        assert!(p.is_drained());
    }

    #[test]
    fn test_wake_threshold_batching_delivers_everything() {
        let (mut p, mut c) = channel::<u64>(16);
        let consumer = thread::spawn(move || {
            let mut sum = 0;
            loop {
                let v = *c.front();
                c.pop();
                if v == 0 {
                    return sum;
                }
                sum += v;
            }
        });

        for i in 1..=1_000u64 {
            p.push(i, 64);
        }
        p.push(0, 0);
        assert_eq!(consumer.join().unwrap(), 1_000 * 1_001 / 2);
        p.cleanup();
    }

    #[test]
    fn test_backpressure_blocks_until_pop() {
        const CAP: usize = 4;
        let (mut p, mut c) = channel::<usize>(CAP);
        let pushed = Arc::new(AtomicUsize::new(0));

        let pushed2 = pushed.clone();
        let producer = thread::spawn(move || {
            for i in 0..=CAP {
                p.push(i, 0);
                pushed2.fetch_add(1, Ordering::SeqCst);
            }
            p
        });

        // Producer fills the ring and then blocks on the extra item
        while pushed.load(Ordering::SeqCst) < CAP {
            thread::yield_now();
        }
        thread::sleep(Duration::from_millis(50));
        assert_eq!(pushed.load(Ordering::SeqCst), CAP);
        assert_eq!(c.len(), CAP);

        // The producer is only woken once occupancy is back down to half
        for expected in 0..CAP / 2 {
            assert_eq!(*c.front(), expected);
            c.pop();
        }
        let mut p = producer.join().unwrap();
        assert_eq!(pushed.load(Ordering::SeqCst), CAP + 1);

        // Nothing was lost
        for expected in CAP / 2..=CAP {
            assert_eq!(*c.front(), expected);
            c.pop();
        }
        p.cleanup();
        assert!(p.is_drained());
    }

    #[test]
    fn test_cleanup_drops_popped_values_on_producer() {
        let token = Arc::new(());
        let (mut p, mut c) = channel::<Arc<()>>(4);
        for _ in 0..3 {
            p.push(token.clone(), 0);
        }
        assert_eq!(Arc::strong_count(&token), 4);

        c.pop();
        c.pop();
        // Popped values are still alive until the producer cleans up
        assert_eq!(Arc::strong_count(&token), 4);
        assert_eq!(p.cleanup(), 2);
        assert_eq!(Arc::strong_count(&token), 2);

        c.pop();
        drop(c);
        drop(p);
        assert_eq!(Arc::strong_count(&token), 1);
    }

    #[test]
    #[should_panic(expected = "unconsumed")]
    fn test_drop_with_unconsumed_items_panics() {
        let (mut p, c) = channel::<u8>(2);
        p.push(1, 0);
        drop(c);
        drop(p);
    }

    #[test]
    fn test_discard_unconsumed_after_consumer_dropped() {
        let token = Arc::new(());
        let (mut p, mut c) = channel::<Arc<()>>(8);
        for _ in 0..5 {
            p.push(token.clone(), 0);
        }
        c.pop();
        drop(c);

        // One popped but unreleased, four never consumed
        assert_eq!(p.discard_unconsumed(), 4);
        assert_eq!(Arc::strong_count(&token), 1);
        assert!(p.is_drained());
        drop(p);
    }

    #[test]
    #[should_panic(expected = "consumer still attached")]
    fn test_discard_unconsumed_requires_detached_consumer() {
        let (mut p, _c) = channel::<u8>(2);
        p.discard_unconsumed();
    }

    #[test]
    fn test_capacity_one() {
        let (mut p, mut c) = channel::<u32>(1);
        let consumer = thread::spawn(move || {
            let mut got = Vec::new();
            for _ in 0..100 {
                got.push(*c.front());
                c.pop();
            }
            got
        });
        for i in 0..100 {
            p.push(i, 0);
        }
        assert_eq!(consumer.join().unwrap(), (0..100).collect::<Vec<_>>());
        p.cleanup();
    }
}
