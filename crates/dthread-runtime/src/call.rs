//! Synchronous call item
//!
//! Pairs the user's function with a result slot and a fresh
//! [`OneShotEvent`]. The item lives in the closure's slab memory, which the
//! producer only releases during a cleanup *after* it has read the result,
//! so the event and the slot stay valid for the whole round trip.

use std::cell::UnsafeCell;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use dthread_core::Job;

use crate::event::OneShotEvent;

pub(crate) struct SyncCall<F, R> {
    f: UnsafeCell<Option<F>>,
    outcome: UnsafeCell<Option<thread::Result<R>>>,
    done: OneShotEvent,
}

impl<F, R> SyncCall<F, R> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f: UnsafeCell::new(Some(f)),
            outcome: UnsafeCell::new(None),
            done: OneShotEvent::new(),
        }
    }

    /// Block the producer until the worker has run the function
    pub(crate) fn wait(&self) {
        self.done.wait();
    }

    /// Take the function's return value (or its panic payload)
    ///
    /// # Safety
    ///
    /// Only after `wait()` returned, and at most once.
    pub(crate) unsafe fn take_outcome(&self) -> thread::Result<R> {
        match (*self.outcome.get()).take() {
            Some(outcome) => outcome,
            None => unreachable!("sync call completed without an outcome"),
        }
    }
}

impl<F, R> Job for SyncCall<F, R>
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    fn run(&self) {
        // Safety: only the worker touches `f`, once
        let f = unsafe { (*self.f.get()).take() };
        let Some(f) = f else { return };

        // A panic is carried back to the caller instead of killing the worker
        let outcome = panic::catch_unwind(AssertUnwindSafe(f));
        // Safety: the producer reads the slot only after `done` fires
        unsafe { *self.outcome.get() = Some(outcome) };
        self.done.trigger();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_then_take() {
        let call = SyncCall::new(|| 6 * 7);
        call.run();
        call.wait();
        assert_eq!(unsafe { call.take_outcome() }.unwrap(), 42);
    }

    #[test]
    fn test_panic_is_captured() {
        let call = SyncCall::new(|| -> u8 { panic!("boom") });
        call.run();
        call.wait();
        let err = unsafe { call.take_outcome() }.unwrap_err();
        assert_eq!(err.downcast_ref::<&str>(), Some(&"boom"));
    }
}
