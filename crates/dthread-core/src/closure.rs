//! Type-erased work items
//!
//! A [`Closure`] is an owned, move-only handle to a [`Job`] living in memory
//! obtained from a [`SlabAllocator`]. Dispatch goes through a static vtable
//! per job type, so small closures cost one slab pop and no heap traffic.
//!
//! Ownership across threads:
//!
//! - the producer allocates the closure and pushes it into the queue;
//! - the worker only calls [`Closure::invoke`] through the queue slot;
//! - the producer drops it again when queue cleanup reclaims the vacated
//!   slot, which returns the memory to the slab.
//!
//! The slab is therefore only ever touched from the producer thread.

use core::alloc::Layout;
use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ptr::{self, NonNull};

use crate::slab::{SlabAllocator, SlabRef};

/// A unit of delegated work
///
/// `run` takes `&self` because the producer may observe other parts of the
/// job (a result slot, a completion event) while the worker runs it.
/// Implementations keep their mutable state in `UnsafeCell`s or atomics.
pub trait Job: Send {
    fn run(&self);
}

/// Job wrapping a plain `FnOnce()`; running it a second time is a no-op
pub struct FnJob<F> {
    f: UnsafeCell<Option<F>>,
}

impl<F> FnJob<F> {
    pub fn new(f: F) -> Self {
        Self {
            f: UnsafeCell::new(Some(f)),
        }
    }
}

impl<F: FnOnce() + Send> Job for FnJob<F> {
    fn run(&self) {
        // Safety: FnJob is !Sync and run is never re-entered for the same job
        let f = unsafe { (*self.f.get()).take() };
        if let Some(f) = f {
            f();
        }
    }
}

struct JobVTable {
    run: unsafe fn(NonNull<u8>),
    drop: unsafe fn(NonNull<u8>),
    layout: Layout,
}

unsafe fn run_job<J: Job>(data: NonNull<u8>) {
    data.cast::<J>().as_ref().run();
}

unsafe fn drop_job<J>(data: NonNull<u8>) {
    ptr::drop_in_place(data.cast::<J>().as_ptr());
}

struct VTableFor<J>(PhantomData<J>);

impl<J: Job> VTableFor<J> {
    const VTABLE: JobVTable = JobVTable {
        run: run_job::<J>,
        drop: drop_job::<J>,
        layout: Layout::new::<J>(),
    };
}

/// Owned, type-erased job stored in slab (or fallback heap) memory
pub struct Closure {
    data: NonNull<u8>,
    vtable: &'static JobVTable,
    slab: SlabRef,
}

// Safety: the stored job is Send (enforced by the constructors); the slab
// handle is only dereferenced in Drop, which by contract runs on the
// producer thread that owns the allocator.
unsafe impl Send for Closure {}

impl Closure {
    /// Wrap a fire-and-forget function
    ///
    /// # Safety
    ///
    /// The closure must be dropped on the thread owning `slab`, before `slab`
    /// itself is dropped.
    pub unsafe fn new<F>(slab: &SlabAllocator, f: F) -> Closure
    where
        F: FnOnce() + Send + 'static,
    {
        Self::from_job(slab, FnJob::new(f)).0
    }

    /// Store an arbitrary job, returning a pointer to it for side channels
    /// such as a result slot
    ///
    /// # Safety
    ///
    /// As for [`new`](Self::new). In addition, anything `job` borrows must
    /// outlive its invocation, and the returned pointer is only valid until
    /// the closure is dropped. Only `&J` may be formed from it.
    pub unsafe fn from_job<J: Job>(slab: &SlabAllocator, job: J) -> (Closure, NonNull<J>) {
        let vtable: &'static JobVTable = &VTableFor::<J>::VTABLE;
        let data = slab.alloc(vtable.layout);
        ptr::write(data.cast::<J>().as_ptr(), job);
        let closure = Closure {
            data,
            vtable,
            slab: slab.handle(),
        };
        (closure, data.cast::<J>())
    }

    /// Run the job in place
    #[inline]
    pub fn invoke(&mut self) {
        // Safety: data holds a live J matching the vtable
        unsafe { (self.vtable.run)(self.data) }
    }

    /// Size of the stored job
    #[inline]
    pub fn job_size(&self) -> usize {
        self.vtable.layout.size()
    }

    #[inline]
    pub(crate) fn data(&self) -> NonNull<u8> {
        self.data
    }
}

impl Drop for Closure {
    fn drop(&mut self) {
        // Safety: data holds a live J; memory came from this slab with the
        // vtable's layout; Drop runs on the producer thread by contract
        unsafe {
            (self.vtable.drop)(self.data);
            self.slab.free(self.data, self.vtable.layout);
        }
    }
}

impl core::fmt::Debug for Closure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Closure")
            .field("data", &self.data)
            .field("size", &self.vtable.layout.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SLAB_SLOT_SIZE;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_invoke_runs_once() {
        let slab = SlabAllocator::new(4);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let mut c = unsafe {
            Closure::new(&slab, move || {
                h.fetch_add(1, Ordering::SeqCst);
            })
        };
        assert!(slab.contains(c.data()));

        c.invoke();
        c.invoke();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        drop(c);
        assert!(slab.stats().is_balanced());
    }

    #[test]
    fn test_uninvoked_closure_drops_captures() {
        let slab = SlabAllocator::new(4);
        let token = Arc::new(());
        let captured = token.clone();
        let c = unsafe { Closure::new(&slab, move || drop(captured)) };
        assert_eq!(Arc::strong_count(&token), 2);
        drop(c);
        assert_eq!(Arc::strong_count(&token), 1);
        assert!(slab.stats().is_balanced());
    }

    #[test]
    fn test_large_capture_uses_heap() {
        let slab = SlabAllocator::new(4);
        let payload = [7u8; SLAB_SLOT_SIZE * 2];
        let out = Arc::new(AtomicUsize::new(0));
        let o = out.clone();
        let mut c = unsafe {
            Closure::new(&slab, move || {
                o.store(payload.iter().map(|&b| b as usize).sum(), Ordering::SeqCst);
            })
        };
        assert!(!slab.contains(c.data()));
        assert!(c.job_size() > SLAB_SLOT_SIZE);

        c.invoke();
        assert_eq!(out.load(Ordering::SeqCst), 7 * SLAB_SLOT_SIZE * 2);
        drop(c);
        assert_eq!(slab.stats().heap_frees, 1);
    }

    struct Counted<'a> {
        runs: &'a Cell<u32>,
    }

    // Test-only: the job never leaves this thread
    unsafe impl Send for Counted<'_> {}

    impl Job for Counted<'_> {
        fn run(&self) {
            self.runs.set(self.runs.get() + 1);
        }
    }

    #[test]
    fn test_from_job_exposes_job() {
        let slab = SlabAllocator::new(1);
        let runs = Cell::new(0);
        let (mut c, job) = unsafe { Closure::from_job(&slab, Counted { runs: &runs }) };
        c.invoke();
        c.invoke();
        assert_eq!(runs.get(), 2);
        assert_eq!(unsafe { job.as_ref() }.runs.get(), 2);
        drop(c);
        assert!(slab.stats().is_balanced());
    }
}
