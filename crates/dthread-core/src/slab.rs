//! Slab allocator for delegated closures
//!
//! A fixed array of equally sized slots handed out through a LIFO free stack,
//! so the most recently released (cache-warm) slot is reused first. Requests
//! that do not fit a slot, or arrive while every slot is in use, fall back to
//! the global heap transparently.
//!
//! The allocator is single-threaded: it is `!Send` and `!Sync`, and every
//! method takes `&self` through interior mutability. It belongs to exactly one
//! producer, which is the only thread that allocates closures and the only
//! thread that releases them (during queue cleanup).

use core::alloc::Layout;
use core::cell::{Cell, UnsafeCell};
use core::mem::{self, MaybeUninit};
use core::ptr::NonNull;
use std::alloc;

use crate::constants::{SLAB_SLOT_ALIGN, SLAB_SLOT_SIZE};
use crate::ktrace;

#[repr(C, align(16))]
struct SlabSlot(UnsafeCell<MaybeUninit<[u8; SLAB_SLOT_SIZE]>>);

const _: () = assert!(mem::align_of::<SlabSlot>() == SLAB_SLOT_ALIGN);
const _: () = assert!(mem::size_of::<SlabSlot>() == SLAB_SLOT_SIZE);

impl SlabSlot {
    fn new() -> Self {
        SlabSlot(UnsafeCell::new(MaybeUninit::uninit()))
    }
}

/// Allocation counters
///
/// Every successful `alloc` bumps exactly one of the `*_allocs` counters and
/// every `free` bumps exactly one of the `*_frees` counters, so a quiescent
/// allocator with no live closures is always balanced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlabStats {
    pub slab_allocs: u64,
    pub heap_allocs: u64,
    pub slab_frees: u64,
    pub heap_frees: u64,
}

impl SlabStats {
    /// Allocations not yet freed (slab + heap)
    #[inline]
    pub fn outstanding(&self) -> u64 {
        (self.slab_allocs + self.heap_allocs) - (self.slab_frees + self.heap_frees)
    }

    /// Slab slots currently handed out
    #[inline]
    pub fn slab_in_use(&self) -> u64 {
        self.slab_allocs - self.slab_frees
    }

    #[inline]
    pub fn is_balanced(&self) -> bool {
        self.slab_allocs == self.slab_frees && self.heap_allocs == self.heap_frees
    }
}

struct SlabInner {
    slots: Box<[SlabSlot]>,
    /// Indices of free slots; the last entry is handed out next
    free_stack: UnsafeCell<Vec<u32>>,
    stats: Cell<SlabStats>,
}

impl SlabInner {
    fn fits(layout: Layout) -> bool {
        layout.size() <= SLAB_SLOT_SIZE && layout.align() <= SLAB_SLOT_ALIGN
    }

    /// Heap layouts must be non-zero sized.
    fn heap_layout(layout: Layout) -> Layout {
        if layout.size() == 0 {
            Layout::from_size_align(1, layout.align()).unwrap_or(layout)
        } else {
            layout
        }
    }

    fn bump(&self, f: impl FnOnce(&mut SlabStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    #[inline]
    fn slot_ptr(&self, idx: u32) -> NonNull<u8> {
        let slot = &self.slots[idx as usize];
        // Safety: UnsafeCell::get never returns null
        unsafe { NonNull::new_unchecked(slot.0.get() as *mut u8) }
    }

    fn slot_index(&self, ptr: NonNull<u8>) -> Option<u32> {
        let base = self.slots.as_ptr() as usize;
        let end = base + self.slots.len() * mem::size_of::<SlabSlot>();
        let addr = ptr.as_ptr() as usize;
        if addr < base || addr >= end {
            return None;
        }
        debug_assert_eq!((addr - base) % mem::size_of::<SlabSlot>(), 0, "pointer into the middle of a slot");
        Some(((addr - base) / mem::size_of::<SlabSlot>()) as u32)
    }

    fn alloc(&self, layout: Layout) -> NonNull<u8> {
        if Self::fits(layout) {
            // Safety: single-threaded by construction (!Send, !Sync) and no
            // reference into the stack outlives this statement
            let free = unsafe { &mut *self.free_stack.get() };
            if let Some(idx) = free.pop() {
                self.bump(|s| s.slab_allocs += 1);
                return self.slot_ptr(idx);
            }
            ktrace!("slab exhausted ({} slots), {} bytes from heap", self.slots.len(), layout.size());
        }

        let heap = Self::heap_layout(layout);
        // Safety: heap layout has non-zero size
        let raw = unsafe { alloc::alloc(heap) };
        let ptr = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(heap));
        self.bump(|s| s.heap_allocs += 1);
        ptr
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        match self.slot_index(ptr) {
            Some(idx) => {
                let free = &mut *self.free_stack.get();
                debug_assert!(!free.contains(&idx), "double free of slab slot {}", idx);
                free.push(idx);
                self.bump(|s| s.slab_frees += 1);
            }
            None => {
                alloc::dealloc(ptr.as_ptr(), Self::heap_layout(layout));
                self.bump(|s| s.heap_frees += 1);
            }
        }
    }
}

/// Fixed-slot allocator with heap fallback, owned by one producer
pub struct SlabAllocator {
    inner: NonNull<SlabInner>,
}

/// Non-owning handle used by closures to return their memory
///
/// Only valid while the owning [`SlabAllocator`] is alive.
#[derive(Clone, Copy)]
pub struct SlabRef {
    inner: NonNull<SlabInner>,
}

impl SlabAllocator {
    /// Create an allocator with `slots` pre-reserved slots of `SLAB_SLOT_SIZE` bytes
    ///
    /// `slots == 0` is valid and makes every allocation a heap allocation.
    pub fn new(slots: usize) -> Self {
        assert!(slots <= u32::MAX as usize, "too many slab slots: {}", slots);
        let storage: Vec<SlabSlot> = (0..slots).map(|_| SlabSlot::new()).collect();
        let inner = Box::new(SlabInner {
            slots: storage.into_boxed_slice(),
            free_stack: UnsafeCell::new((0..slots as u32).rev().collect()),
            stats: Cell::new(SlabStats::default()),
        });
        Self {
            inner: NonNull::from(Box::leak(inner)),
        }
    }

    #[inline]
    fn inner(&self) -> &SlabInner {
        // Safety: inner is owned by self and freed only in Drop
        unsafe { self.inner.as_ref() }
    }

    /// Allocate memory for `layout`, from a slot when it fits and one is free
    ///
    /// Never fails: heap exhaustion goes through `handle_alloc_error`.
    #[inline]
    pub fn alloc(&self, layout: Layout) -> NonNull<u8> {
        self.inner().alloc(layout)
    }

    /// Return memory obtained from [`alloc`](Self::alloc)
    ///
    /// # Safety
    ///
    /// `ptr` must come from `alloc` on this allocator with the same `layout`
    /// and must not have been freed already.
    #[inline]
    pub unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        self.inner().free(ptr, layout)
    }

    /// Whether `ptr` lies inside the slot array
    #[inline]
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.inner().slot_index(ptr).is_some()
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.inner().slots.len()
    }

    /// Slots currently on the free stack
    pub fn free_slots(&self) -> usize {
        // Safety: single-threaded, no outstanding borrow of the stack
        unsafe { (*self.inner().free_stack.get()).len() }
    }

    #[inline]
    pub fn stats(&self) -> SlabStats {
        self.inner().stats.get()
    }

    /// Handle for closures allocated from this slab
    #[inline]
    pub fn handle(&self) -> SlabRef {
        SlabRef { inner: self.inner }
    }
}

impl SlabRef {
    /// # Safety
    ///
    /// The owning allocator must still be alive, and the call must happen on
    /// the thread that owns it. `ptr`/`layout` as for [`SlabAllocator::free`].
    #[inline]
    pub unsafe fn free(self, ptr: NonNull<u8>, layout: Layout) {
        self.inner.as_ref().free(ptr, layout)
    }
}

impl Drop for SlabAllocator {
    fn drop(&mut self) {
        let stats = self.stats();
        if stats.slab_in_use() != 0 {
            // Live closures still point into the slot array: leak it rather
            // than leave them dangling.
            if !std::thread::panicking() {
                panic!("slab allocator dropped with {} slots in use", stats.slab_in_use());
            }
            return;
        }
        // Safety: allocated in new() via Box::leak, no slot is in use
        drop(unsafe { Box::from_raw(self.inner.as_ptr()) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn small() -> Layout {
        Layout::new::<[u64; 4]>()
    }

    #[test]
    fn test_alloc_from_slab_lifo() {
        let slab = SlabAllocator::new(4);
        let a = slab.alloc(small());
        let b = slab.alloc(small());
        assert!(slab.contains(a));
        assert!(slab.contains(b));
        assert_ne!(a, b);
        assert_eq!(slab.free_slots(), 2);

        unsafe { slab.free(a, small()) };
        let c = slab.alloc(small());
        assert_eq!(c, a, "most recently freed slot is reused first");

        unsafe {
            slab.free(b, small());
            slab.free(c, small());
        }
        assert!(slab.stats().is_balanced());
        assert_eq!(slab.free_slots(), 4);
    }

    #[test]
    fn test_slots_are_aligned() {
        let slab = SlabAllocator::new(8);
        let ptrs: Vec<_> = (0..8).map(|_| slab.alloc(small())).collect();
        for p in &ptrs {
            assert_eq!(p.as_ptr() as usize % SLAB_SLOT_ALIGN, 0);
        }
        for p in ptrs {
            unsafe { slab.free(p, small()) };
        }
    }

    #[test]
    fn test_exhaustion_falls_back_to_heap() {
        let slab = SlabAllocator::new(2);
        let a = slab.alloc(small());
        let b = slab.alloc(small());
        let c = slab.alloc(small());
        assert!(!slab.contains(c));

        let stats = slab.stats();
        assert_eq!(stats.slab_allocs, 2);
        assert_eq!(stats.heap_allocs, 1);
        assert_eq!(stats.outstanding(), 3);

        unsafe {
            slab.free(c, small());
            slab.free(a, small());
            slab.free(b, small());
        }
        let stats = slab.stats();
        assert_eq!(stats.heap_frees, 1);
        assert_eq!(stats.slab_frees, 2);
        assert!(stats.is_balanced());
    }

    #[test]
    fn test_oversized_and_zero_sized() {
        let slab = SlabAllocator::new(2);
        let big = Layout::new::<[u8; SLAB_SLOT_SIZE + 1]>();
        let p = slab.alloc(big);
        assert!(!slab.contains(p));

        let overaligned = Layout::from_size_align(8, 64).unwrap();
        let q = slab.alloc(overaligned);
        assert!(!slab.contains(q));
        assert_eq!(q.as_ptr() as usize % 64, 0);

        let zst = Layout::new::<()>();
        let z = slab.alloc(zst);
        assert!(slab.contains(z));

        unsafe {
            slab.free(p, big);
            slab.free(q, overaligned);
            slab.free(z, zst);
        }
        assert!(slab.stats().is_balanced());
    }

    #[test]
    fn test_zero_slots_is_pure_heap() {
        let slab = SlabAllocator::new(0);
        let p = slab.alloc(small());
        assert!(!slab.contains(p));
        unsafe { slab.free(p, small()) };
        assert_eq!(slab.stats().heap_allocs, 1);
        assert!(slab.stats().is_balanced());
    }

    #[test]
    fn test_interleaved_never_hands_out_live_address() {
        let slab = SlabAllocator::new(16);
        let mut live: Vec<NonNull<u8>> = Vec::new();
        let mut live_set: HashSet<usize> = HashSet::new();

        // Deterministic interleaving that repeatedly overruns the 16 slots
        let mut seed = 0x2545_f491u32;
        for _ in 0..10_000 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            if seed % 3 != 0 || live.is_empty() {
                let p = slab.alloc(small());
                assert!(live_set.insert(p.as_ptr() as usize), "address handed out twice");
                // Scribble the whole block to catch overlap
                unsafe { p.as_ptr().write_bytes(0xA5, small().size()) };
                live.push(p);
            } else {
                let idx = seed as usize % live.len();
                let p = live.swap_remove(idx);
                live_set.remove(&(p.as_ptr() as usize));
                unsafe { slab.free(p, small()) };
            }
        }

        for p in live.drain(..) {
            unsafe { slab.free(p, small()) };
        }
        let stats = slab.stats();
        assert!(stats.is_balanced());
        assert!(stats.heap_allocs > 0, "pattern should overrun the slab");
        assert_eq!(slab.free_slots(), 16);
    }

    #[test]
    fn test_drop_with_slot_in_use_panics() {
        let result = std::panic::catch_unwind(|| {
            let slab = SlabAllocator::new(1);
            let _leaked = slab.alloc(small());
            drop(slab);
        });
        assert!(result.is_err());
    }
}
