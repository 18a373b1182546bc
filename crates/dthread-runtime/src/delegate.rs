//! Delegate thread
//!
//! A dedicated worker thread fed by one producer through the SPSC closure
//! queue. The handle is the producer: it owns the queue's producer half and
//! the slab allocator the closures live in.
//!
//! ```text
//!   producer thread                         worker thread
//!   ---------------                         -------------
//!   submit(f) ──► Closure (slab) ──push──►  front() ─► invoke ─► pop()
//!   call(f)   ──► Closure + event ─push──►    ...          │
//!     wait(event) ◄──────────────────────────────────── trigger
//!     cleanup() drops popped closures, slab slots return
//! ```
//!
//! Closures are dropped by `cleanup()` on the producer thread, never by the
//! worker, so the slab is only ever touched by its owner.

use std::panic;
use std::sync::Arc;
use std::thread::JoinHandle;

use dthread_core::{
    kdebug, kerror, Closure, DelegateError, DelegateResult, SlabAllocator, SlabStats, WorkerId,
};

use crate::call::SyncCall;
use crate::config::DelegateConfig;
use crate::queue::{self, Producer};
use crate::worker::{self, WorkerStats};

/// Lifecycle of a delegate thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegateState {
    /// Accepting work
    Running,
    /// Sentinel pushed, waiting for the worker to finish
    Draining,
    /// Worker joined, queue drained
    Stopped,
}

/// Handle to a delegate worker thread
///
/// `Send` but not `Sync`: the handle may move between threads, but only one
/// thread at a time can push into its queue.
pub struct DelegateThread {
    name: String,
    queue: Producer<Option<Closure>>,
    worker: Option<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
    worker_id: WorkerId,
    wake_threshold: usize,
    state: DelegateState,
    // Last: closures still held by the queue are released into it on drop
    slab: SlabAllocator,
}

// Safety: the slab and every closure referencing it move together with the
// handle; the worker never touches the slab. The handle stays !Sync through
// the allocator.
unsafe impl Send for DelegateThread {}

impl DelegateThread {
    /// Start a delegate with default settings and the given name and
    /// minimum queue capacity
    pub fn new(name: impl Into<String>, min_capacity: usize) -> DelegateResult<Self> {
        Self::with_config(DelegateConfig::new().name(name).queue_capacity(min_capacity))
    }

    /// Start a delegate from a full configuration
    pub fn with_config(config: DelegateConfig) -> DelegateResult<Self> {
        config.validate()?;

        let (producer, consumer) = queue::channel::<Option<Closure>>(config.queue_capacity);
        let stats = Arc::new(WorkerStats::default());
        let handle = worker::spawn(&config, consumer, Arc::clone(&stats))?;

        let mut delegate = DelegateThread {
            name: config.name,
            queue: producer,
            worker: Some(handle),
            stats,
            worker_id: WorkerId::NONE,
            wake_threshold: config.wake_threshold,
            state: DelegateState::Running,
            slab: SlabAllocator::new(config.slab_slots),
        };
        delegate.worker_id = delegate.stats.wait_started();

        kdebug!(
            "delegate '{}' started: worker {}, capacity {}, slab slots {}",
            delegate.name,
            delegate.worker_id,
            delegate.queue.capacity(),
            delegate.slab.slot_count()
        );
        Ok(delegate)
    }

    /// Queue `f` without waiting, using the configured wake threshold
    #[inline]
    pub fn submit<F>(&mut self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let threshold = self.wake_threshold;
        self.submit_batched(f, threshold);
    }

    /// Queue `f` without waiting; the worker is only woken once at least
    /// `wake_threshold` items are pending (clamped to half the capacity)
    pub fn submit_batched<F>(&mut self, f: F, wake_threshold: usize)
    where
        F: FnOnce() + Send + 'static,
    {
        self.assert_running();
        // Safety: the closure is released by this handle's queue, on the
        // thread owning the handle, before `slab` is dropped
        let closure = unsafe { Closure::new(&self.slab, f) };
        self.queue.push(Some(closure), wake_threshold);
    }

    /// Run `f` on the worker and wait for it
    #[inline]
    pub fn call<F>(&mut self, f: F)
    where
        F: FnOnce() + Send,
    {
        self.call_for_result(f)
    }

    /// Run `f` on the worker and return its result
    ///
    /// Everything queued before runs first. `f` may borrow from the caller's
    /// stack. A panic in `f` is resumed on the calling thread.
    pub fn call_for_result<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.assert_running();
        // Safety: we block until the job has run, so whatever `f` borrows
        // outlives its invocation; release happens as in `submit_batched`
        let (closure, call) = unsafe { Closure::from_job(&self.slab, SyncCall::new(f)) };
        self.queue.push(Some(closure), 0);

        // Safety: the closure is only released by a cleanup, and none runs
        // before the outcome is taken
        let call = unsafe { call.as_ref() };
        call.wait();
        let outcome = unsafe { call.take_outcome() };
        self.queue.cleanup();

        match outcome {
            Ok(value) => value,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Wait until everything queued so far has run
    #[inline]
    pub fn barrier(&mut self) {
        self.call(|| {});
    }

    /// OS thread id of the worker
    #[inline]
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Actual (rounded) queue capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    #[inline]
    pub fn state(&self) -> DelegateState {
        self.state
    }

    /// Items pushed but not yet popped by the worker
    #[inline]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn slab_stats(&self) -> SlabStats {
        self.slab.stats()
    }

    /// Jobs the worker has finished (including panicked ones)
    ///
    /// Only jobs pushed through this handle are counted. A synchronous call
    /// returns just before its own job is counted.
    #[inline]
    pub fn jobs_run(&self) -> u64 {
        self.stats.jobs_run()
    }

    /// Fire-and-forget jobs that panicked on the worker
    #[inline]
    pub fn panicked_jobs(&self) -> u64 {
        self.stats.jobs_panicked()
    }

    /// Drain the queue and join the worker
    ///
    /// Everything submitted before still runs. Submitting afterwards is a
    /// programming error.
    pub fn stop(&mut self) -> DelegateResult<()> {
        if self.state != DelegateState::Running {
            return Err(DelegateError::AlreadyStopped);
        }
        self.state = DelegateState::Draining;
        self.queue.push(None, 0);

        let joined = match self.worker.take() {
            Some(handle) => handle.join().map_err(|_| DelegateError::WorkerPanicked),
            None => Ok(()),
        };
        self.queue.cleanup();
        match joined {
            Ok(()) => assert!(
                self.queue.is_drained(),
                "delegate '{}' stopped with {} unreleased items",
                self.name,
                self.queue.len()
            ),
            Err(_) => {
                // The worker is gone; nobody else will ever consume these
                let discarded = self.queue.discard_unconsumed();
                kerror!(
                    "delegate '{}' worker died, discarded {} queued items",
                    self.name,
                    discarded
                );
            }
        }

        self.state = DelegateState::Stopped;
        kdebug!(
            "delegate '{}' stopped: {} jobs, {} panicked",
            self.name,
            self.stats.jobs_run(),
            self.stats.jobs_panicked()
        );
        joined
    }

    /// Stop the delegate and report final slab counters
    pub fn shutdown(mut self) -> DelegateResult<SlabStats> {
        self.stop()?;
        Ok(self.slab.stats())
    }

    #[inline]
    fn assert_running(&self) {
        assert!(
            self.state == DelegateState::Running,
            "delegate '{}' used after stop",
            self.name
        );
    }
}

impl Drop for DelegateThread {
    fn drop(&mut self) {
        if self.state == DelegateState::Running {
            if let Err(e) = self.stop() {
                kerror!("delegate '{}' shutdown failed: {}", self.name, e);
            }
        }
    }
}

impl std::fmt::Debug for DelegateThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegateThread")
            .field("name", &self.name)
            .field("worker_id", &self.worker_id)
            .field("capacity", &self.queue.capacity())
            .field("state", &self.state)
            .finish()
    }
}
