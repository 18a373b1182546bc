//! Delegate worker thread
//!
//! One OS thread per delegate, running jobs from the consumer half of the
//! queue in order until it pops the `None` sentinel.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use dthread_core::{kdebug, kerror, Closure, WorkerError, WorkerId};

use crate::config::DelegateConfig;
use crate::event::OneShotEvent;
use crate::queue::Consumer;

/// Counters shared between a delegate and its worker
#[derive(Debug)]
pub struct WorkerStats {
    jobs_run: AtomicU64,
    jobs_panicked: AtomicU64,
    /// Raw `WorkerId`, written once before `started` fires
    worker_id: AtomicU64,
    started: OneShotEvent,
}

impl Default for WorkerStats {
    fn default() -> Self {
        Self {
            jobs_run: AtomicU64::new(0),
            jobs_panicked: AtomicU64::new(0),
            worker_id: AtomicU64::new(WorkerId::NONE.as_raw()),
            started: OneShotEvent::new(),
        }
    }
}

impl WorkerStats {
    /// Block until the worker has published its id, then return it
    pub fn wait_started(&self) -> WorkerId {
        self.started.wait();
        WorkerId::from_raw(self.worker_id.load(Ordering::Acquire))
    }

    #[inline]
    pub fn jobs_run(&self) -> u64 {
        self.jobs_run.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn jobs_panicked(&self) -> u64 {
        self.jobs_panicked.load(Ordering::Relaxed)
    }
}

thread_local! {
    /// Set while this OS thread is running a delegate worker loop
    static CURRENT_WORKER: Cell<WorkerId> = const { Cell::new(WorkerId::NONE) };
}

/// Id of the delegate worker running on this thread, if any
#[inline]
pub fn current_worker_id() -> Option<WorkerId> {
    CURRENT_WORKER.with(|cell| cell.get()).to_option()
}

/// Diagnostic id of the calling OS thread
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn os_thread_id() -> WorkerId {
    WorkerId::from_raw(nix::unistd::gettid().as_raw() as u64)
}

/// Diagnostic id of the calling OS thread (process-unique counter)
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn os_thread_id() -> WorkerId {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static ID: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    WorkerId::from_raw(ID.with(|id| *id))
}

/// Spawn the worker thread for `queue`
pub(crate) fn spawn(
    config: &DelegateConfig,
    queue: Consumer<Option<Closure>>,
    stats: Arc<WorkerStats>,
) -> Result<JoinHandle<()>, WorkerError> {
    let mut builder = thread::Builder::new().name(config.name.clone());
    if config.stack_size != 0 {
        builder = builder.stack_size(config.stack_size);
    }

    builder
        .spawn(move || run(queue, stats))
        .map_err(|e| WorkerError {
            name: config.name.clone(),
            os_error: e.raw_os_error(),
        })
}

/// Worker main loop
///
/// Peek, invoke, pop, until the sentinel; then pop once more so the
/// sentinel's slot is released too.
fn run(mut queue: Consumer<Option<Closure>>, stats: Arc<WorkerStats>) {
    let id = os_thread_id();
    CURRENT_WORKER.with(|cell| cell.set(id));
    stats.worker_id.store(id.as_raw(), Ordering::Release);
    stats.started.trigger();
    kdebug!("worker {} running, capacity {}", id, queue.capacity());

    while let Some(job) = queue.front() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.invoke()));
        stats.jobs_run.fetch_add(1, Ordering::Relaxed);
        if let Err(payload) = outcome {
            stats.jobs_panicked.fetch_add(1, Ordering::Relaxed);
            kerror!("delegated job panicked: {}", panic_message(payload.as_ref()));
        }
        queue.pop();
    }
    queue.pop();

    CURRENT_WORKER.with(|cell| cell.set(WorkerId::NONE));
    kdebug!("worker {} exiting after {} jobs", id, stats.jobs_run());
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_thread_id_differs_per_thread() {
        let here = os_thread_id();
        let there = thread::spawn(os_thread_id).join().unwrap();
        assert!(!here.is_none());
        assert_ne!(here, there);
        assert_eq!(here, os_thread_id());
    }

    #[test]
    fn test_worker_publishes_id_before_any_job() {
        let (mut producer, consumer) = crate::queue::channel::<Option<Closure>>(4);
        let stats = Arc::new(WorkerStats::default());
        let handle = spawn(
            &DelegateConfig::new().name("publish"),
            consumer,
            Arc::clone(&stats),
        )
        .unwrap();

        let id = stats.wait_started();
        assert!(!id.is_none());
        assert_ne!(id, os_thread_id());
        assert_eq!(stats.jobs_run(), 0);

        producer.push(None, 0);
        handle.join().unwrap();
        producer.cleanup();
        assert!(producer.is_drained());
    }

    #[test]
    fn test_not_a_worker() {
        assert_eq!(current_worker_id(), None);
    }

    #[test]
    fn test_panic_message() {
        let p: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(p.as_ref()), "static");
        let p: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(p.as_ref()), "owned");
        let p: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(p.as_ref()), "<non-string panic payload>");
    }
}
