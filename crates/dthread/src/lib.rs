//! # dthread - Delegate Threads
//!
//! Hand work to a dedicated worker thread from one producer, with strict
//! FIFO order and as few wakeups as the caller allows.
//!
//! ## Features
//!
//! - **Lock-free SPSC queue**: power-of-two ring of closures, futex sleeps only when empty/full
//! - **Wake batching**: fire-and-forget jobs can defer the worker wakeup until N are pending
//! - **Synchronous calls**: `call_for_result` blocks on a one-shot event and may borrow the caller's stack
//! - **Slab allocation**: closures live in fixed 128-byte slots owned by the producer, heap fallback beyond
//! - **Panic containment**: job panics are logged and counted, call panics resume on the caller
//!
//! ## Quick Start
//!
//! ```ignore
//! use dthread::DelegateThread;
//!
//! fn main() {
//!     let mut gl = DelegateThread::new("gl-render", 2048).unwrap();
//!
//!     // Fire and forget, wake the worker once 8 jobs are queued
//!     gl.submit_batched(|| println!("draw"), 8);
//!
//!     // Round trip
//!     let answer = gl.call_for_result(|| 6 * 7);
//!     assert_eq!(answer, 42);
//!
//!     // Everything queued so far has run
//!     gl.barrier();
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                DelegateThread (producer)                    │
//! │     submit / call / barrier, owns the slab allocator        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ push Closure
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SPSC closure queue                       │
//! │    slots[capacity], IndexPair { front, back } on futexes    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ front / pop
//!                              ▼
//!                     ┌─────────────────┐
//!                     │  Worker Thread  │
//!                     │  invoke in order│
//!                     └─────────────────┘
//! ```

// Re-export core types
pub use dthread_core::{
    Closure,
    DelegateError,
    DelegateResult,
    FnJob,
    Job,
    SlabAllocator,
    SlabStats,
    WorkerError,
    WorkerId,
};
pub use dthread_core::constants;

// Re-export kprint macros for debug logging
pub use dthread_core::{kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use dthread_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use dthread_core::{env_get, env_get_bool, env_get_opt, env_get_size, env_get_str};

// Re-export runtime types
pub use dthread_runtime::{
    current_worker_id,
    os_thread_id,
    DelegateConfig,
    DelegateState,
    DelegateThread,
    OneShotEvent,
};
pub use dthread_runtime::queue;

/// Start a delegate configured from `DTH_*` environment variables
///
/// Also initializes logging from `DTH_LOG_LEVEL`.
pub fn from_env() -> DelegateResult<DelegateThread> {
    init_logging();
    DelegateThread::with_config(DelegateConfig::from_env())
}
