//! # dthread-core
//!
//! Platform-agnostic building blocks for delegate threads.
//!
//! Nothing here touches the OS: futexes, queues and the worker thread live in
//! `dthread-runtime`.
//!
//! ## Modules
//!
//! - `closure` - Type-erased, slab-backed work items (`Closure`, `Job`)
//! - `slab` - Fixed-slot free-list allocator with heap fallback
//! - `id` - Worker identifier type
//! - `error` - Error types
//! - `kprint` - Kernel-style leveled logging macros
//! - `env` - Environment variable utilities

#![allow(dead_code)]

pub mod kprint;
pub mod env;
pub mod error;
pub mod id;
pub mod slab;
pub mod closure;

pub use closure::{Closure, FnJob, Job};
pub use slab::{SlabAllocator, SlabRef, SlabStats};
pub use id::WorkerId;
pub use error::{DelegateError, DelegateResult, WorkerError};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_size, env_get_str};

/// Sizing constants
pub mod constants {
    /// Bytes per slab slot. Covers a closure capturing a handful of pointers
    /// plus the bookkeeping of a synchronous call.
    pub const SLAB_SLOT_SIZE: usize = 128;

    /// Alignment of every slab slot
    pub const SLAB_SLOT_ALIGN: usize = 16;

    /// Largest queue capacity: counters are `u32`, so the capacity must
    /// divide 2^32 and leave room for the full/empty distinction
    pub const MAX_QUEUE_CAPACITY: usize = 1 << 31;
}
