//! # dthread-runtime
//!
//! OS-facing half of the delegate thread library.
//!
//! This crate provides:
//! - Futex wait/wake (Linux syscall, striped condvar fallback elsewhere)
//! - One-shot events and circular index pairs built on the futex
//! - The SPSC closure queue with wake batching
//! - The delegate worker thread and its producer handle

#![allow(dead_code)]

pub mod config;
pub mod futex;
pub mod event;
pub mod index;
pub mod queue;
pub mod worker;
pub mod delegate;

mod call;

// Re-exports
pub use config::DelegateConfig;
pub use futex::Futex;
pub use event::OneShotEvent;
pub use index::{CircularIndex, IndexPair};
pub use queue::{channel, Consumer, Producer};
pub use worker::{current_worker_id, os_thread_id, WorkerStats};
pub use delegate::{DelegateState, DelegateThread};
