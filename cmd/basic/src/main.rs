//! Basic delegate thread example
//!
//! Demonstrates fire-and-forget jobs, batched wakeups, synchronous calls and
//! an orderly shutdown.
//!
//! # Environment Variables
//!
//! - `DTH_FLUSH_EPRINT=1` - Flush debug output immediately (useful for crash debugging)
//! - `DTH_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)

use dthread::{kdebug, kinfo, init_logging, os_thread_id, DelegateConfig, DelegateThread};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
// DTH_LOG_LEVEL=debug DTH_FLUSH_EPRINT=1 cargo run -p dthread-basic
fn main() {
    println!("=== Delegate Thread Basic Example ===\n");

    init_logging();

    let config = DelegateConfig::from_env()
        .name("basic-worker")
        .queue_capacity(4)
        .wake_threshold(2);
    config.print();

    let mut delegate = DelegateThread::with_config(config).expect("failed to start delegate");
    println!(
        "Started '{}' (worker={}, capacity={})",
        delegate.name(),
        delegate.worker_id(),
        delegate.capacity()
    );
    println!("Main thread id: {}\n", os_thread_id());

    // Fire-and-forget: more jobs than slots, so the producer blocks now and then
    let completed = Arc::new(AtomicUsize::new(0));
    for i in 1..=7 {
        let c = completed.clone();
        delegate.submit(move || {
            kdebug!("[job {}] running on {}", i, os_thread_id());
            c.fetch_add(1, Ordering::SeqCst);
        });
    }

    // Everything above has run once the barrier returns
    delegate.barrier();
    kinfo!("{} job(s) completed before barrier", completed.load(Ordering::SeqCst));
    println!("Jobs completed: {}", completed.load(Ordering::SeqCst));

    // Round trip, borrowing from this stack frame
    let numbers: Vec<u64> = (1..=10).collect();
    let sum = delegate.call_for_result(|| numbers.iter().sum::<u64>());
    println!("Sum computed on worker: {}", sum);

    // Batched: the worker stays asleep until 8 jobs are pending
    for i in 0..32 {
        let c = completed.clone();
        delegate.submit_batched(
            move || {
                kdebug!("[batched {}]", i);
                c.fetch_add(1, Ordering::SeqCst);
            },
            8,
        );
    }
    println!("Pending after batched submit: {}", delegate.pending());
    delegate.barrier();

    let where_ran = delegate.call_for_result(os_thread_id);
    println!("Call ran on worker {}", where_ran);

    match delegate.shutdown() {
        Ok(stats) => {
            println!("\nSlab stats: {:?}", stats);
            println!("Balanced: {}", stats.is_balanced());
        }
        Err(e) => println!("\nShutdown failed: {}", e),
    }
    println!("Total jobs completed: {}", completed.load(Ordering::SeqCst));

    println!("\n=== Example Complete ===");
}
