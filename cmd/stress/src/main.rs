//! Stress test - many jobs through several delegates
//!
//! Each producer thread owns one delegate and pushes jobs through it with a
//! mix of wake thresholds, then checks order and slab balance.
//!
//! Usage: `stress [jobs_per_delegate] [delegates]`

use dthread::{init_logging, DelegateConfig, DelegateThread};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

fn main() {
    println!("=== Delegate Thread Stress Test ===\n");
    init_logging();

    let jobs: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1_000_000);
    let delegates: usize = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(4);

    println!("Pushing {} jobs through each of {} delegates...", jobs, delegates);

    let start = Instant::now();
    let producers: Vec<_> = (0..delegates)
        .map(|d| {
            thread::Builder::new()
                .name(format!("producer-{}", d))
                .spawn(move || run_producer(d, jobs))
                .expect("failed to spawn producer")
        })
        .collect();

    let mut failures = 0;
    for (d, handle) in producers.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(elapsed)) => println!(
                "  delegate {}: {:?} ({:.0} jobs/sec)",
                d,
                elapsed,
                jobs as f64 / elapsed.as_secs_f64()
            ),
            Ok(Err(msg)) => {
                failures += 1;
                println!("  delegate {}: FAILED: {}", d, msg);
            }
            Err(_) => {
                failures += 1;
                println!("  delegate {}: producer panicked", d);
            }
        }
    }
    let total_time = start.elapsed();

    println!("\n=== Results ===");
    println!("Total jobs:      {}", jobs * delegates as u64);
    println!("Total time:      {:?}", total_time);
    println!(
        "Throughput:      {:.0} jobs/sec",
        (jobs * delegates as u64) as f64 / total_time.as_secs_f64()
    );

    // Round-trip latency on a fresh delegate
    let mut delegate = DelegateThread::new("latency", 16).expect("failed to start delegate");
    let rounds = 10_000u64;
    let lat_start = Instant::now();
    for i in 0..rounds {
        let v = delegate.call_for_result(move || i);
        assert_eq!(v, i);
    }
    let per_call = lat_start.elapsed() / rounds as u32;
    println!("Call latency:    {:?} per round trip", per_call);

    if failures > 0 {
        println!("\n{} delegate(s) failed", failures);
        std::process::exit(1);
    }
    println!("\n=== Stress Test Complete ===");
}

fn run_producer(index: usize, jobs: u64) -> Result<std::time::Duration, String> {
    let config = DelegateConfig::from_env()
        .name(format!("stress-{}", index))
        .wake_threshold(64);
    let mut delegate = DelegateThread::with_config(config).map_err(|e| e.to_string())?;

    // Worker-side check that jobs arrive in submission order
    let next = Arc::new(AtomicU64::new(0));
    let out_of_order = Arc::new(AtomicU64::new(0));

    let start = Instant::now();
    for i in 0..jobs {
        let next = next.clone();
        let out_of_order = out_of_order.clone();
        let job = move || {
            if next.fetch_add(1, Ordering::Relaxed) != i {
                out_of_order.fetch_add(1, Ordering::Relaxed);
            }
        };
        // Every 4096th push wakes the worker immediately
        if i % 4096 == 0 {
            delegate.submit_batched(job, 0);
        } else {
            delegate.submit(job);
        }
    }
    delegate.barrier();
    let elapsed = start.elapsed();

    let ran = next.load(Ordering::Relaxed);
    let disordered = out_of_order.load(Ordering::Relaxed);
    let stats = delegate.shutdown().map_err(|e| e.to_string())?;

    if ran != jobs {
        return Err(format!("ran {} of {} jobs", ran, jobs));
    }
    if disordered != 0 {
        return Err(format!("{} jobs out of order", disordered));
    }
    if !stats.is_balanced() {
        return Err(format!("slab unbalanced: {:?}", stats));
    }
    Ok(elapsed)
}
