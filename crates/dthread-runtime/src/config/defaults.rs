//! Library defaults for `DelegateConfig`

/// Worker thread name
pub const NAME: &str = "delegate";

/// Minimum queue capacity (rounded up to a power of two)
pub const QUEUE_CAPACITY: usize = 2048;

/// Wake threshold used by `submit()`; 0 wakes the worker on every push
pub const WAKE_THRESHOLD: usize = 0;

/// Pre-reserved closure slots in the producer's slab
///
/// Every live closure occupies a queue slot until the producer's cleanup
/// releases it, so at most `QUEUE_CAPACITY` closures exist at once. Matching
/// that keeps small closures off the heap even with a full ring, at a cost of
/// 128 bytes per slot (256KB here). Smaller slabs fall back to the heap once
/// the backlog outgrows them.
pub const SLAB_SLOTS: usize = QUEUE_CAPACITY;

/// Worker stack size in bytes; 0 keeps the platform default
pub const STACK_SIZE: usize = 0;
