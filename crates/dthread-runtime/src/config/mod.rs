//! Delegate thread configuration
//!
//! Compile-time defaults (`defaults`) with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (`from_env`)
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use dthread_runtime::DelegateConfig;
//!
//! let config = DelegateConfig::from_env()
//!     .name("gl-render")
//!     .queue_capacity(2048)
//!     .wake_threshold(8);
//! ```

pub mod defaults;

use dthread_core::constants::MAX_QUEUE_CAPACITY;
use dthread_core::env::{env_get, env_get_size, env_get_str};
use dthread_core::{kprintln, DelegateError, DelegateResult};

use crate::queue::capacity_for;

/// Delegate thread configuration with builder pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateConfig {
    /// Worker thread name (also tags its log lines)
    pub name: String,
    /// Minimum queue capacity; rounded up to a power of two
    pub queue_capacity: usize,
    /// Default wake threshold for `submit()`; clamped to capacity/2 per push
    pub wake_threshold: usize,
    /// Pre-reserved slab slots for closures
    pub slab_slots: usize,
    /// Worker stack size in bytes (0 = platform default)
    pub stack_size: usize,
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DelegateConfig {
    /// Library defaults, no environment lookups
    pub fn new() -> Self {
        Self {
            name: defaults::NAME.to_string(),
            queue_capacity: defaults::QUEUE_CAPACITY,
            wake_threshold: defaults::WAKE_THRESHOLD,
            slab_slots: defaults::SLAB_SLOTS,
            stack_size: defaults::STACK_SIZE,
        }
    }

    /// Library defaults with environment overrides
    ///
    /// Environment variables (all optional):
    /// - `DTH_NAME` - Worker thread name
    /// - `DTH_QUEUE_CAPACITY` - Minimum queue capacity
    /// - `DTH_WAKE_THRESHOLD` - Default wake threshold for `submit()`
    /// - `DTH_SLAB_SLOTS` - Pre-reserved closure slots
    /// - `DTH_STACK_SIZE` - Worker stack size, e.g. `256k` or `2m`
    pub fn from_env() -> Self {
        Self {
            name: env_get_str("DTH_NAME", defaults::NAME),
            queue_capacity: env_get("DTH_QUEUE_CAPACITY", defaults::QUEUE_CAPACITY),
            wake_threshold: env_get("DTH_WAKE_THRESHOLD", defaults::WAKE_THRESHOLD),
            slab_slots: env_get("DTH_SLAB_SLOTS", defaults::SLAB_SLOTS),
            stack_size: env_get_size("DTH_STACK_SIZE", defaults::STACK_SIZE),
        }
    }

    // Builder methods

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n;
        self
    }

    pub fn wake_threshold(mut self, n: usize) -> Self {
        self.wake_threshold = n;
        self
    }

    pub fn slab_slots(mut self, n: usize) -> Self {
        self.slab_slots = n;
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    /// Capacity the queue will actually have
    pub fn effective_capacity(&self) -> DelegateResult<usize> {
        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(DelegateError::InvalidCapacity(self.queue_capacity));
        }
        Ok(capacity_for(self.queue_capacity))
    }

    pub fn validate(&self) -> DelegateResult<()> {
        self.effective_capacity()?;
        if self.name.contains('\0') {
            return Err(DelegateError::InvalidConfig("name must not contain NUL"));
        }
        if self.slab_slots > u32::MAX as usize {
            return Err(DelegateError::InvalidConfig("slab_slots must fit in u32"));
        }
        if self.stack_size != 0 && self.stack_size < 16 * 1024 {
            return Err(DelegateError::InvalidConfig("stack_size must be 0 or >= 16KB"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        kprintln!("Delegate thread configuration:");
        kprintln!("  name:            {}", self.name);
        kprintln!("  queue_capacity:  {}", self.queue_capacity);
        kprintln!("  wake_threshold:  {}", self.wake_threshold);
        kprintln!("  slab_slots:      {}", self.slab_slots);
        kprintln!("  stack_size:      {}", self.stack_size);
    }
}
