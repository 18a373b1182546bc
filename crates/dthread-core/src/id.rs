//! Worker identifier type

use core::fmt;

/// Opaque diagnostic handle for a delegate worker
///
/// On Linux this is the kernel thread id (what `top -H` and `/proc/<pid>/task`
/// show). Elsewhere it is a process-unique number. Never used for lookups.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Sentinel for "worker not started / already joined"
    pub const NONE: WorkerId = WorkerId(u64::MAX);

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        WorkerId(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u64::MAX
    }

    #[inline]
    pub const fn to_option(self) -> Option<WorkerId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl fmt::Debug for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "WorkerId(NONE)")
        } else {
            write!(f, "WorkerId({})", self.0)
        }
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        WorkerId::NONE
    }
}
