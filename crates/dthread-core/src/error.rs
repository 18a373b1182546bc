//! Error types for delegate threads
//!
//! Only construction and teardown can fail recoverably. Submitting, calling
//! and draining never return errors: they block until they succeed.

use core::fmt;

/// Result type for delegate thread operations
pub type DelegateResult<T> = Result<T, DelegateError>;

/// Errors that can occur creating or stopping a delegate thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegateError {
    /// Requested queue capacity is zero or too large to round to a power of two
    InvalidCapacity(usize),

    /// Some other configuration value is out of range
    InvalidConfig(&'static str),

    /// The OS refused to spawn the worker thread
    SpawnFailed(WorkerError),

    /// The worker thread died with a panic that escaped the job guard
    WorkerPanicked,

    /// The delegate thread was already shut down
    AlreadyStopped,
}

impl fmt::Display for DelegateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelegateError::InvalidCapacity(n) => write!(f, "invalid queue capacity: {}", n),
            DelegateError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            DelegateError::SpawnFailed(e) => write!(f, "spawn failed: {}", e),
            DelegateError::WorkerPanicked => write!(f, "delegate worker panicked"),
            DelegateError::AlreadyStopped => write!(f, "delegate thread already stopped"),
        }
    }
}

impl std::error::Error for DelegateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DelegateError::SpawnFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// Worker thread spawn failure details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerError {
    /// Name the worker would have had
    pub name: String,
    /// OS error code, when the platform reported one
    pub os_error: Option<i32>,
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.os_error {
            Some(code) => write!(f, "worker '{}' (os error {})", self.name, code),
            None => write!(f, "worker '{}'", self.name),
        }
    }
}

impl std::error::Error for WorkerError {}

impl From<WorkerError> for DelegateError {
    fn from(e: WorkerError) -> Self {
        DelegateError::SpawnFailed(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = DelegateError::InvalidCapacity(0);
        assert_eq!(format!("{}", e), "invalid queue capacity: 0");

        let e: DelegateError = WorkerError {
            name: "gl".to_string(),
            os_error: Some(11),
        }
        .into();
        assert_eq!(format!("{}", e), "spawn failed: worker 'gl' (os error 11)");
    }

    #[test]
    fn test_error_source() {
        use std::error::Error;

        let e = DelegateError::SpawnFailed(WorkerError {
            name: "fence".to_string(),
            os_error: None,
        });
        assert!(e.source().is_some());
        assert!(DelegateError::WorkerPanicked.source().is_none());
    }
}
