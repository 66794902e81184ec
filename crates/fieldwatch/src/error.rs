#![forbid(unsafe_code)]

//! Dispatch errors.
//!
//! Validation outcomes are never errors: a failing condition is an
//! [`Invalid`](crate::ValidationResult::Invalid) verdict and a cancelled round
//! simply never reports. The only failure that crosses the API boundary is
//! the inability to start a worker thread for an async condition.

use std::fmt;
use std::io;

/// Errors raised while starting a validation round.
#[derive(Debug)]
pub enum DispatchError {
    /// The OS refused to spawn a worker thread for an async condition.
    Spawn {
        /// Index of the async condition within its criteria.
        condition: usize,
        /// The underlying spawn error.
        source: io::Error,
    },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Spawn { condition, source } => {
                write!(f, "failed to spawn worker for async condition {condition}: {source}")
            }
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Spawn { source, .. } => Some(source),
        }
    }
}

/// Result type for dispatch operations.
pub type DispatchResult<T = ()> = Result<T, DispatchError>;
