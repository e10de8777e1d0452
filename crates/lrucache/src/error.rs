//! Error types for lrucache

use std::fmt;

use crate::MAX_CAPACITY;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Requested capacity outside `1..=MAX_CAPACITY`
    InvalidCapacity(usize),

    /// Key not present in the cache
    NotFound,

    /// Argument that is not allowed where a concrete value is required
    InvalidArgument(&'static str),

    /// Index and recency list disagree, or the list is malformed.
    ///
    /// Never expected in correct operation; treat it as a bug in the cache.
    InternalInconsistency(String),
}

impl Error {
    /// True for errors that indicate a broken internal invariant
    pub fn is_defect(&self) -> bool {
        matches!(self, Error::InternalInconsistency(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidCapacity(size) => write!(
                f,
                "Invalid capacity {}: size needs to be between 1 and {}",
                size, MAX_CAPACITY
            ),
            Error::NotFound => write!(f, "Key not found"),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::InternalInconsistency(msg) => write!(f, "Internal inconsistency: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
