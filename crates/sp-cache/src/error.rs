//! Cache error types.

use std::fmt;

/// Cache operation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The key is already present and unexpired.
    AlreadyExists(String),
    /// The store refused the entry because it is full.
    CapacityExceeded(usize),
    /// Internal cache error.
    Internal(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists(key) => write!(f, "cache key already present: {key}"),
            Self::CapacityExceeded(max) => write!(f, "cache capacity of {max} entries exceeded"),
            Self::Internal(msg) => write!(f, "internal cache error: {msg}"),
        }
    }
}

impl std::error::Error for CacheError {}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CacheError::CapacityExceeded(10);
        assert_eq!(err.to_string(), "cache capacity of 10 entries exceeded");

        let err = CacheError::AlreadyExists("AAQAA".to_string());
        assert!(err.to_string().contains("AAQAA"));
    }
}
