//! Error types for index operations.

use thiserror::Error;

/// Errors produced by the index and its durable arena.
#[derive(Debug, Error)]
pub enum PannError {
    /// `add_item` or `build_index` was called on an already-built index.
    #[error("index is already built")]
    AlreadyBuilt,

    /// `build_index` was called with no items inserted.
    #[error("cannot build an index with no items")]
    EmptyIndex,

    /// The arena's fixed node ceiling was reached.
    #[error("arena capacity of {capacity} nodes exceeded")]
    CapacityExceeded { capacity: usize },

    /// A search was attempted before the index was built.
    #[error("index is not built")]
    NotBuilt,

    /// A vector's length does not match the configured dimensionality.
    #[error("vector has {got} dimensions, index is configured for {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Recovered metadata is unusable (bad magic, checksum, or fields).
    #[error("corrupt index state: {0}")]
    CorruptState(String),

    /// A node id outside the allocated range was dereferenced.
    #[error("node id {id} out of range (allocated: {allocated})")]
    OutOfRange { id: i64, allocated: i64 },

    /// Item ids must be presented contiguously from 0 upward.
    #[error("item id {id} leaves a gap (next expected id is {expected})")]
    NonContiguousId { id: i64, expected: i64 },

    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An underlying I/O operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, PannError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PannError::DimensionMismatch {
            expected: 40,
            got: 2,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("40"));
        assert!(msg.contains("2"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PannError = io.into();
        assert!(matches!(err, PannError::Io(_)));
    }
}
