//! Error types for tilefuse

use thiserror::Error;

/// Result type alias using tilefuse's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tilefuse operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// An uninitialized shape was used in an operation
    #[error("Operation on an empty (uninitialized) shape")]
    EmptyShape,

    /// Range mismatch between operands
    #[error("Range mismatch: expected {expected:?}, got {got:?}")]
    RangeMismatch {
        /// Expected range extents
        expected: Vec<usize>,
        /// Actual range extents
        got: Vec<usize>,
    },

    /// A tile norm was negative
    #[error("Negative tile norm at ordinal {ordinal}")]
    NegativeNorm {
        /// Linear offset of the offending entry
        ordinal: usize,
    },

    /// The zero threshold must be positive and finite
    #[error("Invalid zero threshold {value}")]
    InvalidThreshold {
        /// The rejected threshold value
        value: f64,
    },

    /// Tensor ranks do not describe a valid contraction
    #[error("Rank mismatch: cannot contract rank {left} with rank {right} into rank {result}")]
    RankMismatch {
        /// Rank of the result tensor
        result: usize,
        /// Rank of the left-hand tensor
        left: usize,
        /// Rank of the right-hand tensor
        right: usize,
    },

    /// The index map is not a bijection on its dimensions
    #[error("Invalid permutation {perm:?}")]
    InvalidPermutation {
        /// The rejected index map
        perm: Vec<usize>,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// A value was read from a future that has not been set
    #[error("Future has not been set")]
    PendingFuture,

    /// An upstream future or reduction step failed
    #[error("Reduction poisoned: {0}")]
    Poisoned(String),

    /// A collective operation failed
    #[error("Collective failed: {0}")]
    CollectiveFailed(String),

    /// The task queue no longer accepts work
    #[error("Task queue exhausted")]
    QueueExhausted,

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a range mismatch error from two extent slices
    pub fn range_mismatch(expected: &[usize], got: &[usize]) -> Self {
        Self::RangeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }
}
