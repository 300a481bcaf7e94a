// Error types shared across the crate.

use thiserror::Error;

/// The closed set of ways an operation in this crate can fail.
#[derive(Error, Debug)]
pub enum Error {
    /// A requested allocation was rejected before it was attempted because
    /// its size was determined to be unreasonable (e.g. a corrupt prefix
    /// table header). Rust itself aborts the process on true allocator
    /// failure, so this variant only ever comes from such pre-checks.
    #[error("allocation of {0} bytes rejected")]
    OutOfMemory(usize),

    /// A malformed alphabet, word, or classifier mode.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A keyed lookup found nothing at all (not to be confused with
    /// [`crate::ecurve::LookupStatus::OutOfBounds`], which is a normal
    /// lookup outcome, not an error).
    #[error("not found")]
    NotFound,

    /// Attempted to insert a key that is already present where only
    /// insert-if-absent semantics are valid.
    #[error("already exists")]
    AlreadyExists,

    /// A stored ecurve, matrix, or codon table did not match the format it
    /// claimed to be in.
    #[error("invalid file: {0}")]
    InvalidFile(String),

    /// Propagated I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested feature is not available in this build/platform.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Convenience alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, Error>;
