//! Error types for the Quarry allocators.
//!
//! This module defines the failures an allocator can report: a capacity too
//! small to hold any block at construction time, and exhaustion of the
//! arena's free space at allocation time. Misuse of raw payload pointers
//! (double free, foreign pointer) is not detectable and is therefore not an
//! error value; the deallocating entry points document it as undefined.

use std::fmt;

/// Errors that can occur while constructing or using an allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The requested capacity cannot hold even one minimal free block.
    ConstructionFailed {
        /// The capacity the caller asked for.
        requested: usize,
        /// The smallest capacity the strategy accepts.
        minimum: usize,
    },

    /// No free block can serve the request; the arena is unchanged.
    MemoryExhausted {
        /// The payload size the caller asked for.
        requested: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConstructionFailed { requested, minimum } => {
                write!(
                    f,
                    "Construction failed: requested {requested} bytes, minimum capacity {minimum} bytes"
                )
            }
            Error::MemoryExhausted { requested } => {
                write!(f, "Memory exhausted: no free block can hold {requested} bytes")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Result type for allocator operations.
pub type Result<T> = std::result::Result<T, Error>;
