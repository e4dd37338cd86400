//! Error types for cordmap
//!
//! This module defines the error types used throughout cordmap.

use thiserror::Error;

/// The main error type for cordmap operations
#[derive(Error, Debug)]
pub enum Error {
    /// `range_query(lo, hi)` was called with `lo > hi`
    #[error("invalid range: lo > hi")]
    InvalidRange,

    /// The slab allocator could not satisfy an allocation
    ///
    /// Returned once `MapConfig::max_resident_nodes` is exceeded, if set.
    /// Even with the default (`None`), the arena itself is a large but
    /// finite capacity fixed at construction (`MapConfig::arena_capacity`),
    /// so this error remains reachable once that capacity fills up.
    #[error("allocator exhausted: more than {0} nodes resident")]
    AllocatorExhausted(usize),
}

/// A specialized Result type for cordmap operations
pub type Result<T> = std::result::Result<T, Error>;
