//! Shared identifiers used across the cordmap engine
//!
//! Kept separate from the engine crate so the error/identifier surface can be
//! depended on without pulling in the lock-free implementation.

/// A process-wide monotonic epoch counter value (reclamation epoch or
/// timestamp epoch -- both share the same representation).
pub type Epoch = u64;
