//! Core error and identifier types for cordmap
//!
//! This crate contains the error handling and small shared identifiers used
//! throughout the `cordmap` concurrent ordered map. It provides:
//!
//! - Common error types with [`Error`] and [`Result`]
//! - Shared identifiers like [`Epoch`]
//!
//! # Example
//!
//! ```
//! use cordmap_core::{Error, Result};
//!
//! fn check_range(lo: i64, hi: i64) -> Result<()> {
//!     if lo > hi {
//!         return Err(Error::InvalidRange);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
