//! A lock-free concurrent ordered map with linearizable range queries.
//!
//! The map is a singly-linked, key-ordered chain of nodes threaded through a
//! fixed arena, kept free of locks on its hot path by an MVCC scheme: every
//! node carries a snapshot timestamp (`ts`) alongside a version chain
//! (`next_v`) of the values it displaced, so a `range_query` can walk a
//! consistent snapshot of the structure without ever blocking a concurrent
//! `insert` or `erase`. Safe memory reclamation for the nodes a mutation
//! physically unlinks is handled by a global reclamation epoch: a slot is
//! never handed back out to a new allocation until every thread that could
//! still be reading through it has had a chance to move past the epoch it
//! was retired at.
//!
//! - [`alloc`]: the per-thread slab allocator and the two global epoch
//!   counters (reclamation, timestamp).
//! - [`node`]: tagged links and packed timestamps -- the bit-level
//!   representation everything else operates on.
//! - [`list`]: `find`/`trim`/`insert`/`erase`, the core ordered-structure
//!   algorithm.
//! - [`index`]: the optional search accelerator (`NoIndex`, `SkipListIndex`).
//! - [`range`]: the linearizable range-query engine.
//! - [`map`]: [`map::ConcurrentMap`], the public facade tying the above
//!   together, and [`map::ThreadHandle`], a thread's registration with it.
//! - [`config`]: [`config::MapConfig`], construction-time tuning.
//!
//! # Example
//!
//! ```
//! use cordmap::map::ConcurrentMap;
//!
//! let map: ConcurrentMap<i64, &str> = ConcurrentMap::new(i64::MIN, i64::MAX, "").unwrap();
//! let mut handle = map.init_thread();
//!
//! map.insert(&mut handle, 1, "a").unwrap();
//! map.insert(&mut handle, 5, "b").unwrap();
//! assert_eq!(map.range_query(&mut handle, &0, &10).unwrap(), vec![(1, "a"), (5, "b")]);
//!
//! map.deinit_thread(handle);
//! ```

pub mod alloc;
pub mod config;
pub mod index;
pub mod list;
pub mod map;
pub mod node;
pub mod range;

pub use config::MapConfig;
pub use map::{ConcurrentMap, ThreadHandle};
