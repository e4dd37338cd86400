//! Per-thread slab allocator and the global reclamation epoch.
//!
//! Three pieces, leaves first:
//!
//! - [`arena::Arena`]: the fixed backing store slots are carved from.
//! - [`cache::AllocCache`]: a fixed-size array of slot indices, moved
//!   whole between threads.
//! - [`GlobalAllocator`] / [`LocalAllocator`]: the global cache stack plus
//!   reclamation epoch, and each thread's private alloc/free cache lists.
//!
//! The global stack of caches is guarded by a [`parking_lot::Mutex`] rather
//! than a lock-free Treiber stack. This is a deliberate, documented
//! deviation from "no locking anywhere" (see DESIGN.md): the stack is only
//! touched roughly once per [`cache::AllocCache`]-worth of allocations or
//! retirements (every `entries_per_cache` operations, not every operation),
//! and it is never touched by `find`/`insert`/`erase`/`range_query` directly
//! -- only by the allocator's own cold refill/drain path. The operations
//! required to be lock-free remain so.

mod arena;
mod cache;

pub use cache::AllocCache;

use crate::config::MapConfig;
use crate::node::Node;
use arena::Arena;
use cordmap_core::types::Epoch;
use cordmap_core::{Error, Result};
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global, process-wide allocator state: the backing arena, the shared stack
/// of ready-to-use caches, and the reclamation epoch.
pub struct GlobalAllocator<K, V> {
    arena: Arena<K, V>,
    stack: Mutex<Vec<AllocCache>>,
    reclamation_epoch: CachePadded<AtomicU64>,
    timestamp_epoch: CachePadded<AtomicU64>,
    entries_per_cache: usize,
}

impl<K, V> GlobalAllocator<K, V> {
    pub fn new(config: &MapConfig) -> Self {
        GlobalAllocator {
            arena: Arena::with_capacity(config.arena_capacity()),
            stack: Mutex::new(Vec::new()),
            reclamation_epoch: CachePadded::new(AtomicU64::new(0)),
            timestamp_epoch: CachePadded::new(AtomicU64::new(0)),
            entries_per_cache: config.entries_per_cache,
        }
    }

    pub fn entries_per_cache(&self) -> usize {
        self.entries_per_cache
    }

    /// Reads the reclamation epoch. Acquire: every later read gated on this
    /// value must observe everything published before the epoch was bumped.
    pub fn epoch(&self) -> Epoch {
        self.reclamation_epoch.load(Ordering::Acquire)
    }

    /// CAS-bumps the epoch from `expected` to `expected + 1`. Harmless (and
    /// expected) to race: any thread may attempt this, and only one needs to
    /// succeed for every thread's next [`GlobalAllocator::epoch`] read to
    /// observe the advance.
    pub fn bump_epoch(&self, expected: Epoch) -> Epoch {
        match self.reclamation_epoch.compare_exchange(
            expected,
            expected + 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                log::trace!("reclamation epoch advanced to {}", expected + 1);
                expected + 1
            }
            Err(actual) => actual,
        }
    }

    /// Reads the timestamp epoch. Acquire: a range query must see
    /// every `ts` finalization published before the epoch it samples.
    pub fn timestamp_epoch(&self) -> Epoch {
        self.timestamp_epoch.load(Ordering::Acquire)
    }

    /// CAS-bumps the timestamp epoch from `expected` to `expected + 2`,
    /// keeping it even so the low bit stays free for `ts`'s pending bit.
    /// Harmless to race: any range query may attempt this.
    pub fn bump_timestamp_epoch(&self, expected: Epoch) -> Epoch {
        match self.timestamp_epoch.compare_exchange(
            expected,
            expected + 2,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                log::trace!("timestamp epoch advanced to {}", expected + 2);
                expected + 2
            }
            Err(actual) => actual,
        }
    }

    fn pop_cache(&self) -> Option<AllocCache> {
        self.stack.lock().pop()
    }

    fn push_cache(&self, cache: AllocCache) {
        self.stack.lock().push(cache);
    }

    fn carve_virgin_cache(&self) -> Option<AllocCache> {
        let first = self.arena.carve(self.entries_per_cache)?;
        let mut cache = AllocCache::empty(self.entries_per_cache);
        cache.fill_virgin(first, self.entries_per_cache);
        Some(cache)
    }

    pub fn node(&self, slot: u32) -> &Node<K, V> {
        self.arena.get(slot)
    }

    /// # Safety
    /// See [`Arena::init`].
    pub unsafe fn init_slot(&self, slot: u32, node: Node<K, V>) {
        self.arena.init(slot, node)
    }

    /// # Safety
    /// See [`Arena::reinit`].
    pub unsafe fn reinit_slot(&self, slot: u32, node: Node<K, V>) {
        self.arena.reinit(slot, node)
    }

    pub fn arena_capacity(&self) -> usize {
        self.arena.capacity()
    }

    /// How many arena slots have ever been carved virgin. Diagnostic only;
    /// see [`Arena::carved_count`].
    pub fn slots_carved(&self) -> usize {
        self.arena.carved_count()
    }
}

const DEFAULT_ALLOC_CACHES: usize = 2;

/// Per-thread allocator state: private lists of alloc and free caches.
///
/// Not `Send`/`Sync` on purpose in spirit (though nothing stops moving one
/// across threads) -- exactly one thread is meant to own each
/// `LocalAllocator`, bound to it via [`crate::map::ConcurrentMap::init_thread`].
pub struct LocalAllocator<'g, K, V> {
    global: &'g GlobalAllocator<K, V>,
    alloc_caches: Vec<AllocCache>,
    free_caches: Vec<AllocCache>,
    free_cache_budget: usize,
}

impl<'g, K, V> LocalAllocator<'g, K, V> {
    pub fn new(global: &'g GlobalAllocator<K, V>, config: &MapConfig) -> Self {
        let mut local = LocalAllocator {
            global,
            alloc_caches: Vec::with_capacity(config.alloc_caches_per_thread),
            free_caches: Vec::with_capacity(config.free_caches_per_thread),
            free_cache_budget: config.free_caches_per_thread,
        };
        for _ in 0..config.alloc_caches_per_thread {
            if !local.grow_alloc_caches() {
                break;
            }
        }
        local
    }

    /// `max_resident_nodes` is realized by sizing the arena itself at
    /// construction (`MapConfig::arena_capacity`), so exhaustion is uniformly
    /// "the arena has no more virgin slots and the global stack is empty" --
    /// no separate bookkeeping needed here.
    fn grow_alloc_caches(&mut self) -> bool {
        if let Some(cache) = self.global.pop_cache() {
            if cache.max_retire_epoch() == self.global.epoch() {
                self.global.bump_epoch(self.global.epoch());
            }
            self.alloc_caches.push(cache);
            return true;
        }
        if let Some(cache) = self.global.carve_virgin_cache() {
            self.alloc_caches.push(cache);
            return true;
        }
        false
    }

    /// Obtains a fresh slot, initializing it with `node` (built from a
    /// `cur_epoch` the caller already sampled).
    pub fn alloc(&mut self, node: Node<K, V>) -> Result<u32> {
        loop {
            if let Some(cache) = self.alloc_caches.last_mut() {
                if !cache.is_empty() {
                    let virgin = cache.is_virgin();
                    let slot = cache.pop().expect("checked non-empty above");
                    if virgin {
                        // SAFETY: carved straight from the arena, never written.
                        unsafe { self.global.init_slot(slot, node) };
                    } else {
                        // SAFETY: previously retired and epoch-gated before
                        // being recycled into a cache by `retire`/refill.
                        unsafe { self.global.reinit_slot(slot, node) };
                    }
                    return Ok(slot);
                }
                let mut drained = self.alloc_caches.pop().expect("checked Some above");
                drained.reset();
                if self.free_caches.len() < self.free_cache_budget {
                    self.free_caches.push(drained);
                }
                continue;
            }
            if !self.grow_alloc_caches() {
                log::warn!("slab allocator exhausted");
                return Err(Error::AllocatorExhausted(self.global.arena_capacity()));
            }
        }
    }

    /// Returns a slot that was allocated but never published (an insert or
    /// trim lost its CAS race). No reader has ever observed it, so it can be
    /// reused immediately without any epoch gating.
    pub fn return_unused(&mut self, slot: u32) {
        self.retire_at_epoch(slot, 0);
    }

    /// Retires a slot that was live and has just been physically unlinked.
    pub fn retire(&mut self, slot: u32) {
        let epoch = self.global.epoch();
        self.retire_at_epoch(slot, epoch);
    }

    fn retire_at_epoch(&mut self, slot: u32, retire_epoch: Epoch) {
        if self.free_caches.last().map(AllocCache::is_full).unwrap_or(true) {
            let capacity = self.global.entries_per_cache();
            self.free_caches.push(AllocCache::empty(capacity));
        }
        let cache = self.free_caches.last_mut().expect("just ensured present");
        cache.push(slot, retire_epoch);
        if cache.is_full() {
            let full = self.free_caches.pop().expect("just filled");
            self.global.push_cache(full);
        }
    }

    pub fn node(&self, slot: u32) -> &Node<K, V> {
        self.global.node(slot)
    }

    pub fn global(&self) -> &'g GlobalAllocator<K, V> {
        self.global
    }
}

/// Flushes every cache this thread was holding back onto the global stack
/// on deinit: an allocator that never reclaims a departed thread's caches
/// would slowly starve the rest of the system.
impl<'g, K, V> Drop for LocalAllocator<'g, K, V> {
    fn drop(&mut self) {
        for cache in self.alloc_caches.drain(..) {
            self.global.push_cache(cache);
        }
        for cache in self.free_caches.drain(..) {
            self.global.push_cache(cache);
        }
    }
}
