//! A single fixed-size cache of slot indices.
//!
//! An `AllocCache` is handed out whole by the global stack and drained (as
//! an alloc cache) or filled (as a free cache) by exactly one thread at a
//! time; it needs no internal synchronization of its own.

use cordmap_core::types::Epoch;

pub struct AllocCache {
    entries: Vec<u32>,
    capacity: usize,
    max_retire_epoch: Epoch,
    /// True iff every slot in this cache was carved straight from the arena
    /// and never written to. A cache is either entirely virgin (built once
    /// by `fill_virgin`) or entirely made of retired slots -- the two kinds
    /// are never mixed, so this flag is enough to tell `alloc()` whether a
    /// popped slot needs `Arena::init` (no prior value to drop) or
    /// `Arena::reinit` (drops the slot's last occupant first).
    virgin: bool,
}

impl AllocCache {
    pub fn empty(capacity: usize) -> Self {
        AllocCache {
            entries: Vec::with_capacity(capacity),
            capacity,
            max_retire_epoch: 0,
            virgin: false,
        }
    }

    /// Fills this (empty) cache with `count` never-retired slots starting at
    /// `first_slot`.
    pub fn fill_virgin(&mut self, first_slot: u32, count: usize) {
        debug_assert!(self.entries.is_empty());
        self.entries.clear();
        self.entries.extend((0..count as u32).map(|i| first_slot + i));
        self.max_retire_epoch = 0;
        self.virgin = true;
    }

    pub fn is_virgin(&self) -> bool {
        self.virgin
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_retire_epoch(&self) -> Epoch {
        self.max_retire_epoch
    }

    pub fn pop(&mut self) -> Option<u32> {
        self.entries.pop()
    }

    /// Pushes a retired slot, recording `retire_epoch` as its retirement
    /// point. Panics if the cache is already full; callers must check
    /// [`AllocCache::is_full`] first.
    pub fn push(&mut self, slot: u32, retire_epoch: Epoch) {
        assert!(!self.is_full(), "push into a full AllocCache");
        self.entries.push(slot);
        if retire_epoch > self.max_retire_epoch {
            self.max_retire_epoch = retire_epoch;
        }
    }

    /// Resets a drained alloc cache into an empty free cache, ready to
    /// absorb newly retired slots.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.max_retire_epoch = 0;
        self.virgin = false;
    }
}
