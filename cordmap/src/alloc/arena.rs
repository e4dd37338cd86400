//! Fixed-capacity backing store the slab allocator carves slots from.
//!
//! Capacity is fixed at
//! construction (see [`crate::config::MapConfig::arena_capacity`]), slots
//! are handed out by bumping a high-water mark, and a slot's address never
//! changes for the lifetime of the map -- it is only ever re-initialized in
//! place once the allocator is certain no reader can still be using it.

use crate::node::Node;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct Arena<K, V> {
    slots: Box<[UnsafeCell<MaybeUninit<Node<K, V>>>]>,
    carved: AtomicU64,
}

// SAFETY: access to each slot is serialized by the allocator protocol (a
// slot is only ever live in one thread's hands between `carve`/`alloc` and
// the next `retire`), and cross-thread publication happens through the
// atomic `Link`/`ts` fields inside `Node` itself.
unsafe impl<K: Send, V: Send> Sync for Arena<K, V> {}

impl<K, V> Arena<K, V> {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || UnsafeCell::new(MaybeUninit::uninit()));
        Arena {
            slots: slots.into_boxed_slice(),
            carved: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// How many slots have ever been carved from virgin arena space. Used
    /// only for the allocator-reuse diagnostic; unrelated to how many slots
    /// are currently live.
    pub fn carved_count(&self) -> usize {
        self.carved.load(Ordering::Relaxed) as usize
    }

    /// Claims `count` never-before-used contiguous slots, returning the
    /// index of the first. `None` means the arena is exhausted.
    pub fn carve(&self, count: usize) -> Option<u32> {
        let mut cur = self.carved.load(Ordering::Relaxed);
        loop {
            let next = cur.checked_add(count as u64)?;
            if next > self.capacity() as u64 {
                return None;
            }
            match self.carved.compare_exchange_weak(
                cur,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(cur as u32),
                Err(actual) => cur = actual,
            }
        }
    }

    /// Initializes a freshly carved (never-before-used) slot.
    ///
    /// # Safety
    /// `slot` must have come from [`Arena::carve`] and not yet have been
    /// written to by anyone else.
    pub unsafe fn init(&self, slot: u32, node: Node<K, V>) {
        let cell = &self.slots[slot as usize];
        (*cell.get()).write(node);
    }

    /// Re-initializes a previously-retired slot, dropping whatever value it
    /// held.
    ///
    /// # Safety
    /// The caller must guarantee `slot` is not reachable by any concurrent
    /// reader -- i.e. the allocator has observed the reclamation epoch
    /// advance past this slot's retire epoch (see [`super::LocalAllocator`]).
    pub unsafe fn reinit(&self, slot: u32, node: Node<K, V>) {
        let cell = &self.slots[slot as usize];
        let ptr = (*cell.get()).as_mut_ptr();
        std::ptr::drop_in_place(ptr);
        ptr.write(node);
    }

    /// Borrows a slot that is known to be initialized (live, retired-but-not-
    /// yet-reused, or mid-reuse but not yet dropped).
    pub fn get(&self, slot: u32) -> &Node<K, V> {
        let cell = &self.slots[slot as usize];
        unsafe { (*cell.get()).assume_init_ref() }
    }
}

impl<K, V> Drop for Arena<K, V> {
    /// `MaybeUninit` suppresses drop glue, so every carved slot's `Node`
    /// (and its `K`/`V` fields) must be dropped explicitly here. Slots past
    /// `carved_count` were never written and must not be touched.
    fn drop(&mut self) {
        let carved = self.carved_count();
        for slot in &self.slots[..carved] {
            unsafe { std::ptr::drop_in_place((*slot.get()).as_mut_ptr()) };
        }
    }
}
