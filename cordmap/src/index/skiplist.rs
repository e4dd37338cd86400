//! A lock-free skip list of `key -> slot` shortcuts.
//!
//! Towers of `crossbeam_epoch::Atomic` pointers, `rand`-driven level
//! selection guarded by a `parking_lot::Mutex`, and a `find`-then-CAS insert
//! loop. It stores shortcuts instead of values and has no notion of
//! history or multi-version lookups: only "the most recently inserted
//! shortcut for this key".
//!
//! Deletion is a tombstone (`NULL_SLOT`) rather than a physical unlink: an
//! index miss is exactly as acceptable as a hit on a now-tombstoned entry,
//! since `find_pred` results are advisory.

use super::Index;
use crate::node::NULL_SLOT;
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use parking_lot::Mutex;
use rand::Rng;
use std::cmp::Ordering;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};

struct IndexNode<K> {
    key: K,
    slot: AtomicU32,
    next: Vec<Atomic<IndexNode<K>>>,
}

impl<K> IndexNode<K> {
    fn new(key: K, slot: u32, height: usize) -> Self {
        let mut next = Vec::with_capacity(height);
        next.resize_with(height, Atomic::null);
        IndexNode {
            key,
            slot: AtomicU32::new(slot),
            next,
        }
    }
}

/// A lock-free skip-list accelerator over `K -> slot` shortcuts.
pub struct SkipListIndex<K> {
    head: Atomic<IndexNode<K>>,
    height: AtomicUsize,
    rng: Mutex<rand::rngs::ThreadRng>,
    max_height: usize,
    branching_factor: u32,
    frequency: u64,
    insert_calls: AtomicU64,
}

impl<K> SkipListIndex<K>
where
    K: Ord + Clone,
{
    pub fn new(max_height: usize, branching_factor: u32, frequency: u64, head_key: K) -> Self {
        let head = IndexNode::new(head_key, NULL_SLOT, max_height);
        SkipListIndex {
            head: Atomic::new(head),
            height: AtomicUsize::new(1),
            rng: Mutex::new(rand::thread_rng()),
            max_height,
            branching_factor: branching_factor.max(2),
            frequency: frequency.max(1),
            insert_calls: AtomicU64::new(0),
        }
    }

    fn random_height(&self) -> usize {
        let mut height = 1;
        let mut rng = self.rng.lock();
        while height < self.max_height && rng.gen_ratio(1, self.branching_factor) {
            height += 1;
        }
        height
    }

    /// Finds, for `key`, the predecessor/successor pair at every level below
    /// the current max height. Returns whether an exact key match was found
    /// at level 0.
    fn find<'g>(
        &self,
        key: &K,
        preds: &mut [Shared<'g, IndexNode<K>>],
        succs: &mut [Shared<'g, IndexNode<K>>],
        guard: &'g Guard,
    ) -> bool {
        let mut pred = self.head.load(AtomicOrdering::Acquire, guard);

        for level in (0..self.height.load(AtomicOrdering::Acquire)).rev() {
            let pred_ref = unsafe { pred.as_ref() }.expect("head is never null");
            let mut curr = pred_ref.next[level].load(AtomicOrdering::Acquire, guard);

            while let Some(curr_ref) = unsafe { curr.as_ref() } {
                match curr_ref.key.cmp(key) {
                    Ordering::Less => {
                        pred = curr;
                        curr = curr_ref.next[level].load(AtomicOrdering::Acquire, guard);
                    }
                    _ => break,
                }
            }

            if level < preds.len() {
                preds[level] = pred;
                succs[level] = curr;
            }
        }

        match unsafe { succs[0].as_ref() } {
            Some(succ) => succ.key == *key,
            None => false,
        }
    }
}

impl<K> Index<K> for SkipListIndex<K>
where
    K: Ord + Clone,
{
    fn insert(&self, key: K, slot: u32) {
        let calls = self.insert_calls.fetch_add(1, AtomicOrdering::Relaxed);
        if calls % self.frequency != 0 {
            // Density heuristic: most inserts don't get a shortcut.
            return;
        }

        let guard = &epoch::pin();
        let height = self.random_height();

        loop {
            let current_height = self.height.load(AtomicOrdering::Acquire);
            if height <= current_height {
                break;
            }
            if self
                .height
                .compare_exchange(
                    current_height,
                    height,
                    AtomicOrdering::Release,
                    AtomicOrdering::Acquire,
                )
                .is_ok()
            {
                break;
            }
        }

        let mut preds = vec![Shared::null(); height];
        let mut succs = vec![Shared::null(); height];

        loop {
            if self.find(&key, &mut preds, &mut succs, guard) {
                // Already shortcut; overwrite with the newer slot.
                if let Some(existing) = unsafe { succs[0].as_ref() } {
                    existing.slot.store(slot, AtomicOrdering::Release);
                }
                return;
            }

            let new_node = Owned::new(IndexNode::new(key.clone(), slot, height));
            for i in 0..height {
                new_node.deref().next[i].store(succs[i], AtomicOrdering::Relaxed);
            }
            let new_node_shared = new_node.into_shared(guard);

            let pred0 = unsafe { preds[0].as_ref() }.expect("head is never null");
            match pred0.next[0].compare_exchange(
                succs[0],
                new_node_shared,
                AtomicOrdering::Release,
                AtomicOrdering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    for i in 1..height {
                        loop {
                            let pred_i = unsafe { preds[i].as_ref() }.expect("head is never null");
                            match pred_i.next[i].compare_exchange(
                                succs[i],
                                new_node_shared,
                                AtomicOrdering::Release,
                                AtomicOrdering::Acquire,
                                guard,
                            ) {
                                Ok(_) => break,
                                Err(_) => {
                                    self.find(&key, &mut preds, &mut succs, guard);
                                }
                            }
                        }
                    }
                    return;
                }
                Err(_) => continue,
            }
        }
    }

    fn remove(&self, key: &K) {
        let guard = &epoch::pin();
        let mut preds = vec![Shared::null(); 1];
        let mut succs = vec![Shared::null(); 1];
        if self.find(key, &mut preds, &mut succs, guard) {
            if let Some(node) = unsafe { succs[0].as_ref() } {
                node.slot.store(NULL_SLOT, AtomicOrdering::Release);
            }
        }
    }

    fn find_pred(&self, key: &K) -> Option<u32> {
        let guard = &epoch::pin();
        let mut preds = vec![Shared::null(); 1];
        let mut succs = vec![Shared::null(); 1];
        self.find(key, &mut preds, &mut succs, guard);
        let pred = unsafe { preds[0].as_ref() }?;
        let slot = pred.slot.load(AtomicOrdering::Acquire);
        if slot == NULL_SLOT {
            None
        } else {
            Some(slot)
        }
    }
}

impl<K> Drop for SkipListIndex<K> {
    fn drop(&mut self) {
        let guard = &epoch::pin();
        let mut curr = self.head.load(AtomicOrdering::Acquire, guard);
        while let Some(curr_ref) = unsafe { curr.as_ref() } {
            let next = curr_ref.next[0].load(AtomicOrdering::Acquire, guard);
            unsafe {
                guard.defer_destroy(curr);
            }
            curr = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortcuts_resolve_to_predecessors() {
        let idx: SkipListIndex<i64> = SkipListIndex::new(8, 4, 1, i64::MIN);
        idx.insert(10, 1);
        idx.insert(20, 2);
        idx.insert(30, 3);

        assert_eq!(idx.find_pred(&25), Some(2));
        assert_eq!(idx.find_pred(&5), None);
    }

    #[test]
    fn remove_tombstones_the_shortcut() {
        let idx: SkipListIndex<i64> = SkipListIndex::new(8, 4, 1, i64::MIN);
        idx.insert(10, 1);
        idx.remove(&10);
        assert_eq!(idx.find_pred(&15), None);
    }

    #[test]
    fn density_filter_skips_most_inserts() {
        let idx: SkipListIndex<i64> = SkipListIndex::new(8, 4, 4, i64::MIN);
        for i in 0..8 {
            idx.insert(i, i as u32);
        }
        // Only calls 0 and 4 (every 4th) should have been shortcut.
        assert_eq!(idx.find_pred(&1), Some(0));
        assert_eq!(idx.find_pred(&3), Some(0));
    }
}
