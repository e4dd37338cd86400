//! The ordered linked structure: `find`, `trim`, `insert`, `erase`.
//!
//! These are free functions rather than methods on a type that owns
//! everything they touch, because the same `GlobalAllocator` and
//! `LocalAllocator` are also shared by [`crate::range`] -- there is no single
//! receiver that naturally owns "the list plus its allocator plus its
//! index", only a bundle of collaborators each operation borrows from.
//! [`crate::map::ConcurrentMap`] is what actually owns the bundle.
//!
//! Every restart-on-contention point here is a `continue 'restart` out of a
//! labeled loop, modeling goto-based retry as explicit looping rather than exceptions.

use crate::alloc::{GlobalAllocator, LocalAllocator};
use crate::index::Index;
use crate::node::{Link, Node};
use cordmap_core::Result;
use std::sync::atomic::Ordering;

/// The result of a successful [`find`]: a predecessor/successor pair with no
/// intervening MARK/FLAG, plus the version tag `pred.next` carried when it
/// pointed at `curr` -- the token `insert`/`erase` CAS against.
pub(crate) struct Located {
    pub pred: u32,
    pub pred_version: u64,
    pub curr: u32,
}

/// Locates, for `key`, a predecessor `pred` and the first node `curr` with
/// `curr.key >= key`.
pub(crate) fn find<K, V>(
    global: &GlobalAllocator<K, V>,
    local: &mut LocalAllocator<K, V>,
    index: &dyn Index<K>,
    head: u32,
    key: &K,
) -> Result<Located>
where
    K: Ord + Clone,
    V: Clone,
{
    'restart: loop {
        let cur_epoch = global.epoch();

        // The index hands back a raw slot, possibly stale: keep re-querying
        // it (narrowing the probe key to whatever predecessor it last
        // returned) until it lands on a predecessor whose own `ts` is
        // still valid and whose `next` is neither MARK'd nor FLAG'd. A
        // marked/flagged predecessor is mid-deletion and unsafe to CAS
        // against; an invalid `ts` means the slot may already have been
        // reused for something else entirely.
        let mut probe_key = key.clone();
        let (mut pred, pred_next_raw) = loop {
            let candidate = index.find_pred(&probe_key).unwrap_or(head);
            probe_key = global.node(candidate).key.clone();
            if !global.node(candidate).ts(Ordering::Acquire).is_valid(cur_epoch) {
                continue 'restart;
            }
            let candidate_next = global.node(candidate).next.load(Ordering::Acquire);
            if candidate_next.is_marked() || candidate_next.is_flagged() {
                continue;
            }
            break (candidate, candidate_next);
        };
        if !pred_next_raw.is_valid(cur_epoch) {
            continue 'restart;
        }
        let mut version = pred_next_raw.epoch();
        let mut pred_next = pred_next_raw.slot();
        let mut curr = pred_next;

        loop {
            loop {
                let curr_link = global.node(curr).next.load(Ordering::Acquire);
                if !curr_link.is_marked() {
                    break;
                }
                if !global.node(curr).ts(Ordering::Acquire).is_valid(cur_epoch) {
                    continue 'restart;
                }
                curr = curr_link.slot();
            }

            if !global.node(curr).ts(Ordering::Acquire).is_valid(cur_epoch) {
                continue 'restart;
            }

            if global.node(curr).key >= *key {
                let pred_ts = global.node(pred).ts(Ordering::Acquire);
                if pred_ts.is_pending() {
                    let finalized = global.node(pred).finalize_ts(global.timestamp_epoch());
                    if !finalized.is_valid(cur_epoch) {
                        continue 'restart;
                    }
                }
                break;
            }

            let curr_link = global.node(curr).next.load(Ordering::Acquire);
            if curr_link.is_flagged() {
                if !global.node(curr).ts(Ordering::Acquire).is_valid(cur_epoch) {
                    continue 'restart;
                }
                curr = curr_link.slot();
                continue;
            }

            pred = curr;
            let new_pred_next_raw = global.node(pred).next.load(Ordering::Acquire);
            if !new_pred_next_raw.is_valid(cur_epoch)
                || new_pred_next_raw.is_marked()
                || new_pred_next_raw.is_flagged()
            {
                continue 'restart;
            }
            version = new_pred_next_raw.epoch();
            pred_next = new_pred_next_raw.slot();
            curr = pred_next;
        }

        if pred_next != curr {
            match trim(global, local, index, pred, pred_next, version)? {
                Some(new_link) => {
                    curr = new_link.slot();
                    version = new_link.epoch();
                    let pred_link_now = global.node(pred).next.load(Ordering::Acquire);
                    if pred_link_now != new_link || global.node(curr).key < *key {
                        continue 'restart;
                    }
                }
                None => continue 'restart,
            }
        } else {
            let curr_ts = global.node(curr).ts(Ordering::Acquire);
            if curr_ts.is_pending() {
                let finalized = global.node(curr).finalize_ts(global.timestamp_epoch());
                if !finalized.is_valid(cur_epoch) {
                    continue 'restart;
                }
            }
        }

        return Ok(Located {
            pred,
            pred_version: version,
            curr,
        });
    }
}

/// Replaces a MARKed run starting at `curr` (reached via `pred`, whose `next`
/// carried `pred_version` when it pointed at `curr`) with a fresh copy of the
/// first live successor. `Ok(None)` means the caller should restart;
/// `Err` only for a fatal allocator condition.
pub(crate) fn trim<K, V>(
    global: &GlobalAllocator<K, V>,
    local: &mut LocalAllocator<K, V>,
    index: &dyn Index<K>,
    pred: u32,
    curr: u32,
    pred_version: u64,
) -> Result<Option<Link>>
where
    K: Ord + Clone,
    V: Clone,
{
    let curr_link = global.node(curr).next.load(Ordering::Acquire);
    if !curr_link.is_marked() {
        return Ok(None);
    }

    let cur_epoch = global.epoch();
    let mut succ = curr_link.slot();
    let mut succ_next = global.node(succ).next.load(Ordering::Acquire);
    let mut succ_ts = global.node(succ).ts(Ordering::Acquire);
    if !succ_ts.is_valid(cur_epoch) {
        return Ok(None);
    }

    while succ_next.is_marked() {
        succ = succ_next.slot();
        succ_next = global.node(succ).next.load(Ordering::Acquire);
        succ_ts = global.node(succ).ts(Ordering::Acquire);
        if !succ_ts.is_valid(cur_epoch) {
            return Ok(None);
        }
    }

    if succ_ts.is_pending() {
        succ_ts = global.node(succ).finalize_ts(global.timestamp_epoch());
        if !succ_ts.is_valid(cur_epoch) {
            return Ok(None);
        }
        let pred_link = global.node(pred).next.load(Ordering::Acquire);
        if pred_link != Link::new(curr, pred_version) {
            return Ok(None);
        }
    }

    if !global.node(succ).flag(succ_next) {
        let now_link = global.node(succ).next.load(Ordering::Acquire);
        let now_ts = global.node(succ).ts(Ordering::Acquire);
        if !(now_link.is_flagged() && now_ts == succ_ts) {
            return Ok(None);
        }
    }

    let succ_key = global.node(succ).key.clone();
    let succ_value = global.node(succ).value.clone();
    let succ_tag_node = Node::new(
        succ_key.clone(),
        succ_value,
        succ_next.unmarked(),
        Link::new(curr, cur_epoch),
        cur_epoch,
    );
    let succ_tag_slot = local.alloc(succ_tag_node)?;
    let new_link = Link::new(succ_tag_slot, cur_epoch);
    let expected = Link::new(curr, pred_version);

    match global.node(pred).next.compare_exchange(expected, new_link) {
        Ok(_) => {
            global.node(succ_tag_slot).finalize_ts(global.timestamp_epoch());
            index.insert(succ_key, succ_tag_slot);

            let mut deleted = curr;
            loop {
                let deleted_next = global.node(deleted).next.load(Ordering::Acquire).slot();
                index.remove(&global.node(deleted).key);
                local.retire(deleted);
                if deleted == succ {
                    break;
                }
                deleted = deleted_next;
            }

            Ok(Some(new_link))
        }
        Err(_) => {
            local.return_unused(succ_tag_slot);
            Ok(None)
        }
    }
}

/// Insert-if-absent: returns the prior value if `key` was already
/// present, otherwise publishes a new node and returns `no_value`.
pub(crate) fn insert<K, V>(
    global: &GlobalAllocator<K, V>,
    local: &mut LocalAllocator<K, V>,
    index: &dyn Index<K>,
    head: u32,
    key: K,
    value: V,
    no_value: &V,
) -> Result<V>
where
    K: Ord + Clone,
    V: Clone,
{
    loop {
        let located = find(global, local, index, head, &key)?;
        if global.node(located.curr).key == key {
            let result = global.node(located.curr).value.clone();
            if !global
                .node(located.curr)
                .ts(Ordering::Acquire)
                .is_valid(global.epoch())
            {
                continue;
            }
            return Ok(result);
        }

        let cur_epoch = global.epoch();
        let seed_link = Link::new(located.curr, cur_epoch);
        let new_node = Node::new(key.clone(), value.clone(), seed_link, seed_link, cur_epoch);
        let new_slot = local.alloc(new_node)?;
        let expected = Link::new(located.curr, located.pred_version);
        let new_link = Link::new(new_slot, cur_epoch);

        match global.node(located.pred).next.compare_exchange(expected, new_link) {
            Ok(_) => {
                global.node(new_slot).finalize_ts(global.timestamp_epoch());
                index.insert(key, new_slot);
                return Ok(no_value.clone());
            }
            Err(_) => {
                local.return_unused(new_slot);
                continue;
            }
        }
    }
}

/// Removes `key` if present: MARKs the node, then trims it out,
/// falling back to another `find` if the trim this thread attempts loses a
/// race (a concurrent trimmer may have already done the physical unlink).
pub(crate) fn erase<K, V>(
    global: &GlobalAllocator<K, V>,
    local: &mut LocalAllocator<K, V>,
    index: &dyn Index<K>,
    head: u32,
    key: &K,
    no_value: &V,
) -> Result<V>
where
    K: Ord + Clone,
    V: Clone,
{
    loop {
        let located = find(global, local, index, head, key)?;
        if global.node(located.curr).key != *key {
            return Ok(no_value.clone());
        }
        let result = global.node(located.curr).value.clone();
        let expected_next = global.node(located.curr).next.load(Ordering::Acquire);
        if !global.node(located.curr).mark(expected_next) {
            continue;
        }
        if trim(global, local, index, located.pred, located.curr, located.pred_version)?.is_none()
        {
            let _ = find(global, local, index, head, key)?;
        }
        return Ok(result);
    }
}
