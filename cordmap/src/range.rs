//! The range-query engine: linearizable snapshot scans over the
//! version chains threaded through [`crate::node::Node::next_v`].
//!
//! `range_query` never mutates the list and never allocates; it only reads
//! `next`/`next_v`/`ts`, occasionally helping finalize a pending `ts` (which
//! *is* a CAS, but an idempotent, helpable one any reader may perform) and
//! occasionally bumping the timestamp epoch. [`read_version`] and
//! [`next_v_at`] are its two traversal primitives.

use crate::alloc::GlobalAllocator;
use crate::index::Index;
use crate::list::find;
use crate::node::Ts;
use cordmap_core::{Error, Result};
use std::sync::atomic::Ordering;

use crate::alloc::LocalAllocator;

/// Steps backward through `start`'s version chain until it finds the most
/// recent occupant whose snapshot timestamp is `<= query_ts`. `expected_ts`
/// is the `ts` the caller observed on `start` just before calling this --
/// used to detect that `start` hasn't been reused out from under us.
fn read_version<K, V>(
    global: &GlobalAllocator<K, V>,
    start: u32,
    query_ts: u64,
    expected_ts: Ts,
) -> Option<(u32, Ts)>
where
    K: Clone,
    V: Clone,
{
    let mut pred = start;
    let mut pred_expected_ts = expected_ts;
    loop {
        let pred_next_v = global.node(pred).next_v.load(Ordering::Acquire);
        if pred_next_v.is_null() {
            return None;
        }
        let version_gate = pred_next_v.epoch();
        let curr = pred_next_v.slot();

        if global.node(pred).ts(Ordering::Acquire) != pred_expected_ts {
            return None;
        }

        let curr_ts = global.node(curr).ts(Ordering::Acquire);
        if curr_ts.is_pending() || curr_ts.birth_epoch() > version_gate {
            return None;
        }

        if curr_ts.snapshot_ts() <= query_ts {
            return Some((curr, curr_ts));
        }

        pred = curr;
        pred_expected_ts = curr_ts;
    }
}

/// Advances one hop forward from `pred` (whose `ts` was `expected_pred_ts`),
/// returning the successor's version as of `query_ts` -- either its current
/// state directly, or a step back through its own version chain.
fn next_v_at<K, V>(
    global: &GlobalAllocator<K, V>,
    pred: u32,
    query_ts: u64,
    expected_pred_ts: Ts,
) -> Option<(u32, Ts)>
where
    K: Clone,
    V: Clone,
{
    let pred_next = global.node(pred).next.load(Ordering::Acquire);
    let version_gate = pred_next.epoch();
    let curr = pred_next.slot();

    if global.node(pred).ts(Ordering::Acquire) != expected_pred_ts {
        return None;
    }

    let curr_ts = global.node(curr).ts(Ordering::Acquire);
    if curr_ts.birth_epoch() > version_gate {
        return None;
    }
    if curr_ts.is_pending() {
        global.node(curr).finalize_ts(global.timestamp_epoch());
        return None;
    }
    if curr_ts.snapshot_ts() <= query_ts {
        return Some((curr, curr_ts));
    }

    read_version(global, curr, query_ts, curr_ts)
}

/// A fixed number of spin iterations with no side effect beyond CPU
/// relaxation hints, giving in-flight `insert`/`trim` calls a chance to
/// finalize their pending timestamps before the query samples its epoch.
fn spin_backoff(iterations: u32) {
    for _ in 0..iterations {
        std::hint::spin_loop();
    }
}

/// Returns every `(key, value)` with `lo <= key <= hi` as of a single instant
/// between the call and its return.
pub(crate) fn range_query<K, V>(
    global: &GlobalAllocator<K, V>,
    local: &mut LocalAllocator<K, V>,
    index: &dyn Index<K>,
    head: u32,
    lo: &K,
    hi: &K,
    backoff_spins: u32,
) -> Result<Vec<(K, V)>>
where
    K: Ord + Clone,
    V: Clone,
{
    if lo > hi {
        return Err(Error::InvalidRange);
    }

    let min_epoch = global.timestamp_epoch();
    spin_backoff(backoff_spins);

    'restart: loop {
        let query_ts = global.timestamp_epoch().saturating_sub(2);
        if query_ts < min_epoch {
            global.bump_timestamp_epoch(min_epoch);
            continue 'restart;
        }

        let located = find(global, local, index, head, lo)?;
        let observed_pred_ts = global.node(located.pred).ts(Ordering::Acquire);
        if !observed_pred_ts.is_valid(global.epoch()) {
            continue 'restart;
        }

        let (mut pred, mut pred_ts) = if observed_pred_ts.snapshot_ts() <= query_ts {
            (located.pred, observed_pred_ts)
        } else {
            match read_version(global, located.pred, query_ts, observed_pred_ts) {
                Some(found) => found,
                None => continue 'restart,
            }
        };

        if global.node(pred).key >= *lo {
            continue 'restart;
        }

        let (mut curr, mut curr_ts) = loop {
            let (slot, ts) = match next_v_at(global, pred, query_ts, pred_ts) {
                Some(found) => found,
                None => continue 'restart,
            };
            if global.node(slot).key < *lo {
                pred = slot;
                pred_ts = ts;
                continue;
            }
            break (slot, ts);
        };

        let mut results = Vec::new();
        loop {
            if global.node(curr).key > *hi {
                break;
            }
            if curr_ts.is_pending() || curr_ts.snapshot_ts() > query_ts {
                continue 'restart;
            }
            results.push((global.node(curr).key.clone(), global.node(curr).value.clone()));

            match next_v_at(global, curr, query_ts, curr_ts) {
                Some((slot, ts)) => {
                    curr = slot;
                    curr_ts = ts;
                }
                None => continue 'restart,
            }
        }

        return Ok(results);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::LocalAllocator;
    use crate::config::MapConfig;
    use crate::index::NoIndex;
    use crate::list::insert;
    use crate::node::{Link, Node};

    fn seed_sentinels(
        global: &GlobalAllocator<i64, &'static str>,
        local: &mut LocalAllocator<i64, &'static str>,
    ) -> u32 {
        let cur_epoch = global.epoch();
        let tail_slot = local
            .alloc(Node::new(i64::MAX, "", Link::NULL, Link::NULL, cur_epoch))
            .unwrap();
        global.node(tail_slot).finalize_ts(global.timestamp_epoch());
        let tail_link = Link::new(tail_slot, cur_epoch);
        let head_slot = local
            .alloc(Node::new(i64::MIN, "", tail_link, Link::NULL, cur_epoch))
            .unwrap();
        global.node(head_slot).finalize_ts(global.timestamp_epoch());
        head_slot
    }

    #[test]
    fn range_query_over_sequential_inserts() {
        let config = MapConfig::default();
        let global = GlobalAllocator::new(&config);
        let mut local = LocalAllocator::new(&global, &config);
        let head = seed_sentinels(&global, &mut local);
        let index = NoIndex;

        for (k, v) in [(1, "one"), (3, "three"), (5, "five"), (7, "seven")] {
            insert(&global, &mut local, &index, head, k, v, &"").unwrap();
        }

        let result = range_query(&global, &mut local, &index, head, &2, &6, 0).unwrap();
        assert_eq!(result, vec![(3, "three"), (5, "five")]);
    }

    #[test]
    fn range_query_rejects_inverted_bounds() {
        let config = MapConfig::default();
        let global = GlobalAllocator::new(&config);
        let mut local = LocalAllocator::new(&global, &config);
        let head = seed_sentinels(&global, &mut local);
        let index = NoIndex;

        let result = range_query(&global, &mut local, &index, head, &10, &1, 0);
        assert!(matches!(result, Err(Error::InvalidRange)));
    }
}
