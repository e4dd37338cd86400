//! The public facade: [`ConcurrentMap`] and the per-thread [`ThreadHandle`]
//! that realizes `init_thread`/`deinit_thread` as ownership rather than
//! a thread-id-indexed table -- a handle borrowed from the map for as long
//! as a thread is registered, dropped (or passed to
//! [`ConcurrentMap::deinit_thread`]) to unregister.
//!
//! Mirrors [`crate::index`]'s role for [`crate::list`]/[`crate::range`]:
//! this module wires the allocator, list, index, and range engine together
//! behind one type, the way `MemTable` wires a skip list and a size budget
//! behind one type for its callers.

use crate::alloc::{GlobalAllocator, LocalAllocator};
use crate::config::MapConfig;
use crate::index::{Index, IndexKind, NoIndex, SkipListIndex};
use crate::list;
use crate::node::{Link, Node};
use crate::range;
use cordmap_core::Result;
use std::sync::atomic::Ordering;

/// A thread's registration with a [`ConcurrentMap`]: its private slab
/// allocator state. Borrowed from the map for its lifetime, so the map
/// cannot be dropped while a thread is still registered with it.
///
/// Dropping a handle (directly, or via [`ConcurrentMap::deinit_thread`])
/// flushes its caches back to the global pool.
pub struct ThreadHandle<'m, K, V> {
    local: LocalAllocator<'m, K, V>,
}

/// A lock-free concurrent ordered map with linearizable range queries.
///
/// `K` must be totally ordered and admit the sentinels `key_min`/`key_max`
/// supplied at construction; `V` admits `no_value`, the sentinel returned in
/// place of "nothing here" (insert-if-absent's "wasn't already present",
/// erase's "wasn't there to remove"). Both are supplied once, at
/// construction, matching this crate's underlying algorithm: the map
/// never itself decides what "no value" looks like for an arbitrary `V`.
///
/// # Example
///
/// ```
/// use cordmap::map::ConcurrentMap;
///
/// let map: ConcurrentMap<i64, &str> = ConcurrentMap::new(i64::MIN, i64::MAX, "").unwrap();
/// let mut handle = map.init_thread();
///
/// assert_eq!(map.insert(&mut handle, 5, "five").unwrap(), "");
/// assert_eq!(map.find(&mut handle, &5).unwrap(), ("five", true));
/// assert_eq!(map.erase(&mut handle, &5).unwrap(), "five");
/// ```
pub struct ConcurrentMap<K, V> {
    global: GlobalAllocator<K, V>,
    head: u32,
    tail: u32,
    index: Box<dyn Index<K>>,
    no_value: V,
    config: MapConfig,
}

impl<K, V> ConcurrentMap<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    /// Constructs a map with [`MapConfig::default`].
    pub fn new(key_min: K, key_max: K, no_value: V) -> Result<Self> {
        Self::with_config(key_min, key_max, no_value, MapConfig::default())
    }

    /// Constructs a map with an explicit [`MapConfig`].
    pub fn with_config(key_min: K, key_max: K, no_value: V, config: MapConfig) -> Result<Self> {
        let global = GlobalAllocator::new(&config);

        let (head, tail) = {
            // A throwaway allocator just to carve the two sentinels. Its
            // remaining cached slots are not returned to the global pool
            // when it drops here -- a handful of arena slots spent once per
            // map, never on the hot path.
            let mut bootstrap = LocalAllocator::new(&global, &config);
            let cur_epoch = global.epoch();

            let tail = bootstrap.alloc(Node::new(
                key_max.clone(),
                no_value.clone(),
                Link::NULL,
                Link::NULL,
                cur_epoch,
            ))?;
            global.node(tail).finalize_ts(global.timestamp_epoch());

            let tail_link = Link::new(tail, cur_epoch);
            let head = bootstrap.alloc(Node::new(
                key_min.clone(),
                no_value.clone(),
                tail_link,
                Link::NULL,
                cur_epoch,
            ))?;
            global.node(head).finalize_ts(global.timestamp_epoch());

            (head, tail)
        };

        let index: Box<dyn Index<K>> = match config.index_kind {
            IndexKind::None => Box::new(NoIndex),
            IndexKind::SkipList => Box::new(SkipListIndex::new(
                config.skip_list_max_height,
                config.skip_list_branching_factor,
                config.index_frequency,
                key_min,
            )),
        };

        Ok(ConcurrentMap {
            global,
            head,
            tail,
            index,
            no_value,
            config,
        })
    }

    /// Binds a per-thread allocator. Must be called once by every thread
    /// before it calls any other operation on this map.
    pub fn init_thread(&self) -> ThreadHandle<'_, K, V> {
        ThreadHandle {
            local: LocalAllocator::new(&self.global, &self.config),
        }
    }

    /// Returns `handle`'s caches to the global pool. Equivalent to letting
    /// the handle go out of scope; spelled out for API parity with the
    /// `init_thread`/`deinit_thread` pairing.
    pub fn deinit_thread(&self, handle: ThreadHandle<'_, K, V>) {
        drop(handle);
    }

    /// True iff `key` is in the map at some point during the call.
    pub fn contains(&self, handle: &mut ThreadHandle<'_, K, V>, key: &K) -> Result<bool> {
        let located = list::find(&self.global, &mut handle.local, self.index.as_ref(), self.head, key)?;
        Ok(self.global.node(located.curr).key == *key)
    }

    /// Looks up `key`, returning `(value, true)` if present or
    /// `(no_value, false)` otherwise.
    pub fn find(&self, handle: &mut ThreadHandle<'_, K, V>, key: &K) -> Result<(V, bool)> {
        let located = list::find(&self.global, &mut handle.local, self.index.as_ref(), self.head, key)?;
        let node = self.global.node(located.curr);
        if node.key == *key {
            Ok((node.value.clone(), true))
        } else {
            Ok((self.no_value.clone(), false))
        }
    }

    /// Insert-if-absent: returns the prior value if `key` was already
    /// present, otherwise publishes `(key, value)` and returns `no_value`.
    pub fn insert(&self, handle: &mut ThreadHandle<'_, K, V>, key: K, value: V) -> Result<V> {
        list::insert(
            &self.global,
            &mut handle.local,
            self.index.as_ref(),
            self.head,
            key,
            value,
            &self.no_value,
        )
    }

    /// Removes `key` if present, returning its prior value, or `no_value` if
    /// it wasn't there.
    pub fn erase(&self, handle: &mut ThreadHandle<'_, K, V>, key: &K) -> Result<V> {
        list::erase(
            &self.global,
            &mut handle.local,
            self.index.as_ref(),
            self.head,
            key,
            &self.no_value,
        )
    }

    /// A linearizable snapshot of every `(key, value)` with
    /// `lo <= key <= hi`. Returns [`cordmap_core::Error::InvalidRange`]
    /// if `lo > hi`.
    pub fn range_query(
        &self,
        handle: &mut ThreadHandle<'_, K, V>,
        lo: &K,
        hi: &K,
    ) -> Result<Vec<(K, V)>> {
        range::range_query(
            &self.global,
            &mut handle.local,
            self.index.as_ref(),
            self.head,
            lo,
            hi,
            self.config.range_query_backoff_spins,
        )
    }

    /// An approximate count of live keys, found by walking the unmarked
    /// chain from `head` to `tail`. "Approximate" because concurrent
    /// mutation during the walk is not excluded; there is no snapshot
    /// guarantee here the way there is for `range_query`.
    pub fn len(&self) -> usize {
        let cur_epoch = self.global.epoch();
        let mut count = 0usize;
        let mut curr = self.global.node(self.head).next.load(Ordering::Acquire).slot();
        while curr != self.tail {
            let link = self.global.node(curr).next.load(Ordering::Acquire);
            if !link.is_marked() {
                count += 1;
            }
            if !self.global.node(curr).ts(Ordering::Acquire).is_valid(cur_epoch) {
                break;
            }
            curr = link.slot();
        }
        count
    }

    /// True iff [`ConcurrentMap::len`] is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(any(test, feature = "debug-diagnostics"))]
impl<K, V> ConcurrentMap<K, V>
where
    K: Ord + Clone + Copy + Into<i128>,
    V: Clone,
{
    /// Sums every live key in the map. Requires no concurrent access;
    /// exposed here only for tests and the `debug-diagnostics` feature,
    /// never on a production hot path.
    pub fn debug_key_sum(&self) -> i128 {
        let mut sum = 0i128;
        let mut curr = self.global.node(self.head).next.load(Ordering::Acquire).slot();
        while curr != self.tail {
            let link = self.global.node(curr).next.load(Ordering::Acquire);
            if !link.is_marked() {
                sum += self.global.node(curr).key.into();
            }
            curr = link.slot();
        }
        sum
    }
}

impl<K, V> ConcurrentMap<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    /// How many arena slots have ever been carved virgin, across the whole
    /// map's lifetime. Exposed for the allocator-reuse benchmark and test:
    /// a bounded value after many insert/erase cycles is what demonstrates
    /// retired slots are actually being recycled rather than the arena
    /// growing without bound.
    #[doc(hidden)]
    pub fn debug_slots_carved(&self) -> usize {
        self.global.slots_carved()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_scenario_insert_range_query() {
        let map: ConcurrentMap<i64, &str> = ConcurrentMap::new(i64::MIN, i64::MAX, "").unwrap();
        let mut handle = map.init_thread();

        for (k, v) in [(1, "a"), (3, "b"), (5, "c"), (7, "d")] {
            map.insert(&mut handle, k, v).unwrap();
        }

        let result = map.range_query(&mut handle, &2, &6).unwrap();
        assert_eq!(result, vec![(3, "b"), (5, "c")]);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn duplicate_insert_returns_existing_value() {
        let map: ConcurrentMap<i64, &str> = ConcurrentMap::new(i64::MIN, i64::MAX, "").unwrap();
        let mut handle = map.init_thread();

        assert_eq!(map.insert(&mut handle, 42, "a").unwrap(), "");
        assert_eq!(map.insert(&mut handle, 42, "b").unwrap(), "a");
        assert_eq!(map.find(&mut handle, &42).unwrap(), ("a", true));
    }

    #[test]
    fn erase_unknown_key_on_empty_map() {
        let map: ConcurrentMap<i64, &str> = ConcurrentMap::new(i64::MIN, i64::MAX, "").unwrap();
        let mut handle = map.init_thread();

        assert_eq!(map.erase(&mut handle, &9).unwrap(), "");
        assert_eq!(map.len(), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn insert_then_erase_updates_len() {
        let map: ConcurrentMap<i64, &str> = ConcurrentMap::new(i64::MIN, i64::MAX, "").unwrap();
        let mut handle = map.init_thread();

        map.insert(&mut handle, 1, "a").unwrap();
        map.insert(&mut handle, 2, "b").unwrap();
        assert_eq!(map.len(), 2);

        map.erase(&mut handle, &1).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.debug_key_sum(), 2);
    }

    #[test]
    fn deinit_thread_is_a_valid_rebind_point() {
        let map: ConcurrentMap<i64, &str> = ConcurrentMap::new(i64::MIN, i64::MAX, "").unwrap();
        let mut handle = map.init_thread();
        map.insert(&mut handle, 1, "a").unwrap();
        map.deinit_thread(handle);

        let mut handle = map.init_thread();
        assert_eq!(map.find(&mut handle, &1).unwrap(), ("a", true));
    }
}
