//! Configuration for the concurrent ordered map

use crate::index::IndexKind;

/// Default capacity of the backing arena when [`MapConfig::max_resident_nodes`]
/// is left at `None`. Large enough for realistic benchmark workloads without
/// a multi-gigabyte footprint.
const DEFAULT_ARENA_CAPACITY: usize = 1 << 20;

/// Tunable parameters for [`crate::map::ConcurrentMap`].
///
/// This struct exists because the core algorithm leaves several constants
/// as open tuning questions -- cache size, number
/// of per-thread caches, the bounded-spin amount before a range query's
/// first attempt, the index accelerator to use. `MapConfig` collects them in
/// one place the way a storage engine's config struct collects its own.
///
/// # Example
///
/// ```
/// use cordmap::config::MapConfig;
///
/// let config = MapConfig {
///     num_threads: 8,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Number of threads that will call `init_thread`. Used only to size
    /// initial per-thread structures; the map itself does not limit thread
    /// count.
    pub num_threads: usize,

    /// Entries held per [`crate::alloc::AllocCache`] (~64 slots by default).
    pub entries_per_cache: usize,

    /// Number of alloc caches a freshly-initialized thread starts with.
    pub alloc_caches_per_thread: usize,

    /// Number of free caches a thread keeps locally before pushing full ones
    /// to the global stack.
    pub free_caches_per_thread: usize,

    /// Total capacity of the backing node arena. Resolves the open question
    /// on the allocator's upper bound: `None` sizes the arena at
    /// [`DEFAULT_ARENA_CAPACITY`] (large, but finite -- allocator exhaustion
    /// remains a possible, if unlikely, fatal condition); `Some(n)` sizes it
    /// exactly to `n` slots.
    pub max_resident_nodes: Option<usize>,

    /// Number of iterations of the bounded backoff spin `range_query`
    /// performs before its first epoch check.
    pub range_query_backoff_spins: u32,

    /// Which accelerator structure sits in front of the ordered list.
    pub index_kind: IndexKind,

    /// Max tower height for the skip-list index, when selected.
    pub skip_list_max_height: usize,

    /// Branching factor (`1 / p`) for skip-list level selection.
    pub skip_list_branching_factor: u32,

    /// Density heuristic for skip-list shortcut insertion: a newly
    /// trimmed/inserted node's shortcut is skipped unless its position
    /// counter is a multiple of this value. `1` shortcuts every node.
    pub index_frequency: u64,
}

impl MapConfig {
    pub(crate) fn arena_capacity(&self) -> usize {
        self.max_resident_nodes.unwrap_or(DEFAULT_ARENA_CAPACITY)
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            num_threads: 1,
            entries_per_cache: 64,
            alloc_caches_per_thread: 2,
            free_caches_per_thread: 1,
            max_resident_nodes: None,
            range_query_backoff_spins: 1000,
            index_kind: IndexKind::SkipList,
            skip_list_max_height: 12,
            skip_list_branching_factor: 4,
            index_frequency: 4,
        }
    }
}
