//! The optional index accelerator.
//!
//! The index is a pure search-acceleration collaborator: `find` always
//! falls back to walking the ordered list itself, so a stale or failed
//! index operation can never produce a wrong answer, only a slower one.
//! Two variants are implemented, selected via [`crate::config::MapConfig::index_kind`]:
//! [`NoIndex`] (the list is walked from `head` every time) and
//! [`SkipListIndex`] (a small lock-free skip list of key -> slot shortcuts).
//!
//! A third variant, an external-BST index, is not implemented here (see
//! DESIGN.md's Open Question resolutions) -- `Index` is the seam a future
//! variant would plug into.

mod skiplist;

pub use skiplist::SkipListIndex;

/// Which index accelerator a map should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// No accelerator; every `find` starts its descent at `head`.
    None,
    /// A skip-list of key -> slot shortcuts.
    SkipList,
}

/// The three-operation capability set an index accelerator must provide.
///
/// All three are advisory: a caller that gets `None` from `find_pred`, or
/// whose `insert`/`remove` is silently dropped, must still produce a correct
/// result by falling back to the list itself.
pub trait Index<K>: Send + Sync {
    /// Records that `key` currently shortcuts to `slot`. May no-op.
    fn insert(&self, key: K, slot: u32);

    /// Forgets any shortcut for `key`. May no-op.
    fn remove(&self, key: &K);

    /// Returns some slot whose key is `< key`, to start a list descent from,
    /// or `None` to mean "start from head".
    fn find_pred(&self, key: &K) -> Option<u32>;
}

/// The no-op accelerator: every `find_pred` returns `None`, so callers
/// always descend from `head`.
pub struct NoIndex;

impl<K> Index<K> for NoIndex {
    fn insert(&self, _key: K, _slot: u32) {}
    fn remove(&self, _key: &K) {}
    fn find_pred(&self, _key: &K) -> Option<u32> {
        None
    }
}
