//! Bounded, least-recently-used residency for leaf nodes.

use std::num::NonZeroUsize;

use lru::LruCache;

use super::node::LeafNode;
use crate::types::{PageId, Result, TreeError};

/// Storage behind the cache: reloads cold leaves and receives evicted ones.
pub trait LeafBacking {
    /// Decodes the leaf stored at `page`.
    fn load_leaf(&mut self, page: PageId) -> Result<LeafNode>;

    /// Writes `leaf` to its page.
    fn flush_leaf(&mut self, leaf: &LeafNode) -> Result<()>;

    /// Called once `page` has left the cache.
    fn evicted(&mut self, _page: PageId) {}
}

/// Resident leaves keyed by page id.
///
/// A bounded cache flushes its least recently used leaf before dropping it
/// so the leaf can be reloaded by id. An unbounded cache (no backing
/// storage) never evicts.
pub struct LeafCache {
    leaves: LruCache<PageId, LeafNode>,
    capacity: Option<NonZeroUsize>,
}

impl LeafCache {
    /// Cache holding at most `capacity` leaves.
    pub fn bounded(capacity: NonZeroUsize) -> Self {
        Self {
            leaves: LruCache::unbounded(),
            capacity: Some(capacity),
        }
    }

    /// Cache that never evicts.
    pub fn unbounded() -> Self {
        Self {
            leaves: LruCache::unbounded(),
            capacity: None,
        }
    }

    /// Maximum resident leaves, if bounded.
    pub fn capacity(&self) -> Option<NonZeroUsize> {
        self.capacity
    }

    /// Number of resident leaves.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// True when no leaf is resident.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Whether `page` is resident, without touching recency.
    pub fn contains(&self, page: PageId) -> bool {
        self.leaves.contains(&page)
    }

    /// Resident leaf for `page`, marking it most recently used.
    pub fn get_mut(&mut self, page: PageId) -> Option<&mut LeafNode> {
        self.leaves.get_mut(&page)
    }

    /// Resident leaf for `page`, leaving recency untouched.
    pub fn peek(&self, page: PageId) -> Option<&LeafNode> {
        self.leaves.peek(&page)
    }

    /// Mutable resident leaf for `page`, leaving recency untouched.
    pub fn peek_mut(&mut self, page: PageId) -> Option<&mut LeafNode> {
        self.leaves.peek_mut(&page)
    }

    /// Returns the leaf for `page`, loading it from `backing` on a miss.
    /// The boolean is true when the leaf was already resident.
    pub fn get_or_load(
        &mut self,
        page: PageId,
        backing: &mut dyn LeafBacking,
    ) -> Result<(&mut LeafNode, bool)> {
        let hit = self.leaves.contains(&page);
        if !hit {
            let leaf = backing.load_leaf(page)?;
            self.insert(leaf, backing)?;
        }
        let leaf = self
            .leaves
            .get_mut(&page)
            .ok_or(TreeError::Invariant("leaf vanished from cache after load"))?;
        Ok((leaf, hit))
    }

    /// Makes `leaf` resident, evicting the least recently used leaf first
    /// when the cache is full. Returns the evicted page, if any.
    pub fn insert(&mut self, leaf: LeafNode, backing: &mut dyn LeafBacking) -> Result<Option<PageId>> {
        let mut evicted = None;
        if let Some(capacity) = self.capacity {
            if !self.leaves.contains(&leaf.page) && self.leaves.len() >= capacity.get() {
                evicted = self.evict(backing)?;
            }
        }
        self.leaves.put(leaf.page, leaf);
        Ok(evicted)
    }

    /// Inserts without any eviction; only valid for unbounded caches.
    pub fn insert_resident(&mut self, leaf: LeafNode) -> Result<()> {
        if self.capacity.is_some() {
            return Err(TreeError::Invariant("bounded leaf cache requires backing storage"));
        }
        self.leaves.put(leaf.page, leaf);
        Ok(())
    }

    /// Flushes and drops the least recently used leaf.
    pub fn evict(&mut self, backing: &mut dyn LeafBacking) -> Result<Option<PageId>> {
        let Some((_, victim)) = self.leaves.peek_lru() else {
            return Ok(None);
        };
        if victim.dirty {
            backing.flush_leaf(victim)?;
        }
        let evicted = self.leaves.pop_lru().map(|(page, _)| page);
        if let Some(page) = evicted {
            backing.evicted(page);
        }
        Ok(evicted)
    }

    /// Writes every dirty resident leaf and marks it clean.
    pub fn flush_all(&mut self, backing: &mut dyn LeafBacking) -> Result<usize> {
        let mut written = 0;
        for (_, leaf) in self.leaves.iter_mut() {
            if leaf.dirty {
                backing.flush_leaf(leaf)?;
                leaf.dirty = false;
                written += 1;
            }
        }
        Ok(written)
    }

    /// Drops `page` from the cache without writing it.
    pub fn remove(&mut self, page: PageId) -> Option<LeafNode> {
        self.leaves.pop(&page)
    }
}
