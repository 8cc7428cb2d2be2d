//! Page binding and leaf residency for the tree.
//!
//! Every node gets its page identity here: a real page from the store when
//! disk-backed, or the next synthetic id otherwise. Leaf access goes through
//! the [`LeafCache`], which reloads and flushes through [`StoreBacking`].

use std::num::NonZeroUsize;
use std::sync::Arc;

use tracing::trace;

use super::cache::{LeafBacking, LeafCache};
use super::codec::{self, RawChildren, RawNode};
use super::node::{InnerNode, LeafNode};
use super::options::{BTreeOptions, Layout};
use super::stats::BTreeStats;
use crate::primitives::pager::PageStore;
use crate::types::{PageId, Result, TreeError};

pub(crate) struct NodeStore {
    store: Option<Box<dyn PageStore>>,
    cache: LeafCache,
    next_synthetic: u64,
    layout: Option<Layout>,
    page_size: usize,
    reserve: usize,
    stats: Arc<BTreeStats>,
}

impl NodeStore {
    /// Memory-only node store: synthetic page ids, leaves never evicted.
    pub(crate) fn in_memory(options: &BTreeOptions) -> Self {
        Self {
            store: None,
            cache: LeafCache::unbounded(),
            next_synthetic: 1,
            layout: None,
            page_size: options.page_size,
            reserve: options.node_reserve,
            stats: Arc::new(BTreeStats::default()),
        }
    }

    /// Disk-backed node store using `store`'s page size.
    pub(crate) fn backed(store: Box<dyn PageStore>, options: &BTreeOptions) -> Result<Self> {
        let capacity = NonZeroUsize::new(options.leaf_cache_capacity)
            .ok_or(TreeError::InvalidConfig("leaf cache capacity must be non-zero"))?;
        Ok(Self {
            page_size: store.page_size(),
            store: Some(store),
            cache: LeafCache::bounded(capacity),
            next_synthetic: 1,
            layout: None,
            reserve: options.node_reserve,
            stats: Arc::new(BTreeStats::default()),
        })
    }

    pub(crate) fn is_backed(&self) -> bool {
        self.store.is_some()
    }

    pub(crate) fn page_size(&self) -> usize {
        self.page_size
    }

    pub(crate) fn stats(&self) -> &Arc<BTreeStats> {
        &self.stats
    }

    pub(crate) fn cache(&self) -> &LeafCache {
        &self.cache
    }

    pub(crate) fn layout_opt(&self) -> Option<Layout> {
        self.layout
    }

    pub(crate) fn layout(&self) -> Result<Layout> {
        self.layout
            .ok_or(TreeError::Invariant("entry layout used before the first insert"))
    }

    /// Fixes entry widths for the lifetime of the tree.
    pub(crate) fn fix_layout(&mut self, key_len: usize, value_len: usize) -> Result<Layout> {
        if self.layout.is_some() {
            return Err(TreeError::Invariant("entry layout fixed twice"));
        }
        let layout = Layout::new(key_len, value_len, self.page_size, self.reserve)?;
        self.layout = Some(layout);
        Ok(layout)
    }

    /// Adopts widths read back from storage.
    pub(crate) fn restore_layout(&mut self, key_size: u8, value_size: u8) -> Result<Layout> {
        let layout = Layout::new(
            key_size as usize,
            value_size as usize,
            self.page_size,
            self.reserve,
        )
        .map_err(|_| TreeError::CorruptNode("stored entry widths do not fit the page"))?;
        self.layout = Some(layout);
        Ok(layout)
    }

    /// Binds a new node to a page.
    pub(crate) fn allocate_page(&mut self) -> Result<PageId> {
        match self.store.as_deref_mut() {
            Some(store) => store.allocate_page(),
            None => {
                let page = PageId(self.next_synthetic);
                self.next_synthetic += 1;
                Ok(page)
            }
        }
    }

    /// Resolves a leaf, loading it on a cache miss, and records the inner
    /// node it was reached from.
    pub(crate) fn leaf_mut(&mut self, page: PageId, parent: Option<PageId>) -> Result<&mut LeafNode> {
        let Self {
            store,
            cache,
            layout,
            stats,
            ..
        } = self;
        let leaf = match store.as_deref_mut() {
            Some(store) => {
                let layout =
                    layout.ok_or(TreeError::Invariant("leaf access before entry layout is known"))?;
                let mut backing = StoreBacking {
                    store,
                    layout,
                    stats,
                };
                let (leaf, hit) = cache.get_or_load(page, &mut backing)?;
                if hit {
                    stats.inc_cache_hits();
                }
                leaf
            }
            None => {
                let leaf = cache
                    .get_mut(page)
                    .ok_or(TreeError::Invariant("leaf missing from memory-only tree"))?;
                stats.inc_cache_hits();
                leaf
            }
        };
        leaf.parent = parent;
        Ok(leaf)
    }

    /// Updates the parent of a resident leaf without paging anything in.
    pub(crate) fn set_parent_if_resident(&mut self, page: PageId, parent: Option<PageId>) {
        if let Some(leaf) = self.cache.peek_mut(page) {
            leaf.parent = parent;
        }
    }

    /// Parent recorded on `page`, or `None` when the leaf is not resident.
    pub(crate) fn resident_parent(&self, page: PageId) -> Option<Option<PageId>> {
        self.cache.peek(page).map(|leaf| leaf.parent)
    }

    /// Resident leaf for `page`; never loads or evicts.
    pub(crate) fn resident_leaf_mut(&mut self, page: PageId) -> Result<&mut LeafNode> {
        self.cache
            .peek_mut(page)
            .ok_or(TreeError::Invariant("leaf expected to be resident"))
    }

    /// Drops a resident leaf without writing it.
    pub(crate) fn discard_leaf(&mut self, page: PageId) -> Result<LeafNode> {
        self.cache
            .remove(page)
            .ok_or(TreeError::Invariant("discarded leaf was not resident"))
    }

    /// Makes a newly created leaf resident.
    pub(crate) fn insert_leaf(&mut self, leaf: LeafNode) -> Result<()> {
        let Self {
            store,
            cache,
            layout,
            stats,
            ..
        } = self;
        match store.as_deref_mut() {
            Some(store) => {
                let layout =
                    layout.ok_or(TreeError::Invariant("leaf created before entry layout is known"))?;
                let mut backing = StoreBacking {
                    store,
                    layout,
                    stats,
                };
                cache.insert(leaf, &mut backing)?;
                Ok(())
            }
            None => cache.insert_resident(leaf),
        }
    }

    /// Writes every dirty resident leaf.
    pub(crate) fn flush_leaves(&mut self) -> Result<usize> {
        let Self {
            store,
            cache,
            layout,
            stats,
            ..
        } = self;
        let (Some(store), Some(layout)) = (store.as_deref_mut(), *layout) else {
            return Ok(0);
        };
        let mut backing = StoreBacking {
            store,
            layout,
            stats,
        };
        cache.flush_all(&mut backing)
    }

    /// Writes an inner node to its page.
    pub(crate) fn write_inner(&mut self, node: &InnerNode) -> Result<()> {
        let layout = self.layout()?;
        let Some(store) = self.store.as_deref_mut() else {
            return Ok(());
        };
        let page = codec::encode_inner(node, layout.key_size)?;
        store.write_page(node.page, &page)
    }

    /// Records the root and persists the store header.
    pub(crate) fn persist_root(&mut self, root: Option<PageId>) -> Result<()> {
        let Some(store) = self.store.as_deref_mut() else {
            return Ok(());
        };
        store.set_root_page(root);
        store.persist_header()
    }

    /// Root page recorded in the store header.
    pub(crate) fn stored_root(&self) -> Option<PageId> {
        self.store.as_deref().and_then(|store| store.root_page())
    }

    /// Reads and decodes a page without caching it.
    pub(crate) fn read_raw(&mut self, page: PageId) -> Result<RawNode> {
        let store = self
            .store
            .as_deref_mut()
            .ok_or(TreeError::Invariant("page read on a memory-only tree"))?;
        codec::decode(&store.read_page(page)?)
    }

    pub(crate) fn into_store(self) -> Option<Box<dyn PageStore>> {
        self.store
    }
}

/// Connects the leaf cache to the page store.
struct StoreBacking<'a> {
    store: &'a mut dyn PageStore,
    layout: Layout,
    stats: &'a BTreeStats,
}

impl LeafBacking for StoreBacking<'_> {
    fn load_leaf(&mut self, page: PageId) -> Result<LeafNode> {
        let raw = codec::decode(&self.store.read_page(page)?)?;
        if raw.children != RawChildren::None {
            return Err(TreeError::CorruptNode("expected leaf, found inner node"));
        }
        if raw.key_size != self.layout.key_size || raw.value_size != self.layout.value_size {
            return Err(TreeError::CorruptNode("leaf entry widths differ from tree"));
        }
        self.stats.inc_leaf_loads();
        trace!(target: "pagetree::cache", page = page.0, entries = raw.entries.len(), "loaded leaf");
        let mut leaf = LeafNode::new(page, raw.entries, None);
        leaf.dirty = false;
        Ok(leaf)
    }

    fn flush_leaf(&mut self, leaf: &LeafNode) -> Result<()> {
        let page = codec::encode_leaf(leaf, self.layout.key_size, self.layout.value_size)?;
        self.store.write_page(leaf.page, &page)?;
        self.stats.add_leaf_writes(1);
        Ok(())
    }

    fn evicted(&mut self, page: PageId) {
        self.stats.inc_leaf_evictions();
        trace!(target: "pagetree::cache", page = page.0, "evicted leaf");
    }
}
