use serde::{Deserialize, Serialize};

use super::codec::NODE_HEADER_LEN;
use super::node::POINTER_LEN;
use crate::primitives::pager::{check_page_size, DEFAULT_PAGE_SIZE};
use crate::types::{Result, TreeError};

/// Default bytes of each page kept free of entries.
pub const DEFAULT_NODE_RESERVE: usize = 20;
/// Default number of resident leaves in disk-backed mode.
pub const DEFAULT_LEAF_CACHE_CAPACITY: usize = 1024;

/// Configuration knobs for the tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BTreeOptions {
    /// Page size used in memory-only mode. Disk-backed trees take the store's page size.
    pub page_size: usize,
    /// Maximum resident leaves when backed by a page store.
    pub leaf_cache_capacity: usize,
    /// Bytes of each page that entries may not use. A node splits once its
    /// entries need more than `page_size - node_reserve` bytes.
    pub node_reserve: usize,
}

impl Default for BTreeOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            leaf_cache_capacity: DEFAULT_LEAF_CACHE_CAPACITY,
            node_reserve: DEFAULT_NODE_RESERVE,
        }
    }
}

impl BTreeOptions {
    /// Sets the memory-only page size.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the leaf cache capacity.
    pub fn leaf_cache_capacity(mut self, capacity: usize) -> Self {
        self.leaf_cache_capacity = capacity;
        self
    }

    /// Sets the per-page reserve.
    pub fn node_reserve(mut self, reserve: usize) -> Self {
        self.node_reserve = reserve;
        self
    }

    /// Rejects settings that cannot hold a well-formed node.
    pub fn validate(&self) -> Result<()> {
        check_page_size(self.page_size)?;
        if self.leaf_cache_capacity == 0 {
            return Err(TreeError::InvalidConfig("leaf cache capacity must be non-zero"));
        }
        // The node header plus the extra child pointer of an inner node live in the reserve.
        if self.node_reserve < NODE_HEADER_LEN + POINTER_LEN {
            return Err(TreeError::InvalidConfig("node reserve must be at least 14 bytes"));
        }
        if self.node_reserve >= self.page_size {
            return Err(TreeError::InvalidConfig("node reserve leaves no room for entries"));
        }
        Ok(())
    }
}

/// Entry widths fixed by the first insert, plus the page budget derived from them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    /// Key width.
    pub key_size: u8,
    /// Value width.
    pub value_size: u8,
    /// Bytes of entries a node may hold before it splits.
    pub budget: usize,
}

impl Layout {
    /// Derives the layout, rejecting widths a page cannot split sensibly.
    pub fn new(key_len: usize, value_len: usize, page_size: usize, reserve: usize) -> Result<Self> {
        let key_size = u8::try_from(key_len)
            .ok()
            .filter(|&k| k > 0)
            .ok_or(TreeError::InvalidConfig("key size must be between 1 and 255 bytes"))?;
        let value_size = u8::try_from(value_len)
            .map_err(|_| TreeError::InvalidConfig("value size must be at most 255 bytes"))?;
        let budget = page_size.saturating_sub(reserve);
        let layout = Self {
            key_size,
            value_size,
            budget,
        };
        // A split node must leave both halves non-empty, so a page holds at least two entries.
        if budget < 2 * layout.leaf_width() || budget < 2 * layout.inner_width() {
            return Err(TreeError::InvalidConfig("page too small for two entries of this width"));
        }
        Ok(layout)
    }

    /// Bytes per leaf entry.
    pub fn leaf_width(&self) -> usize {
        self.key_size as usize + self.value_size as usize
    }

    /// Bytes per inner entry: separator plus child pointer.
    pub fn inner_width(&self) -> usize {
        self.key_size as usize + POINTER_LEN
    }
}
