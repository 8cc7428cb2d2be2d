//! Ordered paged B-tree over fixed-width byte keys and values.
//!
//! A [`BTree`] runs either fully in memory or on top of a [`PageStore`] such
//! as [`FilePager`]. Inner nodes always stay in memory; leaves are paged in
//! and out through a bounded LRU cache.

#![warn(missing_docs)]

pub mod primitives;
pub mod storage;
pub mod types;

pub use primitives::pager::{FilePager, MemPager, PageStore, PagerOptions};
pub use storage::btree::{
    BTree, BTreeOptions, BTreeStats, BTreeStatsSnapshot, Entry, SharedBTree, VerifyReport,
};
pub use types::{PageId, Result, TreeError};
