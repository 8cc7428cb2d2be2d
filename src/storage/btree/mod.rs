#![forbid(unsafe_code)]

//! Paged B-tree over fixed-width keys and values.
//!
//! Inner nodes live in memory for the life of the tree; leaves are bound to
//! pages and cycle through an LRU [`cache::LeafCache`]. Lookups live in
//! `range`, inserts and splits in `insert`; the page format is in [`codec`].

pub mod cache;
pub mod codec;
mod insert;
pub mod node;
mod options;
mod range;
pub mod search;
mod shared;
mod stats;
mod store;
mod tree;

pub use options::{BTreeOptions, Layout, DEFAULT_LEAF_CACHE_CAPACITY, DEFAULT_NODE_RESERVE};
pub use shared::SharedBTree;
pub use stats::{BTreeStats, BTreeStatsSnapshot};
pub use tree::{BTree, Entry, VerifyReport};

#[cfg(test)]
mod tests;
