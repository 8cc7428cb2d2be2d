//! Index structures built on the page primitives.

/// Paged B-tree with in-memory inner nodes and cached leaves.
pub mod btree;
