//! Low-level primitives underneath the tree.

/// Fixed-width integer encoding.
pub mod bytes;

/// Page allocation and raw page I/O.
pub mod pager;
