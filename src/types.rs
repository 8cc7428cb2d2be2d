#![forbid(unsafe_code)]
//! Identifiers and the crate-wide error type.

use std::fmt;

/// Identity of a fixed-size page, either on durable storage or synthetic.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PageId(pub u64);

impl PageId {
    /// Page 0 holds the store header and never carries a node.
    pub const HEADER: PageId = PageId(0);
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors surfaced by the tree, its codec and the page stores.
#[derive(thiserror::Error, Debug)]
pub enum TreeError {
    /// Read or write failure from the page store.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// A probe or inserted key does not fit the tree's fixed key width.
    #[error("key length mismatch: expected {expected}, got {actual}")]
    KeyLengthMismatch {
        /// Width the tree was fixed to (or the other range bound's width).
        expected: usize,
        /// Width that was supplied.
        actual: usize,
    },
    /// An inserted value does not match the tree's fixed value width.
    #[error("value length mismatch: expected {expected}, got {actual}")]
    ValueLengthMismatch {
        /// Width the tree was fixed to.
        expected: usize,
        /// Width that was supplied.
        actual: usize,
    },
    /// A node page failed to decode.
    #[error("corrupt node: {0}")]
    CorruptNode(&'static str),
    /// A store header or page-level structure is invalid.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// Options or entry widths cannot produce a working tree.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// An internal invariant was broken; this is a defect, not a user error.
    #[error("internal invariant violated: {0}")]
    Invariant(&'static str),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TreeError>;
