use std::sync::Arc;

use parking_lot::Mutex;

use super::stats::BTreeStats;
use super::tree::{BTree, Entry, VerifyReport};
use crate::types::Result;

/// Cloneable handle that serializes every operation on one [`BTree`].
///
/// Lookups also take the lock: they reorder the leaf cache and may evict.
#[derive(Clone)]
pub struct SharedBTree {
    inner: Arc<Mutex<BTree>>,
    stats: Arc<BTreeStats>,
}

impl SharedBTree {
    /// Wraps `tree` for use from several threads.
    pub fn new(tree: BTree) -> Self {
        let stats = tree.stats();
        Self {
            inner: Arc::new(Mutex::new(tree)),
            stats,
        }
    }

    /// See [`BTree::insert`].
    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.lock().insert(key, value)
    }

    /// See [`BTree::get`].
    pub fn get(&self, key: &[u8]) -> Result<Vec<Entry>> {
        self.inner.lock().get(key)
    }

    /// See [`BTree::range`].
    pub fn range(&self, from: &[u8], to: &[u8]) -> Result<Vec<Entry>> {
        self.inner.lock().range(from, to)
    }

    /// See [`BTree::flush`].
    pub fn flush(&self) -> Result<()> {
        self.inner.lock().flush()
    }

    /// See [`BTree::verify`].
    pub fn verify(&self) -> Result<VerifyReport> {
        self.inner.lock().verify()
    }

    /// Statistics counters, readable without taking the lock.
    pub fn stats(&self) -> &Arc<BTreeStats> {
        &self.stats
    }

    /// Runs `f` with exclusive access to the tree.
    pub fn with<R>(&self, f: impl FnOnce(&mut BTree) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Returns the tree if this is the last handle.
    pub fn try_unwrap(self) -> std::result::Result<BTree, Self> {
        let stats = self.stats;
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner, stats })
    }
}
