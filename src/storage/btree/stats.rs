use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Snapshot of tree statistics at a point in time.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BTreeStatsSnapshot {
    /// Entries inserted
    pub inserts: u64,
    /// Leaf accesses served from the leaf cache
    pub cache_hits: u64,
    /// Leaves decoded from storage on a cache miss
    pub leaf_loads: u64,
    /// Leaves pushed out of the cache
    pub leaf_evictions: u64,
    /// Leaf pages written to storage
    pub leaf_writes: u64,
    /// Leaf splits performed
    pub leaf_splits: u64,
    /// Inner node splits performed
    pub inner_splits: u64,
    /// Whole-tree flushes
    pub flushes: u64,
}

/// Counters for tree activity.
#[derive(Default, Debug)]
pub struct BTreeStats {
    inserts: AtomicU64,
    cache_hits: AtomicU64,
    leaf_loads: AtomicU64,
    leaf_evictions: AtomicU64,
    leaf_writes: AtomicU64,
    leaf_splits: AtomicU64,
    inner_splits: AtomicU64,
    flushes: AtomicU64,
}

impl BTreeStats {
    /// Returns the number of inserted entries.
    pub fn inserts(&self) -> u64 {
        self.inserts.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of leaf cache hits.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of leaves loaded from storage.
    pub fn leaf_loads(&self) -> u64 {
        self.leaf_loads.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of leaves evicted from the cache.
    pub fn leaf_evictions(&self) -> u64 {
        self.leaf_evictions.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of leaf pages written.
    pub fn leaf_writes(&self) -> u64 {
        self.leaf_writes.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of leaf splits.
    pub fn leaf_splits(&self) -> u64 {
        self.leaf_splits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of inner node splits.
    pub fn inner_splits(&self) -> u64 {
        self.inner_splits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of whole-tree flushes.
    pub fn flushes(&self) -> u64 {
        self.flushes.load(AtomicOrdering::Relaxed)
    }

    pub(crate) fn inc_inserts(&self) {
        self.inserts.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_leaf_loads(&self) {
        self.leaf_loads.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_leaf_evictions(&self) {
        self.leaf_evictions.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn add_leaf_writes(&self, n: u64) {
        self.leaf_writes.fetch_add(n, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_leaf_splits(&self) {
        self.leaf_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_inner_splits(&self) {
        self.inner_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_flushes(&self) {
        self.flushes.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Creates a snapshot of all current statistics.
    pub fn snapshot(&self) -> BTreeStatsSnapshot {
        BTreeStatsSnapshot {
            inserts: self.inserts(),
            cache_hits: self.cache_hits(),
            leaf_loads: self.leaf_loads(),
            leaf_evictions: self.leaf_evictions(),
            leaf_writes: self.leaf_writes(),
            leaf_splits: self.leaf_splits(),
            inner_splits: self.inner_splits(),
            flushes: self.flushes(),
        }
    }

    /// Emits current statistics to the tracing infrastructure.
    pub fn emit_tracing(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            target: "pagetree::stats",
            inserts = snapshot.inserts,
            cache_hits = snapshot.cache_hits,
            leaf_loads = snapshot.leaf_loads,
            leaf_evictions = snapshot.leaf_evictions,
            leaf_writes = snapshot.leaf_writes,
            leaf_splits = snapshot.leaf_splits,
            inner_splits = snapshot.inner_splits,
            flushes = snapshot.flushes,
            "btree stats snapshot"
        );
    }
}
