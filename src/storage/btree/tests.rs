use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use super::node::Child;
use super::{BTree, BTreeOptions, Entry};
use crate::primitives::bytes::u64_key;
use crate::primitives::pager::{MemPager, PageStore};
use crate::types::{PageId, Result, TreeError};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn key4(v: u32) -> [u8; 4] {
    v.to_be_bytes()
}

fn entry(key: &[u8], value: &[u8]) -> Entry {
    Entry {
        key: key.to_vec(),
        value: value.to_vec(),
    }
}

fn u64_entry(v: u64) -> Entry {
    entry(&u64_key(v), &u64_key(v))
}

fn keys_u32(entries: &[Entry]) -> Vec<u32> {
    entries
        .iter()
        .map(|e| u32::from_be_bytes(e.key.as_slice().try_into().expect("4-byte key")))
        .collect()
}

fn tiny_options() -> BTreeOptions {
    BTreeOptions::default().page_size(64)
}

fn paged_tree(page_size: usize, capacity: usize) -> Result<BTree> {
    BTree::create(
        MemPager::new(page_size)?,
        BTreeOptions::default().leaf_cache_capacity(capacity),
    )
}

fn shuffled(count: u64, seed: u64) -> Vec<u64> {
    let mut keys: Vec<u64> = (0..count).collect();
    keys.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    keys
}

#[test]
fn five_keys_point_and_range() -> Result<()> {
    let mut tree = BTree::in_memory(BTreeOptions::default())?;
    for k in [1u32, 5, 3, 2, 4] {
        tree.insert(&key4(k), &key4(k))?;
    }
    assert_eq!(tree.get(&key4(3))?, vec![entry(&key4(3), &key4(3))]);
    assert_eq!(keys_u32(&tree.range(&key4(2), &key4(4))?), vec![2, 3, 4]);
    assert_eq!(tree.key_size(), Some(4));
    assert_eq!(tree.value_size(), Some(4));
    assert_eq!(tree.height(), 1);
    Ok(())
}

#[test]
fn empty_tree_answers_with_nothing() -> Result<()> {
    let mut tree = BTree::in_memory(BTreeOptions::default())?;
    assert!(tree.is_empty());
    assert!(tree.get(&key4(1))?.is_empty());
    assert!(tree.range(&key4(1), &key4(9))?.is_empty());
    assert!(tree.scan()?.is_empty());
    assert_eq!(tree.count()?, 0);
    assert_eq!(tree.height(), 0);
    assert_eq!(tree.key_size(), None);
    assert_eq!(tree.verify()?.entries, 0);
    Ok(())
}

#[test]
fn leaf_split_keeps_separator_on_the_left() -> Result<()> {
    // 64-byte pages leave 44 bytes for 8-byte entries: the sixth entry splits.
    let mut tree = BTree::in_memory(tiny_options())?;
    for k in 1..=5u32 {
        tree.insert(&key4(k), &key4(k))?;
    }
    assert_eq!(tree.height(), 1);
    tree.insert(&key4(6), &key4(6))?;
    assert_eq!(tree.height(), 2);
    assert_eq!(tree.stats().leaf_splits(), 1);

    let Some(Child::Inner(root)) = &tree.root else {
        panic!("expected inner root after split");
    };
    assert_eq!(root.keys.len(), 1);
    assert_eq!(root.keys.key(0), &key4(4));
    let (left, right) = match root.children.as_slice() {
        [Child::Leaf(left), Child::Leaf(right)] => (*left, *right),
        other => panic!("unexpected children {other:?}"),
    };
    let root_page = root.page;
    let left_keys: Vec<Vec<u8>> = tree
        .nodes
        .leaf_mut(left, Some(root_page))?
        .entries
        .iter()
        .map(|r| r[..4].to_vec())
        .collect();
    assert_eq!(left_keys, (1..=4u32).map(|k| key4(k).to_vec()).collect::<Vec<_>>());
    let right_len = tree.nodes.leaf_mut(right, Some(root_page))?.entries.len();
    assert_eq!(right_len, 2);
    tree.verify()?;
    Ok(())
}

#[test]
fn inner_split_promotes_and_drops_the_middle_key() -> Result<()> {
    // Sequential keys split leaves at separators 4, 8, 12, 16; the fourth
    // separator overflows the 44-byte inner budget (12 bytes per key).
    let mut tree = BTree::in_memory(tiny_options())?;
    for k in 1..=18u32 {
        tree.insert(&key4(k), &key4(k))?;
    }
    assert_eq!(tree.height(), 3);
    assert_eq!(tree.stats().inner_splits(), 1);

    let Some(Child::Inner(root)) = &tree.root else {
        panic!("expected inner root");
    };
    assert_eq!(root.keys.iter().collect::<Vec<_>>(), vec![&key4(12)[..]]);
    let [Child::Inner(left), Child::Inner(right)] = root.children.as_slice() else {
        panic!("expected two inner children");
    };
    assert_eq!(left.keys.iter().collect::<Vec<_>>(), vec![&key4(4)[..], &key4(8)[..]]);
    assert_eq!(right.keys.iter().collect::<Vec<_>>(), vec![&key4(16)[..]]);
    assert_eq!(left.children.len(), 3);
    assert_eq!(right.children.len(), 2);

    assert_eq!(keys_u32(&tree.scan()?), (1..=18).collect::<Vec<_>>());
    let report = tree.verify()?;
    assert_eq!(report.height, 3);
    assert_eq!(report.entries, 18);
    Ok(())
}

#[test]
fn ten_thousand_sequential_keys_build_a_deep_tree() -> Result<()> {
    // 820-byte pages hold 50 sixteen-byte entries per leaf.
    let mut tree = BTree::in_memory(BTreeOptions::default().page_size(820))?;
    for k in 0..10_000u64 {
        tree.insert(&u64_key(k), &u64_key(k))?;
    }
    assert!(tree.height() >= 2, "height {}", tree.height());
    let report = tree.verify()?;
    assert_eq!(report.entries, 10_000);
    assert!(report.leaves > 200);
    assert_eq!(tree.count()?, 10_000);
    for k in [0u64, 1, 49, 50, 51, 4_999, 9_999] {
        assert_eq!(tree.get(&u64_key(k))?, vec![u64_entry(k)]);
    }
    assert!(tree.get(&u64_key(10_000))?.is_empty());
    let middle = tree.range(&u64_key(2_000), &u64_key(7_999))?;
    assert_eq!(middle.len(), 6_000);
    assert_eq!(middle.first(), Some(&u64_entry(2_000)));
    assert_eq!(middle.last(), Some(&u64_entry(7_999)));
    Ok(())
}

#[test]
fn eviction_is_transparent() -> Result<()> {
    let mut reference = BTree::in_memory(BTreeOptions::default().page_size(256))?;
    let mut paged = paged_tree(256, 1)?;
    for k in shuffled(1_500, 7) {
        reference.insert(&u64_key(k), &u64_key(k * 3))?;
        paged.insert(&u64_key(k), &u64_key(k * 3))?;
    }
    assert!(paged.cached_leaves() <= 1);
    let stats = paged.stats();
    assert!(stats.leaf_evictions() > 0);
    assert!(stats.leaf_loads() > 0);

    assert_eq!(paged.scan()?, reference.scan()?);
    for (from, to) in [(0u64, 10u64), (100, 900), (1_499, 1_499), (700, 2_000)] {
        assert_eq!(
            paged.range(&u64_key(from), &u64_key(to))?,
            reference.range(&u64_key(from), &u64_key(to))?
        );
    }
    assert_eq!(paged.verify()?, reference.verify()?);
    Ok(())
}

#[test]
fn two_leaves_with_a_single_slot_cache() -> Result<()> {
    let mut tree = BTree::create(
        MemPager::new(64)?,
        BTreeOptions::default().leaf_cache_capacity(1),
    )?;
    for k in 1..=6u32 {
        tree.insert(&key4(k), &key4(k))?;
    }
    // Split left the two leaves competing for one slot.
    tree.insert(&key4(0), &key4(0))?;
    tree.insert(&key4(9), &key4(9))?;
    tree.insert(&key4(0), &key4(1))?;
    assert_eq!(tree.cached_leaves(), 1);
    assert_eq!(keys_u32(&tree.scan()?), vec![0, 0, 1, 2, 3, 4, 5, 6, 9]);
    assert_eq!(tree.get(&key4(0))?.len(), 2);
    Ok(())
}

#[test]
fn duplicates_straddling_leaves_are_all_found() -> Result<()> {
    let mut tree = BTree::in_memory(tiny_options())?;
    for k in [1u32, 2, 3, 9, 10] {
        tree.insert(&key4(k), &key4(0))?;
    }
    for copy in 0..25u32 {
        tree.insert(&key4(7), &key4(copy))?;
    }
    assert!(tree.height() >= 2);

    let mut values: Vec<u32> = tree
        .get(&key4(7))?
        .iter()
        .map(|e| u32::from_be_bytes(e.value.as_slice().try_into().expect("4-byte value")))
        .collect();
    values.sort_unstable();
    assert_eq!(values, (0..25).collect::<Vec<_>>());

    assert_eq!(tree.range(&key4(4), &key4(8))?.len(), 25);
    assert_eq!(tree.range(&key4(3), &key4(9))?.len(), 27);
    assert!(tree.get(&key4(8))?.is_empty());
    let report = tree.verify()?;
    assert_eq!(report.entries, 30);
    Ok(())
}

#[test]
fn shorter_keys_compare_as_prefixes() -> Result<()> {
    let mut tree = BTree::in_memory(tiny_options())?;
    for hi in 0..4u8 {
        for lo in 0..10u8 {
            tree.insert(&[hi, lo], &[lo])?;
        }
    }
    assert_eq!(tree.get(&[2])?.len(), 10);
    assert!(tree.get(&[2])?.iter().all(|e| e.key[0] == 2));
    assert_eq!(tree.range(&[1], &[2])?.len(), 20);
    assert_eq!(tree.get(&[])?.len(), 40);
    Ok(())
}

#[test]
fn width_mismatches_are_rejected() -> Result<()> {
    let mut tree = BTree::in_memory(BTreeOptions::default())?;
    tree.insert(&key4(1), &[1, 2])?;
    assert!(matches!(
        tree.insert(&[1, 2, 3], &[1, 2]),
        Err(TreeError::KeyLengthMismatch {
            expected: 4,
            actual: 3
        })
    ));
    assert!(matches!(
        tree.insert(&key4(2), &[1]),
        Err(TreeError::ValueLengthMismatch {
            expected: 2,
            actual: 1
        })
    ));
    assert!(matches!(
        tree.get(&[0, 0, 0, 1, 0]),
        Err(TreeError::KeyLengthMismatch { .. })
    ));
    assert!(matches!(
        tree.range(&key4(1), &[0, 0, 9]),
        Err(TreeError::KeyLengthMismatch {
            expected: 4,
            actual: 3
        })
    ));
    assert_eq!(tree.count()?, 1);
    Ok(())
}

#[test]
fn unworkable_first_insert_leaves_tree_empty() -> Result<()> {
    let mut tree = BTree::in_memory(tiny_options())?;
    assert!(matches!(tree.insert(&[], &[1]), Err(TreeError::InvalidConfig(_))));
    assert!(matches!(
        tree.insert(&[0u8; 30], &[0u8; 8]),
        Err(TreeError::InvalidConfig(_))
    ));
    assert!(tree.is_empty());
    tree.insert(&key4(1), &key4(1))?;
    assert_eq!(tree.key_size(), Some(4));
    Ok(())
}

#[test]
fn inverted_range_is_empty() -> Result<()> {
    let mut tree = BTree::in_memory(BTreeOptions::default())?;
    for k in 0..10u32 {
        tree.insert(&key4(k), &key4(k))?;
    }
    assert!(tree.range(&key4(6), &key4(2))?.is_empty());
    assert!(tree.range(&key4(20), &key4(30))?.is_empty());
    Ok(())
}

#[test]
fn flush_and_reopen_preserves_queries() -> Result<()> {
    let options = BTreeOptions::default().leaf_cache_capacity(8);
    let mut tree = BTree::create(MemPager::new(512)?, options.clone())?;
    for k in shuffled(2_000, 11) {
        tree.insert(&u64_key(k), &u64_key(k))?;
    }
    let before_scan = tree.scan()?;
    let before_range = tree.range(&u64_key(333), &u64_key(1_444))?;
    let height = tree.height();
    let store = tree.into_store()?.expect("paged tree keeps its store");

    let mut reopened = BTree::open(store, options)?;
    assert_eq!(reopened.height(), height);
    assert_eq!(reopened.key_size(), Some(8));
    assert_eq!(reopened.value_size(), Some(8));
    assert_eq!(reopened.scan()?, before_scan);
    assert_eq!(reopened.range(&u64_key(333), &u64_key(1_444))?, before_range);
    assert_eq!(reopened.get(&u64_key(1_999))?, vec![u64_entry(1_999)]);

    reopened.insert(&u64_key(5_000), &u64_key(5_000))?;
    assert_eq!(reopened.count()?, 2_001);
    reopened.verify()?;
    Ok(())
}

#[test]
fn single_leaf_tree_round_trips() -> Result<()> {
    let mut tree = paged_tree(4096, 4)?;
    tree.insert(&key4(7), &key4(70))?;
    let store = tree.into_store()?.expect("store");
    let mut reopened = BTree::open(store, BTreeOptions::default())?;
    assert_eq!(reopened.height(), 1);
    assert_eq!(reopened.get(&key4(7))?, vec![entry(&key4(7), &key4(70))]);
    Ok(())
}

#[test]
fn second_flush_writes_no_clean_leaves() -> Result<()> {
    let mut tree = paged_tree(256, 64)?;
    for k in 0..200u64 {
        tree.insert(&u64_key(k), &u64_key(k))?;
    }
    tree.flush()?;
    let written = tree.stats().leaf_writes();
    assert!(written > 0);
    tree.flush()?;
    assert_eq!(tree.stats().leaf_writes(), written);
    tree.insert(&u64_key(0), &u64_key(1))?;
    tree.flush()?;
    assert_eq!(tree.stats().leaf_writes(), written + 1);
    assert_eq!(tree.stats().flushes(), 3);
    Ok(())
}

#[test]
fn corrupt_root_page_fails_to_open() -> Result<()> {
    let mut tree = paged_tree(256, 4)?;
    for k in 0..100u64 {
        tree.insert(&u64_key(k), &u64_key(k))?;
    }
    let root = tree.root_page().expect("root");
    let mut store = tree.into_store()?.expect("store");
    store.write_page(root, &[0, 1, 0, 0, 0, 0])?;
    assert!(matches!(
        BTree::open(store, BTreeOptions::default()),
        Err(TreeError::CorruptNode(_))
    ));
    Ok(())
}

#[test]
fn create_refuses_a_store_holding_a_tree() -> Result<()> {
    let mut tree = paged_tree(256, 4)?;
    tree.insert(&key4(1), &key4(1))?;
    let store = tree.into_store()?.expect("store");
    assert!(matches!(
        BTree::create(store, BTreeOptions::default()),
        Err(TreeError::InvalidConfig(_))
    ));
    Ok(())
}

#[test]
fn memory_only_flush_is_a_no_op() -> Result<()> {
    let mut tree = BTree::in_memory(BTreeOptions::default())?;
    tree.insert(&key4(1), &key4(1))?;
    tree.flush()?;
    assert_eq!(tree.stats().flushes(), 0);
    assert!(tree.into_store()?.is_none());
    Ok(())
}

#[derive(Default)]
struct FaultState {
    fail_reads: bool,
    fail_writes: bool,
    allocations_left: Option<usize>,
}

/// Switches shared between a test and the [`FaultyStore`] owned by its tree.
#[derive(Clone, Default)]
struct Faults(Arc<Mutex<FaultState>>);

impl Faults {
    fn fail_reads(&self, fail: bool) {
        self.0.lock().fail_reads = fail;
    }

    fn fail_writes(&self, fail: bool) {
        self.0.lock().fail_writes = fail;
    }

    fn allow_allocations(&self, left: Option<usize>) {
        self.0.lock().allocations_left = left;
    }
}

fn injected(what: &str) -> TreeError {
    TreeError::Io(io::Error::new(io::ErrorKind::Other, format!("injected {what} failure")))
}

/// Memory page store whose reads, writes and allocations fail on demand.
struct FaultyStore {
    inner: MemPager,
    faults: Faults,
}

impl PageStore for FaultyStore {
    fn page_size(&self) -> usize {
        self.inner.page_size()
    }

    fn allocate_page(&mut self) -> Result<PageId> {
        {
            let mut state = self.faults.0.lock();
            match state.allocations_left {
                Some(0) => return Err(injected("allocation")),
                Some(left) => state.allocations_left = Some(left - 1),
                None => {}
            }
        }
        self.inner.allocate_page()
    }

    fn read_page(&mut self, id: PageId) -> Result<Vec<u8>> {
        if self.faults.0.lock().fail_reads {
            return Err(injected("read"));
        }
        self.inner.read_page(id)
    }

    fn write_page(&mut self, id: PageId, data: &[u8]) -> Result<()> {
        if self.faults.0.lock().fail_writes {
            return Err(injected("write"));
        }
        self.inner.write_page(id, data)
    }

    fn root_page(&self) -> Option<PageId> {
        self.inner.root_page()
    }

    fn set_root_page(&mut self, root: Option<PageId>) {
        self.inner.set_root_page(root);
    }

    fn persist_header(&mut self) -> Result<()> {
        if self.faults.0.lock().fail_writes {
            return Err(injected("header"));
        }
        self.inner.persist_header()
    }
}

fn faulty_tree(page_size: usize, capacity: usize) -> Result<(BTree, Faults)> {
    let faults = Faults::default();
    let store = FaultyStore {
        inner: MemPager::new(page_size)?,
        faults: faults.clone(),
    };
    let tree = BTree::create(store, BTreeOptions::default().leaf_cache_capacity(capacity))?;
    Ok((tree, faults))
}

#[test]
fn failed_eviction_during_leaf_split_keeps_every_entry() -> Result<()> {
    // One cache slot: placing the new right leaf must evict the left one.
    let (mut tree, faults) = faulty_tree(64, 1)?;
    for k in 1..=5u32 {
        tree.insert(&key4(k), &key4(k))?;
    }
    faults.fail_writes(true);
    assert!(matches!(tree.insert(&key4(6), &key4(6)), Err(TreeError::Io(_))));
    assert_eq!(keys_u32(&tree.scan()?), vec![1, 2, 3, 4, 5]);
    assert!(tree.get(&key4(6))?.is_empty());
    assert_eq!(tree.height(), 1);

    faults.fail_writes(false);
    tree.insert(&key4(6), &key4(6))?;
    assert_eq!(keys_u32(&tree.scan()?), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(tree.height(), 2);
    assert_eq!(tree.verify()?.entries, 6);
    Ok(())
}

#[test]
fn failed_allocation_during_leaf_split_keeps_every_entry() -> Result<()> {
    let (mut tree, faults) = faulty_tree(64, 4)?;
    for k in 1..=5u32 {
        tree.insert(&key4(k), &key4(k))?;
    }
    faults.allow_allocations(Some(0));
    assert!(matches!(tree.insert(&key4(6), &key4(6)), Err(TreeError::Io(_))));
    assert_eq!(keys_u32(&tree.scan()?), vec![1, 2, 3, 4, 5]);
    assert_eq!(tree.stats().leaf_splits(), 0);
    Ok(())
}

#[test]
fn failed_root_allocation_folds_the_split_back() -> Result<()> {
    let (mut tree, faults) = faulty_tree(64, 4)?;
    for k in 1..=5u32 {
        tree.insert(&key4(k), &key4(k))?;
    }
    // The right leaf gets a page; the new root does not.
    faults.allow_allocations(Some(1));
    assert!(matches!(tree.insert(&key4(6), &key4(6)), Err(TreeError::Io(_))));
    assert_eq!(tree.height(), 1);
    assert_eq!(keys_u32(&tree.scan()?), vec![1, 2, 3, 4, 5, 6]);

    faults.allow_allocations(None);
    tree.insert(&key4(7), &key4(7))?;
    assert_eq!(tree.height(), 2);
    assert_eq!(keys_u32(&tree.scan()?), vec![1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(tree.verify()?.entries, 7);
    Ok(())
}

#[test]
fn failed_reload_surfaces_io_and_later_succeeds() -> Result<()> {
    let (mut tree, faults) = faulty_tree(256, 1)?;
    for k in 0..200u64 {
        tree.insert(&u64_key(k), &u64_key(k))?;
    }
    // Sequential inserts leave only the rightmost leaf resident.
    faults.fail_reads(true);
    assert!(matches!(tree.get(&u64_key(0)), Err(TreeError::Io(_))));
    faults.fail_reads(false);
    assert_eq!(tree.get(&u64_key(0))?, vec![u64_entry(0)]);
    assert_eq!(tree.count()?, 200);
    Ok(())
}

#[test]
fn failed_flush_can_be_retried() -> Result<()> {
    let (mut tree, faults) = faulty_tree(256, 64)?;
    for k in shuffled(300, 5) {
        tree.insert(&u64_key(k), &u64_key(k))?;
    }
    let before = tree.scan()?;
    faults.fail_writes(true);
    assert!(matches!(tree.flush(), Err(TreeError::Io(_))));
    assert_eq!(tree.stats().flushes(), 0);

    faults.fail_writes(false);
    let store = tree.into_store()?.expect("paged tree keeps its store");
    let mut reopened = BTree::open(store, BTreeOptions::default())?;
    assert_eq!(reopened.scan()?, before);
    Ok(())
}

#[test]
fn leaves_record_the_inner_node_above_them() -> Result<()> {
    let mut tree = paged_tree(64, 8)?;
    for k in 1..=6u32 {
        tree.insert(&key4(k), &key4(k))?;
    }
    let root = tree.root_page().expect("root");
    let Some(Child::Inner(node)) = &tree.root else {
        panic!("root should be an inner node after a split");
    };
    for child in &node.children {
        assert_eq!(tree.nodes.resident_parent(child.page()), Some(Some(root)));
    }
    tree.verify()?;
    Ok(())
}
