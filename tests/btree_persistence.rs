use pagetree::primitives::bytes::u64_key;
use pagetree::{BTree, BTreeOptions, Entry, FilePager, PagerOptions, Result, TreeError};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tempfile::tempdir;

fn entry(k: u64, v: u64) -> Entry {
    Entry {
        key: u64_key(k).to_vec(),
        value: u64_key(v).to_vec(),
    }
}

#[test]
fn file_tree_survives_reopen() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("tree.db");
    let options = BTreeOptions::default().leaf_cache_capacity(16);

    let mut keys: Vec<u64> = (0..5_000).collect();
    keys.shuffle(&mut ChaCha8Rng::seed_from_u64(42));
    {
        let pager = FilePager::create(&path, PagerOptions::default().page_size(1024))?;
        let mut tree = BTree::create(pager, options.clone())?;
        for &k in &keys {
            tree.insert(&u64_key(k), &u64_key(k + 1))?;
        }
        tree.flush()?;
        assert!(tree.stats().leaf_evictions() > 0);
    }

    let mut tree = BTree::open(FilePager::open(&path)?, options)?;
    assert_eq!(tree.page_size(), 1024);
    assert_eq!(tree.count()?, 5_000);
    assert_eq!(tree.get(&u64_key(4_321))?, vec![entry(4_321, 4_322)]);
    let range = tree.range(&u64_key(10), &u64_key(19))?;
    assert_eq!(range, (10..=19).map(|k| entry(k, k + 1)).collect::<Vec<_>>());
    let report = tree.verify()?;
    assert_eq!(report.entries, 5_000);
    assert!(report.height >= 2);
    Ok(())
}

#[test]
fn unflushed_inserts_are_not_visible_after_reopen() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("tree.db");
    {
        let pager = FilePager::create(&path, PagerOptions::default().page_size(512))?;
        let mut tree = BTree::create(pager, BTreeOptions::default())?;
        for k in 0..100u64 {
            tree.insert(&u64_key(k), &u64_key(k))?;
        }
        tree.flush()?;
        for k in 100..200u64 {
            tree.insert(&u64_key(k), &u64_key(k))?;
        }
    }
    let mut tree = BTree::open(FilePager::open(&path)?, BTreeOptions::default())?;
    assert_eq!(tree.count()?, 100);
    assert!(tree.get(&u64_key(150))?.is_empty());
    Ok(())
}

#[test]
fn reopened_tree_keeps_growing() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("tree.db");
    let options = BTreeOptions::default().leaf_cache_capacity(4);
    for round in 0..3u64 {
        let mut tree = if round == 0 {
            let pager = FilePager::create(&path, PagerOptions::default().page_size(256))?;
            BTree::create(pager, options.clone())?
        } else {
            BTree::open(FilePager::open(&path)?, options.clone())?
        };
        for k in (round * 1_000)..((round + 1) * 1_000) {
            tree.insert(&u64_key(k), &u64_key(round))?;
        }
        tree.flush()?;
    }
    let mut tree = BTree::open(FilePager::open(&path)?, options)?;
    assert_eq!(tree.count()?, 3_000);
    assert_eq!(tree.get(&u64_key(2_500))?, vec![entry(2_500, 2)]);
    tree.verify()?;
    Ok(())
}

#[test]
fn empty_file_opens_as_empty_tree() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("empty.db");
    BTree::create(FilePager::create(&path, PagerOptions::default())?, BTreeOptions::default())?
        .flush()?;
    let mut tree = BTree::open(FilePager::open(&path)?, BTreeOptions::default())?;
    assert!(tree.is_empty());
    assert!(tree.scan()?.is_empty());
    Ok(())
}

#[test]
fn garbage_file_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("garbage.db");
    std::fs::write(&path, vec![0xAB; 8192])?;
    assert!(matches!(FilePager::open(&path), Err(TreeError::Corruption(_))));
    Ok(())
}
