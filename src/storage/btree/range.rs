//! Point and range lookups.
//!
//! A range walk descends while both bounds pick the same child. Once they
//! part, only the two boundary paths are filtered; every child strictly
//! between them lies wholly inside the range and is collected unfiltered.

use std::ops::Range;

use super::node::{Child, EntryList, LeafNode};
use super::search::{compare_prefix, first_above, first_not_below};
use super::store::NodeStore;
use super::tree::{BTree, Entry};
use crate::types::{PageId, Result, TreeError};

impl BTree {
    /// Every entry whose key starts with `key`, duplicates included.
    ///
    /// `key` may be shorter than the tree's key width, in which case only
    /// that many leading bytes are compared.
    pub fn get(&mut self, key: &[u8]) -> Result<Vec<Entry>> {
        self.range(key, key)
    }

    /// Entries with `from <= key <= to`, in key order.
    ///
    /// Both bounds must have the same length, at most the key width; keys are
    /// compared over that many leading bytes.
    pub fn range(&mut self, from: &[u8], to: &[u8]) -> Result<Vec<Entry>> {
        if from.len() != to.len() {
            return Err(TreeError::KeyLengthMismatch {
                expected: from.len(),
                actual: to.len(),
            });
        }
        let (Some(root), Some(layout)) = (&self.root, self.nodes.layout_opt()) else {
            return Ok(Vec::new());
        };
        let key_len = layout.key_size as usize;
        if from.len() > key_len {
            return Err(TreeError::KeyLengthMismatch {
                expected: key_len,
                actual: from.len(),
            });
        }
        if compare_prefix(from, to, from.len()).is_gt() {
            return Ok(Vec::new());
        }
        let mut collector = Collector::new(&mut self.nodes, key_len);
        collector.bounded(root, None, Some(from), Some(to))?;
        Ok(collector.out)
    }

    /// Every entry in key order.
    pub fn scan(&mut self) -> Result<Vec<Entry>> {
        let (Some(root), Some(layout)) = (&self.root, self.nodes.layout_opt()) else {
            return Ok(Vec::new());
        };
        let mut collector = Collector::new(&mut self.nodes, layout.key_size as usize);
        collector.subtree(root, None)?;
        Ok(collector.out)
    }

    /// Number of entries, counted by walking every leaf.
    pub fn count(&mut self) -> Result<u64> {
        let Some(root) = &self.root else {
            return Ok(0);
        };
        let mut total = 0u64;
        visit_leaves(&mut self.nodes, root, None, &mut |leaf| {
            total += leaf.entries.len() as u64;
        })?;
        Ok(total)
    }
}

/// Index span `[start, end)` of the records in `entries` between the bounds.
///
/// An absent bound is unbounded on that side. Duplicates of either bound are
/// all included.
pub(crate) fn range_within_leaf(
    entries: &EntryList,
    from: Option<&[u8]>,
    to: Option<&[u8]>,
) -> Range<usize> {
    let start = from.map_or(0, |from| first_not_below(entries, from, from.len()));
    let end = to.map_or(entries.len(), |to| first_above(entries, to, to.len()));
    start..end.max(start)
}

struct Collector<'a> {
    nodes: &'a mut NodeStore,
    key_len: usize,
    out: Vec<Entry>,
}

impl<'a> Collector<'a> {
    fn new(nodes: &'a mut NodeStore, key_len: usize) -> Self {
        Self {
            nodes,
            key_len,
            out: Vec::new(),
        }
    }

    fn bounded(
        &mut self,
        child: &Child,
        parent: Option<PageId>,
        from: Option<&[u8]>,
        to: Option<&[u8]>,
    ) -> Result<()> {
        let mut current = child;
        let mut parent = parent;
        loop {
            let node = match current {
                Child::Leaf(page) => {
                    let leaf = self.nodes.leaf_mut(*page, parent)?;
                    let span = range_within_leaf(&leaf.entries, from, to);
                    let key_len = self.key_len;
                    self.out.extend(
                        span.map(|idx| Entry::from_record(leaf.entries.get(idx), key_len)),
                    );
                    return Ok(());
                }
                Child::Inner(node) => node,
            };
            // Leftmost child that can hold `from`, rightmost that can hold `to`.
            let start = from.map_or(0, |from| first_not_below(&node.keys, from, from.len()));
            let end = to.map_or(node.keys.len(), |to| first_above(&node.keys, to, to.len()));
            if start > end {
                return Ok(());
            }
            let children = node
                .children
                .get(start..=end)
                .ok_or(TreeError::Invariant("branch index past last child"))?;
            parent = Some(node.page);
            if start == end {
                current = &children[0];
                continue;
            }

            let (first, rest) = children
                .split_first()
                .ok_or(TreeError::Invariant("empty branch span"))?;
            let (last, middle) = rest
                .split_last()
                .ok_or(TreeError::Invariant("empty branch span"))?;
            self.bounded(first, parent, from, None)?;
            for child in middle {
                self.subtree(child, parent)?;
            }
            return self.bounded(last, parent, None, to);
        }
    }

    fn subtree(&mut self, child: &Child, parent: Option<PageId>) -> Result<()> {
        let key_len = self.key_len;
        let out = &mut self.out;
        visit_leaves(&mut *self.nodes, child, parent, &mut |leaf| {
            out.extend(
                leaf.entries
                    .iter()
                    .map(|record| Entry::from_record(record, key_len)),
            );
        })
    }
}

/// Calls `visit` on every leaf under `child`, left to right.
fn visit_leaves(
    nodes: &mut NodeStore,
    child: &Child,
    parent: Option<PageId>,
    visit: &mut dyn FnMut(&LeafNode),
) -> Result<()> {
    match child {
        Child::Leaf(page) => {
            let leaf = nodes.leaf_mut(*page, parent)?;
            visit(leaf);
        }
        Child::Inner(node) => {
            for grandchild in &node.children {
                visit_leaves(nodes, grandchild, Some(node.page), visit)?;
            }
        }
    }
    Ok(())
}
