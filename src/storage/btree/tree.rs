use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::codec::{self, RawChildren, RawNode};
use super::node::{Child, InnerNode, LeafNode};
use super::options::{BTreeOptions, Layout};
use super::search::compare_prefix;
use super::stats::BTreeStats;
use super::store::NodeStore;
use crate::primitives::pager::PageStore;
use crate::types::{PageId, Result, TreeError};

/// Guard against cyclic child pointers in a damaged file.
const MAX_LOAD_DEPTH: usize = 64;

/// One key/value pair as returned by lookups.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Entry {
    /// Key bytes, exactly the tree's key width.
    pub key: Vec<u8>,
    /// Value bytes, exactly the tree's value width.
    pub value: Vec<u8>,
}

impl Entry {
    pub(crate) fn from_record(record: &[u8], key_len: usize) -> Self {
        Self {
            key: record[..key_len].to_vec(),
            value: record[key_len..].to_vec(),
        }
    }
}

/// Shape of a tree as observed by [`BTree::verify`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Levels from root to leaves; 0 for an empty tree.
    pub height: usize,
    /// Number of inner nodes.
    pub inner_nodes: usize,
    /// Number of leaves.
    pub leaves: usize,
    /// Number of entries across all leaves.
    pub entries: u64,
}

/// Ordered index over fixed-width keys and values.
///
/// Inner nodes are always held in memory. Leaves are reached through a
/// bounded leaf cache and, when the tree is backed by a [`PageStore`], are
/// written back and dropped as the cache fills. Key and value widths are
/// fixed by the first insert (or read back on [`BTree::open`]).
pub struct BTree {
    pub(super) root: Option<Child>,
    pub(super) nodes: NodeStore,
    options: BTreeOptions,
}

impl BTree {
    /// Memory-only tree: nothing is ever evicted or written.
    pub fn in_memory(options: BTreeOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            root: None,
            nodes: NodeStore::in_memory(&options),
            options,
        })
    }

    /// Starts an empty tree on `store`.
    pub fn create<S: PageStore + 'static>(store: S, options: BTreeOptions) -> Result<Self> {
        if store.root_page().is_some() {
            return Err(TreeError::InvalidConfig("page store already holds a tree"));
        }
        let options = options.page_size(store.page_size());
        options.validate()?;
        let nodes = NodeStore::backed(Box::new(store), &options)?;
        debug!(target: "pagetree::tree", page_size = options.page_size, "created tree");
        Ok(Self {
            root: None,
            nodes,
            options,
        })
    }

    /// Loads the tree recorded in `store`'s header, or an empty tree if none is.
    ///
    /// Every inner node is decoded up front; leaves stay on their pages until
    /// first touched.
    pub fn open<S: PageStore + 'static>(store: S, options: BTreeOptions) -> Result<Self> {
        let options = options.page_size(store.page_size());
        options.validate()?;
        let mut nodes = NodeStore::backed(Box::new(store), &options)?;
        let root = match nodes.stored_root() {
            Some(page) => Some(load_root(&mut nodes, page)?),
            None => None,
        };
        let tree = Self {
            root,
            nodes,
            options,
        };
        debug!(
            target: "pagetree::tree",
            root = ?tree.root_page(),
            height = tree.height(),
            "opened tree"
        );
        Ok(tree)
    }

    /// Writes every inner node breadth-first, then the dirty cached leaves,
    /// then the header naming the root.
    pub fn flush(&mut self) -> Result<()> {
        if !self.nodes.is_backed() {
            return Ok(());
        }
        let mut inner_written = 0usize;
        if let Some(Child::Inner(root)) = &self.root {
            let mut queue: VecDeque<&InnerNode> = VecDeque::from([&**root]);
            while let Some(node) = queue.pop_front() {
                self.nodes.write_inner(node)?;
                inner_written += 1;
                queue.extend(node.children.iter().filter_map(|child| match child {
                    Child::Inner(inner) => Some(&**inner),
                    Child::Leaf(_) => None,
                }));
            }
        }
        let leaves_written = self.nodes.flush_leaves()?;
        let root = self.root_page();
        self.nodes.persist_root(root)?;
        self.nodes.stats().inc_flushes();
        debug!(
            target: "pagetree::flush",
            root = ?root,
            inner = inner_written,
            leaves = leaves_written,
            "flushed tree"
        );
        Ok(())
    }

    /// Page holding the root node, if any entry was ever inserted.
    pub fn root_page(&self) -> Option<PageId> {
        self.root.as_ref().map(Child::page)
    }

    /// Levels from root to leaves; 0 when empty.
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut current = self.root.as_ref();
        while let Some(child) = current {
            height += 1;
            current = match child {
                Child::Inner(node) => node.children.first(),
                Child::Leaf(_) => None,
            };
        }
        height
    }

    /// True until the first insert.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Key width, once fixed.
    pub fn key_size(&self) -> Option<usize> {
        self.nodes.layout_opt().map(|layout| layout.key_size as usize)
    }

    /// Value width, once fixed.
    pub fn value_size(&self) -> Option<usize> {
        self.nodes.layout_opt().map(|layout| layout.value_size as usize)
    }

    /// Page size every node must fit in.
    pub fn page_size(&self) -> usize {
        self.nodes.page_size()
    }

    /// Options the tree was built with; `page_size` reflects the store's.
    pub fn options(&self) -> &BTreeOptions {
        &self.options
    }

    /// Access the live statistics counters for this tree.
    pub fn stats(&self) -> Arc<BTreeStats> {
        Arc::clone(self.nodes.stats())
    }

    /// Number of leaves currently resident in the leaf cache.
    pub fn cached_leaves(&self) -> usize {
        self.nodes.cache().len()
    }

    /// Flushes, then hands back the page store; `None` for memory-only trees.
    pub fn into_store(mut self) -> Result<Option<Box<dyn PageStore>>> {
        self.flush()?;
        Ok(self.nodes.into_store())
    }

    /// Walks the whole tree checking ordering, child counts, separator
    /// bounds, page fit, uniform leaf depth and the parent recorded on
    /// resident leaves.
    pub fn verify(&mut self) -> Result<VerifyReport> {
        let Some(root) = &self.root else {
            return Ok(VerifyReport::default());
        };
        let layout = self.nodes.layout()?;
        let mut walk = VerifyWalk {
            nodes: &mut self.nodes,
            layout,
            report: VerifyReport::default(),
            leaf_depth: None,
        };
        walk.child(root, None, 1, None, None)?;
        let mut report = walk.report;
        report.height = walk.leaf_depth.unwrap_or(0);
        Ok(report)
    }
}

fn load_root(nodes: &mut NodeStore, page: PageId) -> Result<Child> {
    let raw = nodes.read_raw(page)?;
    if raw.children == RawChildren::None {
        nodes.restore_layout(raw.key_size, raw.value_size)?;
        let mut leaf = LeafNode::new(page, raw.entries, None);
        leaf.dirty = false;
        nodes.insert_leaf(leaf)?;
        return Ok(Child::Leaf(page));
    }
    let key_size = raw.key_size;
    let root = load_inner(nodes, page, raw, key_size, 1)?;

    // Value width is only recorded on leaves.
    let mut leftmost = root.children.first();
    let leaf_page = loop {
        match leftmost {
            Some(Child::Inner(node)) => leftmost = node.children.first(),
            Some(Child::Leaf(page)) => break *page,
            None => return Err(TreeError::CorruptNode("inner node without children")),
        }
    };
    let leaf = nodes.read_raw(leaf_page)?;
    if leaf.children != RawChildren::None {
        return Err(TreeError::CorruptNode("leaf flag points at an inner node"));
    }
    if leaf.key_size != key_size {
        return Err(TreeError::CorruptNode("leaf key width differs from root"));
    }
    nodes.restore_layout(key_size, leaf.value_size)?;
    Ok(Child::Inner(Box::new(root)))
}

fn load_inner(
    nodes: &mut NodeStore,
    page: PageId,
    raw: RawNode,
    key_size: u8,
    depth: usize,
) -> Result<InnerNode> {
    if depth > MAX_LOAD_DEPTH {
        return Err(TreeError::CorruptNode("inner nodes nested too deeply"));
    }
    if raw.key_size != key_size {
        return Err(TreeError::CorruptNode("inner key width differs from root"));
    }
    let children = match raw.children {
        RawChildren::None => return Err(TreeError::CorruptNode("expected inner node, found leaf")),
        RawChildren::Leaves(ids) => ids.into_iter().map(Child::Leaf).collect(),
        RawChildren::Inner(ids) => {
            let mut children = Vec::with_capacity(ids.len());
            for id in ids {
                let child = nodes.read_raw(id)?;
                let node = load_inner(nodes, id, child, key_size, depth + 1)?;
                children.push(Child::Inner(Box::new(node)));
            }
            children
        }
    };
    Ok(InnerNode {
        page,
        keys: raw.entries,
        children,
    })
}

struct VerifyWalk<'a> {
    nodes: &'a mut NodeStore,
    layout: Layout,
    report: VerifyReport,
    leaf_depth: Option<usize>,
}

impl VerifyWalk<'_> {
    fn child(
        &mut self,
        child: &Child,
        parent: Option<PageId>,
        depth: usize,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) -> Result<()> {
        match child {
            Child::Leaf(page) => self.leaf(*page, parent, depth, lower, upper),
            Child::Inner(node) => self.inner(node, depth, lower, upper),
        }
    }

    fn inner(
        &mut self,
        node: &InnerNode,
        depth: usize,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) -> Result<()> {
        let key_len = self.layout.key_size as usize;
        self.report.inner_nodes += 1;
        if node.children.len() != node.keys.len() + 1 {
            return Err(TreeError::Invariant("inner node child count is not keys + 1"));
        }
        if node.keys.width() != key_len {
            return Err(TreeError::Invariant("inner key width differs from tree"));
        }
        let leaves = node.children_are_leaves();
        if node
            .children
            .iter()
            .any(|child| matches!(child, Child::Leaf(_)) != leaves)
        {
            return Err(TreeError::Invariant("inner node mixes leaf and inner children"));
        }
        if codec::inner_encoded_len(node) > self.page_size() {
            return Err(TreeError::Invariant("inner node exceeds its page"));
        }
        check_ordered(node.keys.iter(), key_len, lower, upper)?;

        for (idx, child) in node.children.iter().enumerate() {
            let child_lower = if idx == 0 { lower } else { Some(node.keys.key(idx - 1)) };
            let child_upper = if idx == node.keys.len() {
                upper
            } else {
                Some(node.keys.key(idx))
            };
            self.child(child, Some(node.page), depth + 1, child_lower, child_upper)?;
        }
        Ok(())
    }

    fn leaf(
        &mut self,
        page: PageId,
        parent: Option<PageId>,
        depth: usize,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) -> Result<()> {
        let key_len = self.layout.key_size as usize;
        let page_size = self.page_size();
        if let Some(recorded) = self.nodes.resident_parent(page) {
            if recorded != parent {
                return Err(TreeError::Invariant("resident leaf records the wrong parent"));
            }
        }
        let leaf = self.nodes.leaf_mut(page, parent)?;
        if leaf.entries.width() != self.layout.leaf_width() {
            return Err(TreeError::Invariant("leaf entry width differs from tree"));
        }
        if codec::leaf_encoded_len(&leaf.entries) > page_size {
            return Err(TreeError::Invariant("leaf exceeds its page"));
        }
        if leaf.entries.is_empty() {
            return Err(TreeError::Invariant("empty leaf"));
        }
        check_ordered(leaf.entries.iter(), key_len, lower, upper)?;
        self.report.leaves += 1;
        self.report.entries += leaf.entries.len() as u64;
        match self.leaf_depth {
            None => self.leaf_depth = Some(depth),
            Some(expected) if expected != depth => {
                return Err(TreeError::Invariant("leaves at different depths"));
            }
            Some(_) => {}
        }
        Ok(())
    }

    fn page_size(&self) -> usize {
        self.nodes.page_size()
    }
}

/// Records must be non-decreasing and within `[lower, upper]`.
fn check_ordered<'r>(
    records: impl Iterator<Item = &'r [u8]>,
    key_len: usize,
    lower: Option<&[u8]>,
    upper: Option<&[u8]>,
) -> Result<()> {
    let mut previous: Option<&[u8]> = lower;
    for record in records {
        if let Some(prev) = previous {
            if compare_prefix(prev, record, key_len).is_gt() {
                return Err(TreeError::Invariant("keys out of order"));
            }
        }
        if let Some(upper) = upper {
            if compare_prefix(record, upper, key_len).is_gt() {
                return Err(TreeError::Invariant("key above its separator"));
            }
        }
        previous = Some(record);
    }
    Ok(())
}
