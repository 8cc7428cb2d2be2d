//! Insertion with cascading splits.
//!
//! A leaf that outgrows its page keeps entries `[0, mid]` and moves the rest
//! to a new right sibling; the key at `mid` is promoted as the separator and
//! stays in the left leaf. An inner node that outgrows its page gives up the
//! key at `mid` entirely: it moves to the parent and neither half keeps it.

use tracing::trace;

use super::node::{Child, EntryList, InnerNode, LeafNode};
use super::options::Layout;
use super::search::find_index;
use super::store::NodeStore;
use super::tree::BTree;
use crate::types::{PageId, Result, TreeError};

/// Separator and new right sibling produced by a split, headed for the parent.
struct Promotion {
    separator: Vec<u8>,
    right: Child,
}

impl BTree {
    /// Inserts one entry. Duplicate keys are kept side by side.
    ///
    /// The first insert fixes the key and value widths for the life of the
    /// tree; later inserts must match them exactly.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let layout = match self.nodes.layout_opt() {
            Some(layout) => {
                if key.len() != layout.key_size as usize {
                    return Err(TreeError::KeyLengthMismatch {
                        expected: layout.key_size as usize,
                        actual: key.len(),
                    });
                }
                if value.len() != layout.value_size as usize {
                    return Err(TreeError::ValueLengthMismatch {
                        expected: layout.value_size as usize,
                        actual: value.len(),
                    });
                }
                layout
            }
            None => self.nodes.fix_layout(key.len(), value.len())?,
        };
        let mut record = Vec::with_capacity(layout.leaf_width());
        record.extend_from_slice(key);
        record.extend_from_slice(value);

        let promotion = match self.root.as_mut() {
            None => {
                let page = self.nodes.allocate_page()?;
                let entries = EntryList::from_bytes(layout.leaf_width(), layout.key_size as usize, record);
                self.nodes.insert_leaf(LeafNode::new(page, entries, None))?;
                self.root = Some(Child::Leaf(page));
                trace!(target: "pagetree::split", page = page.0, "created root leaf");
                None
            }
            Some(root) => insert_into_child(&mut self.nodes, root, None, &record, layout)?,
        };
        if let Some(promotion) = promotion {
            self.grow_root(promotion, layout)?;
        }
        self.nodes.stats().inc_inserts();
        Ok(())
    }

    /// Puts a new inner root above the old root and its new sibling.
    fn grow_root(&mut self, promotion: Promotion, layout: Layout) -> Result<()> {
        let page = match self.nodes.allocate_page() {
            Ok(page) => page,
            Err(err) => {
                self.rejoin_root(promotion)?;
                return Err(err);
            }
        };
        let left = self
            .root
            .take()
            .ok_or(TreeError::Invariant("root split on an empty tree"))?;
        let key_len = layout.key_size as usize;
        let mut keys = EntryList::new(key_len, key_len);
        keys.insert(0, &promotion.separator);
        let root = InnerNode {
            page,
            keys,
            children: vec![left, promotion.right],
        };
        if root.children_are_leaves() {
            for child in &root.children {
                self.nodes.set_parent_if_resident(child.page(), Some(page));
            }
        }
        self.root = Some(Child::Inner(Box::new(root)));
        trace!(
            target: "pagetree::split",
            page = page.0,
            height = self.height(),
            "grew new root"
        );
        Ok(())
    }

    /// Folds a split root back together when no page is left for a new
    /// root. The root stays over budget until the next insert splits it.
    fn rejoin_root(&mut self, promotion: Promotion) -> Result<()> {
        let Promotion { separator, right } = promotion;
        match (self.root.as_mut(), right) {
            (Some(Child::Leaf(left)), Child::Leaf(right)) => {
                let left = *left;
                let right = self.nodes.discard_leaf(right)?;
                let leaf = self.nodes.leaf_mut(left, None)?;
                leaf.entries.append(&right.entries);
                leaf.dirty = true;
            }
            (Some(Child::Inner(left)), Child::Inner(right)) => {
                let right = *right;
                let at = left.keys.len();
                left.keys.insert(at, &separator);
                left.keys.append(&right.keys);
                for child in &right.children {
                    if let Child::Leaf(leaf) = child {
                        self.nodes.set_parent_if_resident(*leaf, Some(left.page));
                    }
                }
                left.children.extend(right.children);
            }
            _ => return Err(TreeError::Invariant("split sibling does not match the root")),
        }
        trace!(target: "pagetree::split", "rejoined root after failed allocation");
        Ok(())
    }
}

fn insert_into_child(
    nodes: &mut NodeStore,
    child: &mut Child,
    parent: Option<PageId>,
    record: &[u8],
    layout: Layout,
) -> Result<Option<Promotion>> {
    match child {
        Child::Leaf(page) => insert_into_leaf(nodes, *page, parent, record, layout),
        Child::Inner(node) => insert_into_inner(nodes, node, record, layout),
    }
}

fn insert_into_inner(
    nodes: &mut NodeStore,
    node: &mut InnerNode,
    record: &[u8],
    layout: Layout,
) -> Result<Option<Promotion>> {
    let idx = find_index(&node.keys, record, layout.key_size as usize);
    let parent = Some(node.page);
    let child = node
        .children
        .get_mut(idx)
        .ok_or(TreeError::Invariant("branch index past last child"))?;
    let Some(Promotion { separator, right }) =
        insert_into_child(nodes, child, parent, record, layout)?
    else {
        return Ok(None);
    };

    // The split child stays at `idx`; its new sibling lands just after it.
    node.keys.insert(idx, &separator);
    node.children.insert(idx + 1, right);
    if node.budget_bytes() > layout.budget {
        return split_inner(nodes, node).map(Some);
    }
    Ok(None)
}

fn insert_into_leaf(
    nodes: &mut NodeStore,
    page: PageId,
    parent: Option<PageId>,
    record: &[u8],
    layout: Layout,
) -> Result<Option<Promotion>> {
    let leaf = nodes.leaf_mut(page, parent)?;
    let idx = find_index(&leaf.entries, record, layout.key_size as usize);
    let was_dirty = leaf.dirty;
    leaf.entries.insert(idx, record);
    leaf.dirty = true;
    if leaf.entries.byte_len() <= layout.budget {
        return Ok(None);
    }

    let mid = leaf.entries.len() / 2;
    let separator = leaf.entries.key(mid).to_vec();
    let right_entries = leaf.entries.split_off(mid + 1);
    let left_len = leaf.entries.len();
    let right_len = right_entries.len();

    // Placing the right half may evict, and a failed eviction flush leaves
    // the cache untouched, so the left half is still resident here.
    let placed = nodes.allocate_page().and_then(|right_page| {
        nodes
            .insert_leaf(LeafNode::new(right_page, right_entries.clone(), parent))
            .map(|()| right_page)
    });
    let right_page = match placed {
        Ok(right_page) => right_page,
        Err(err) => {
            let leaf = nodes.resident_leaf_mut(page)?;
            leaf.entries.append(&right_entries);
            leaf.entries.remove(idx);
            leaf.dirty = was_dirty;
            return Err(err);
        }
    };
    nodes.stats().inc_leaf_splits();
    trace!(
        target: "pagetree::split",
        left = page.0,
        right = right_page.0,
        left_len,
        right_len,
        "split leaf"
    );
    Ok(Some(Promotion {
        separator,
        right: Child::Leaf(right_page),
    }))
}

fn split_inner(nodes: &mut NodeStore, node: &mut InnerNode) -> Result<Promotion> {
    let right_page = nodes.allocate_page()?;
    let mid = node.keys.len() / 2;
    let mut right_keys = node.keys.split_off(mid);
    let separator = right_keys.remove(0);
    let right_children = node.children.split_off(mid + 1);
    for child in &right_children {
        if let Child::Leaf(leaf) = child {
            nodes.set_parent_if_resident(*leaf, Some(right_page));
        }
    }
    let right = InnerNode {
        page: right_page,
        keys: right_keys,
        children: right_children,
    };
    nodes.stats().inc_inner_splits();
    trace!(
        target: "pagetree::split",
        left = node.page.0,
        right = right_page.0,
        left_keys = node.keys.len(),
        right_keys = right.keys.len(),
        "split inner node"
    );
    Ok(Promotion {
        separator,
        right: Child::Inner(Box::new(right)),
    })
}
