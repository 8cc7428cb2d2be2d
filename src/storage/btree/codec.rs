//! Page encoding for tree nodes.
//!
//! ```text
//! 0..2   entry count (u16 BE)
//! 2..4   child count (u16 BE); bit 15 set when children are leaves
//! 4      key size
//! 5      value size (0 for inner nodes)
//! 6..    entries, entry_count * (key_size + value_size) bytes
//! ..     children, child_count * 8 bytes of page id (u64 BE)
//! ```

use crate::primitives::bytes::{get_u16_be, get_u64_be, put_u16_be, put_u64_be};
use crate::types::{PageId, Result, TreeError};

use super::node::{EntryList, InnerNode, LeafNode, POINTER_LEN};

/// Fixed bytes preceding the entries.
pub const NODE_HEADER_LEN: usize = 6;

const LEAF_CHILDREN_FLAG: u16 = 0x8000;
const CHILD_COUNT_MASK: u16 = 0x7fff;

/// Children as stored on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawChildren {
    /// Leaf node: no children.
    None,
    /// Inner node whose children are leaves, resolved lazily.
    Leaves(Vec<PageId>),
    /// Inner node whose children are inner nodes, decoded eagerly by the loader.
    Inner(Vec<PageId>),
}

/// A decoded page, before child resolution.
#[derive(Debug, Clone)]
pub struct RawNode {
    /// Key width recorded on the page.
    pub key_size: u8,
    /// Value width recorded on the page.
    pub value_size: u8,
    /// Entries (leaf) or separator keys (inner).
    pub entries: EntryList,
    /// Child page ids.
    pub children: RawChildren,
}

/// Bytes a leaf with these entries occupies on its page.
pub fn leaf_encoded_len(entries: &EntryList) -> usize {
    NODE_HEADER_LEN + entries.byte_len()
}

/// Bytes an inner node occupies on its page.
pub fn inner_encoded_len(node: &InnerNode) -> usize {
    NODE_HEADER_LEN + node.keys.byte_len() + node.children.len() * POINTER_LEN
}

/// Encodes a leaf.
pub fn encode_leaf(leaf: &LeafNode, key_size: u8, value_size: u8) -> Result<Vec<u8>> {
    encode_parts(&leaf.entries, key_size, value_size, 0, &[])
}

/// Encodes an inner node; children are written as page ids.
pub fn encode_inner(node: &InnerNode, key_size: u8) -> Result<Vec<u8>> {
    let flag = if node.children_are_leaves() {
        LEAF_CHILDREN_FLAG
    } else {
        0
    };
    let children: Vec<PageId> = node.children.iter().map(|child| child.page()).collect();
    encode_parts(&node.keys, key_size, 0, flag, &children)
}

fn encode_parts(
    entries: &EntryList,
    key_size: u8,
    value_size: u8,
    child_flag: u16,
    children: &[PageId],
) -> Result<Vec<u8>> {
    if entries.width() != key_size as usize + value_size as usize {
        return Err(TreeError::Invariant("entry width disagrees with node layout"));
    }
    let entry_count =
        u16::try_from(entries.len()).map_err(|_| TreeError::Invariant("too many entries for one page"))?;
    let child_count = u16::try_from(children.len())
        .ok()
        .filter(|count| count & LEAF_CHILDREN_FLAG == 0)
        .ok_or(TreeError::Invariant("too many children for one page"))?;

    let mut buf = vec![0u8; NODE_HEADER_LEN + entries.byte_len() + children.len() * POINTER_LEN];
    put_u16_be(&mut buf[0..2], entry_count);
    put_u16_be(&mut buf[2..4], child_count | child_flag);
    buf[4] = key_size;
    buf[5] = value_size;
    let entries_end = NODE_HEADER_LEN + entries.byte_len();
    buf[NODE_HEADER_LEN..entries_end].copy_from_slice(entries.as_bytes());
    for (slot, child) in buf[entries_end..].chunks_exact_mut(POINTER_LEN).zip(children) {
        put_u64_be(slot, child.0);
    }
    Ok(buf)
}

/// Decodes a page image.
pub fn decode(page: &[u8]) -> Result<RawNode> {
    let truncated = TreeError::CorruptNode("node header truncated");
    if page.len() < NODE_HEADER_LEN {
        return Err(truncated);
    }
    let entry_count = get_u16_be(&page[0..2]).ok_or(truncated)? as usize;
    let raw_children = get_u16_be(&page[2..4]).ok_or(TreeError::CorruptNode("node header truncated"))?;
    let children_are_leaves = raw_children & LEAF_CHILDREN_FLAG != 0;
    let child_count = (raw_children & CHILD_COUNT_MASK) as usize;
    let key_size = page[4];
    let value_size = page[5];

    if key_size == 0 {
        return Err(TreeError::CorruptNode("zero key size"));
    }
    if child_count == 0 && children_are_leaves {
        return Err(TreeError::CorruptNode("leaf flag without children"));
    }
    if child_count > 0 {
        if value_size != 0 {
            return Err(TreeError::CorruptNode("inner node with value bytes"));
        }
        if child_count != entry_count + 1 {
            return Err(TreeError::CorruptNode("child count does not match key count"));
        }
    }

    let width = key_size as usize + value_size as usize;
    let entries_end = NODE_HEADER_LEN + entry_count * width;
    let children_end = entries_end + child_count * POINTER_LEN;
    if children_end > page.len() {
        return Err(TreeError::CorruptNode("declared sizes exceed page"));
    }

    let entries = EntryList::from_bytes(
        width,
        key_size as usize,
        page[NODE_HEADER_LEN..entries_end].to_vec(),
    );
    let mut ids = Vec::with_capacity(child_count);
    for slot in page[entries_end..children_end].chunks_exact(POINTER_LEN) {
        let id = get_u64_be(slot).ok_or(TreeError::CorruptNode("child pointer truncated"))?;
        if id == PageId::HEADER.0 {
            return Err(TreeError::CorruptNode("child points at header page"));
        }
        ids.push(PageId(id));
    }
    let children = match (child_count, children_are_leaves) {
        (0, _) => RawChildren::None,
        (_, true) => RawChildren::Leaves(ids),
        (_, false) => RawChildren::Inner(ids),
    };
    Ok(RawNode {
        key_size,
        value_size,
        entries,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::btree::node::Child;

    fn leaf(records: &[[u8; 3]]) -> LeafNode {
        let mut entries = EntryList::new(3, 2);
        for (idx, record) in records.iter().enumerate() {
            entries.insert(idx, record);
        }
        LeafNode::new(PageId(4), entries, None)
    }

    #[test]
    fn leaf_layout_is_byte_exact() -> Result<()> {
        let node = leaf(&[[0, 1, 9], [0, 2, 8]]);
        let page = encode_leaf(&node, 2, 1)?;
        assert_eq!(page, vec![0, 2, 0, 0, 2, 1, 0, 1, 9, 0, 2, 8]);
        assert_eq!(page.len(), leaf_encoded_len(&node.entries));

        let raw = decode(&page)?;
        assert_eq!((raw.key_size, raw.value_size), (2, 1));
        assert_eq!(raw.children, RawChildren::None);
        assert_eq!(raw.entries, node.entries);
        Ok(())
    }

    #[test]
    fn inner_with_leaf_children_sets_top_bit() -> Result<()> {
        let node = InnerNode {
            page: PageId(3),
            keys: EntryList::from_bytes(2, 2, vec![0, 5]),
            children: vec![Child::Leaf(PageId(1)), Child::Leaf(PageId(2))],
        };
        let page = encode_inner(&node, 2)?;
        assert_eq!(&page[..6], &[0, 1, 0x80, 2, 2, 0]);
        assert_eq!(&page[8..16], &1u64.to_be_bytes());
        assert_eq!(&page[16..24], &2u64.to_be_bytes());
        assert_eq!(page.len(), inner_encoded_len(&node));

        let raw = decode(&page)?;
        assert_eq!(raw.children, RawChildren::Leaves(vec![PageId(1), PageId(2)]));
        Ok(())
    }

    #[test]
    fn inner_with_inner_children_clears_top_bit() -> Result<()> {
        let child = |page: u64| {
            Child::Inner(Box::new(InnerNode {
                page: PageId(page),
                keys: EntryList::new(1, 1),
                children: vec![Child::Leaf(PageId(page + 100))],
            }))
        };
        let node = InnerNode {
            page: PageId(1),
            keys: EntryList::from_bytes(1, 1, vec![7]),
            children: vec![child(2), child(3)],
        };
        let page = encode_inner(&node, 1)?;
        assert_eq!(page[2] & 0x80, 0);
        assert_eq!(
            decode(&page)?.children,
            RawChildren::Inner(vec![PageId(2), PageId(3)])
        );
        Ok(())
    }

    #[test]
    fn trailing_page_bytes_are_ignored() -> Result<()> {
        let mut page = encode_leaf(&leaf(&[[1, 1, 1]]), 2, 1)?;
        page.resize(256, 0);
        assert_eq!(decode(&page)?.entries.len(), 1);
        Ok(())
    }

    #[test]
    fn oversized_counts_are_corrupt() {
        let page = [0u8, 200, 0, 0, 4, 4, 1, 2, 3];
        assert!(matches!(
            decode(&page),
            Err(TreeError::CorruptNode("declared sizes exceed page"))
        ));
    }

    #[test]
    fn inconsistent_headers_are_corrupt() {
        assert!(matches!(decode(&[0, 0]), Err(TreeError::CorruptNode(_))));
        assert!(matches!(
            decode(&[0, 0, 0, 0, 0, 0]),
            Err(TreeError::CorruptNode("zero key size"))
        ));
        assert!(matches!(
            decode(&[0, 1, 0, 5, 1, 0, 9]),
            Err(TreeError::CorruptNode("child count does not match key count"))
        ));
        assert!(matches!(
            decode(&[0, 0, 0x80, 1, 1, 4, 0, 0, 0, 0, 0, 0, 0, 1]),
            Err(TreeError::CorruptNode("inner node with value bytes"))
        ));
    }
}
