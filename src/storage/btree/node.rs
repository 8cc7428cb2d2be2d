//! In-memory node model.
//!
//! Inner nodes own their inner children outright and refer to leaf children
//! by page id; leaves live in the [`super::cache::LeafCache`] and only know
//! their parent by page id.

use crate::types::PageId;

/// Width in bytes of a child page pointer inside an inner node.
pub const POINTER_LEN: usize = 8;

/// Ordered run of fixed-width records packed into one buffer.
///
/// Leaf entries are `key ++ value`; inner separators are bare keys. Only the
/// leading `key_len` bytes of a record take part in ordering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryList {
    width: usize,
    key_len: usize,
    buf: Vec<u8>,
}

impl EntryList {
    /// Empty list of `width`-byte records whose first `key_len` bytes are the key.
    pub fn new(width: usize, key_len: usize) -> Self {
        debug_assert!(key_len <= width);
        Self {
            width,
            key_len,
            buf: Vec::new(),
        }
    }

    /// Wraps an already ordered buffer of whole records.
    pub fn from_bytes(width: usize, key_len: usize, buf: Vec<u8>) -> Self {
        debug_assert!(width == 0 || buf.len() % width == 0);
        Self {
            width,
            key_len,
            buf,
        }
    }

    /// Bytes per record.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Key bytes at the head of each record.
    pub fn key_len(&self) -> usize {
        self.key_len
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.buf.len() / self.width
        }
    }

    /// True when no records are held.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Total record bytes, as counted against the page budget.
    pub fn byte_len(&self) -> usize {
        self.buf.len()
    }

    /// Raw packed records.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Record at `idx`.
    pub fn get(&self, idx: usize) -> &[u8] {
        let start = idx * self.width;
        &self.buf[start..start + self.width]
    }

    /// Key portion of the record at `idx`.
    pub fn key(&self, idx: usize) -> &[u8] {
        let start = idx * self.width;
        &self.buf[start..start + self.key_len]
    }

    /// Value portion of the record at `idx`.
    pub fn value(&self, idx: usize) -> &[u8] {
        let start = idx * self.width;
        &self.buf[start + self.key_len..start + self.width]
    }

    /// Inserts `record` so that it becomes index `idx`.
    pub fn insert(&mut self, idx: usize, record: &[u8]) {
        debug_assert_eq!(record.len(), self.width);
        let at = idx * self.width;
        self.buf.splice(at..at, record.iter().copied());
    }

    /// Removes and returns the record at `idx`.
    pub fn remove(&mut self, idx: usize) -> Vec<u8> {
        let start = idx * self.width;
        self.buf.drain(start..start + self.width).collect()
    }

    /// Appends every record of `other`, which must sort at or after this list's tail.
    pub fn append(&mut self, other: &EntryList) {
        debug_assert_eq!(other.width, self.width);
        self.buf.extend_from_slice(&other.buf);
    }

    /// Splits off records `[idx, len)` into a new list.
    pub fn split_off(&mut self, idx: usize) -> EntryList {
        let tail = self.buf.split_off(idx * self.width);
        EntryList::from_bytes(self.width, self.key_len, tail)
    }

    /// Iterates records in order.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.buf.chunks_exact(self.width.max(1))
    }
}

/// A leaf: ordered key/value entries, duplicates adjacent.
#[derive(Debug)]
pub struct LeafNode {
    /// Page this leaf is bound to for its whole life.
    pub page: PageId,
    /// Entries ordered by key.
    pub entries: EntryList,
    /// Inner node this leaf was last reached from; `None` while it is the root.
    pub parent: Option<PageId>,
    /// Set when `entries` differ from the stored page image.
    pub dirty: bool,
}

impl LeafNode {
    /// New, unsaved leaf.
    pub fn new(page: PageId, entries: EntryList, parent: Option<PageId>) -> Self {
        Self {
            page,
            entries,
            parent,
            dirty: true,
        }
    }
}

/// Child slot of an inner node.
#[derive(Debug)]
pub enum Child {
    /// Memory-resident inner node, owned by its parent.
    Inner(Box<InnerNode>),
    /// Leaf referenced by page id and resolved through the leaf cache.
    Leaf(PageId),
}

impl Child {
    /// Page the child is bound to.
    pub fn page(&self) -> PageId {
        match self {
            Child::Inner(node) => node.page,
            Child::Leaf(page) => *page,
        }
    }
}

/// Routing node: `keys.len() + 1` children, separator keys strictly ascending.
#[derive(Debug)]
pub struct InnerNode {
    /// Page this node is bound to.
    pub page: PageId,
    /// Separator keys.
    pub keys: EntryList,
    /// Child slots, all leaves or all inner nodes.
    pub children: Vec<Child>,
}

impl InnerNode {
    /// Whether the children are leaf page references.
    pub fn children_are_leaves(&self) -> bool {
        matches!(self.children.first(), Some(Child::Leaf(_)))
    }

    /// Bytes counted against the page budget: one key plus one pointer per separator.
    pub fn budget_bytes(&self) -> usize {
        self.keys.len() * (self.keys.width() + POINTER_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(keys: &[u8]) -> EntryList {
        let mut entries = EntryList::new(2, 1);
        for (idx, &k) in keys.iter().enumerate() {
            entries.insert(idx, &[k, k.wrapping_mul(2)]);
        }
        entries
    }

    #[test]
    fn records_split_into_key_and_value() {
        let entries = list(&[3, 5]);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.byte_len(), 4);
        assert_eq!(entries.get(1), &[5, 10]);
        assert_eq!(entries.key(1), &[5]);
        assert_eq!(entries.value(0), &[6]);
    }

    #[test]
    fn insert_in_the_middle_keeps_neighbours() {
        let mut entries = list(&[1, 3]);
        entries.insert(1, &[2, 0]);
        let keys: Vec<u8> = entries.iter().map(|r| r[0]).collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn split_off_moves_tail() {
        let mut entries = list(&[1, 2, 3, 4, 5]);
        let tail = entries.split_off(3);
        assert_eq!(entries.len(), 3);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.key(0), &[4]);
        assert_eq!(tail.width(), 2);
    }

    #[test]
    fn remove_returns_record() {
        let mut entries = list(&[1, 2, 3]);
        assert_eq!(entries.remove(1), vec![2, 4]);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.key(1), &[3]);
    }
}
