#![forbid(unsafe_code)]
//! Fixed-size page storage consumed by the B-tree.
//!
//! A [`PageStore`] hands out page identities, moves raw page images in and
//! out, and remembers which page holds the tree root. Page 0 always belongs
//! to the store header, so a root id of 0 means "no root".

mod file;
mod mem;
mod meta;

pub use file::FilePager;
pub use mem::MemPager;
pub use meta::{Meta, META_LEN};

use serde::{Deserialize, Serialize};

use crate::types::{PageId, Result};

/// Default page size for new stores.
pub const DEFAULT_PAGE_SIZE: usize = 4096;
/// Smallest page the header and a node header can share.
pub const MIN_PAGE_SIZE: usize = 64;
/// Largest page addressable by the node codec's 16-bit counters.
pub const MAX_PAGE_SIZE: usize = 65536;

/// Page allocation and raw page I/O.
pub trait PageStore: Send {
    /// Size in bytes of every page in this store.
    fn page_size(&self) -> usize;

    /// Allocates a fresh zeroed page with a unique id.
    fn allocate_page(&mut self) -> Result<PageId>;

    /// Reads the full image of page `id`.
    fn read_page(&mut self, id: PageId) -> Result<Vec<u8>>;

    /// Writes `data` to page `id`, zero-padding to the page size.
    fn write_page(&mut self, id: PageId, data: &[u8]) -> Result<()>;

    /// Root page currently recorded in the header.
    fn root_page(&self) -> Option<PageId>;

    /// Records the root page id; durable only after [`PageStore::persist_header`].
    fn set_root_page(&mut self, root: Option<PageId>);

    /// Writes the header (root id and allocation metadata) to storage.
    fn persist_header(&mut self) -> Result<()>;
}

impl<S: PageStore + ?Sized> PageStore for Box<S> {
    fn page_size(&self) -> usize {
        (**self).page_size()
    }

    fn allocate_page(&mut self) -> Result<PageId> {
        (**self).allocate_page()
    }

    fn read_page(&mut self, id: PageId) -> Result<Vec<u8>> {
        (**self).read_page(id)
    }

    fn write_page(&mut self, id: PageId, data: &[u8]) -> Result<()> {
        (**self).write_page(id, data)
    }

    fn root_page(&self) -> Option<PageId> {
        (**self).root_page()
    }

    fn set_root_page(&mut self, root: Option<PageId>) {
        (**self).set_root_page(root)
    }

    fn persist_header(&mut self) -> Result<()> {
        (**self).persist_header()
    }
}

/// Options for creating a page store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagerOptions {
    /// Size of each page in bytes.
    pub page_size: usize,
    /// Number of pages to preallocate on creation.
    pub capacity_hint_pages: u64,
    /// Whether `persist_header` also syncs file data to disk.
    pub sync_on_persist: bool,
}

impl Default for PagerOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            capacity_hint_pages: 0,
            sync_on_persist: true,
        }
    }
}

impl PagerOptions {
    /// Sets the page size.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the number of pages to preallocate.
    pub fn capacity_hint_pages(mut self, pages: u64) -> Self {
        self.capacity_hint_pages = pages;
        self
    }

    /// Sets whether header persists also sync file data.
    pub fn sync_on_persist(mut self, sync: bool) -> Self {
        self.sync_on_persist = sync;
        self
    }
}

pub(crate) fn check_page_size(page_size: usize) -> Result<()> {
    if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(crate::types::TreeError::InvalidConfig(
            "page size must be between 64 and 65536 bytes",
        ));
    }
    Ok(())
}

/// Builds a full page image from a shorter payload.
pub(crate) fn padded_page(page_size: usize, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() > page_size {
        return Err(crate::types::TreeError::InvalidConfig(
            "page write larger than page size",
        ));
    }
    let mut page = vec![0u8; page_size];
    page[..data.len()].copy_from_slice(data);
    Ok(page)
}
