use super::{check_page_size, padded_page, PageStore};
use crate::types::{PageId, Result, TreeError};

/// Page store held entirely in memory. Behaves like [`super::FilePager`]
/// without the file, which lets eviction and reload run in tests.
#[derive(Debug, Clone)]
pub struct MemPager {
    page_size: usize,
    pages: Vec<Vec<u8>>,
    root: Option<PageId>,
    persisted_root: Option<PageId>,
    reads: u64,
    writes: u64,
}

impl MemPager {
    /// Creates an empty store; page 0 is reserved for the header.
    pub fn new(page_size: usize) -> Result<Self> {
        check_page_size(page_size)?;
        Ok(Self {
            page_size,
            pages: vec![vec![0u8; page_size]],
            root: None,
            persisted_root: None,
            reads: 0,
            writes: 0,
        })
    }

    /// Number of page reads served so far.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Number of page writes accepted so far.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Root id as of the last [`PageStore::persist_header`].
    pub fn persisted_root(&self) -> Option<PageId> {
        self.persisted_root
    }

    fn slot(&self, id: PageId) -> Result<usize> {
        let idx = usize::try_from(id.0).map_err(|_| TreeError::Corruption("page id overflow"))?;
        if idx == 0 || idx >= self.pages.len() {
            return Err(TreeError::Corruption("page id outside allocated range"));
        }
        Ok(idx)
    }
}

impl PageStore for MemPager {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn allocate_page(&mut self) -> Result<PageId> {
        self.pages.push(vec![0u8; self.page_size]);
        Ok(PageId(self.pages.len() as u64 - 1))
    }

    fn read_page(&mut self, id: PageId) -> Result<Vec<u8>> {
        let idx = self.slot(id)?;
        self.reads += 1;
        Ok(self.pages[idx].clone())
    }

    fn write_page(&mut self, id: PageId, data: &[u8]) -> Result<()> {
        let idx = self.slot(id)?;
        self.pages[idx] = padded_page(self.page_size, data)?;
        self.writes += 1;
        Ok(())
    }

    fn root_page(&self) -> Option<PageId> {
        self.root
    }

    fn set_root_page(&mut self, root: Option<PageId>) {
        self.root = root;
    }

    fn persist_header(&mut self) -> Result<()> {
        self.persisted_root = self.root;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_start_after_header() -> Result<()> {
        let mut pager = MemPager::new(128)?;
        assert_eq!(pager.allocate_page()?, PageId(1));
        assert_eq!(pager.allocate_page()?, PageId(2));
        assert!(pager.read_page(PageId::HEADER).is_err());
        Ok(())
    }

    #[test]
    fn writes_are_padded_and_counted() -> Result<()> {
        let mut pager = MemPager::new(128)?;
        let id = pager.allocate_page()?;
        pager.write_page(id, &[7, 7])?;
        let page = pager.read_page(id)?;
        assert_eq!(page.len(), 128);
        assert_eq!(&page[..3], &[7, 7, 0]);
        assert_eq!((pager.reads(), pager.writes()), (1, 1));
        Ok(())
    }

    #[test]
    fn root_is_durable_only_after_persist() -> Result<()> {
        let mut pager = MemPager::new(128)?;
        let id = pager.allocate_page()?;
        pager.set_root_page(Some(id));
        assert_eq!(pager.persisted_root(), None);
        pager.persist_header()?;
        assert_eq!(pager.persisted_root(), Some(id));
        Ok(())
    }

    #[test]
    fn rejects_tiny_pages() {
        assert!(matches!(MemPager::new(16), Err(TreeError::InvalidConfig(_))));
    }
}
