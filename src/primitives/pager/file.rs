use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, warn};

use super::meta::{Meta, META_LEN};
use super::{check_page_size, padded_page, PageStore, PagerOptions};
use crate::types::{PageId, Result, TreeError};

/// File-backed page store. Page `n` lives at byte offset `n * page_size`.
pub struct FilePager {
    file: File,
    page_size: usize,
    meta: Meta,
    file_len: u64,
    sync_on_persist: bool,
}

impl FilePager {
    /// Creates (or truncates) the file at `path` and writes a fresh header.
    pub fn create(path: &Path, options: PagerOptions) -> Result<Self> {
        check_page_size(options.page_size)?;
        let page_size_u32 = u32::try_from(options.page_size)
            .map_err(|_| TreeError::InvalidConfig("page size exceeds u32::MAX"))?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let preallocate = options
            .capacity_hint_pages
            .saturating_add(1)
            .checked_mul(options.page_size as u64)
            .ok_or(TreeError::InvalidConfig("capacity hint overflows file size"))?;
        file.set_len(preallocate)?;
        let mut pager = Self {
            file,
            page_size: options.page_size,
            meta: Meta::new(page_size_u32),
            file_len: preallocate,
            sync_on_persist: options.sync_on_persist,
        };
        pager.persist_header()?;
        debug!(
            path = %path.display(),
            page_size = options.page_size,
            preallocated_pages = options.capacity_hint_pages,
            "created page file"
        );
        Ok(pager)
    }

    /// Opens an existing page file with default options.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, PagerOptions::default())
    }

    /// Opens an existing page file and validates its header. The page size
    /// always comes from the header; `options.page_size` and
    /// `options.capacity_hint_pages` are ignored.
    pub fn open_with(path: &Path, options: PagerOptions) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_len = file.metadata()?.len();
        let mut head = vec![0u8; META_LEN];
        file.seek(SeekFrom::Start(0))?;
        if let Err(err) = file.read_exact(&mut head) {
            warn!(path = %path.display(), "page file shorter than its header");
            return Err(err.into());
        }
        let meta = Meta::decode(&head).inspect_err(|err| {
            warn!(path = %path.display(), error = %err, "rejected page file header");
        })?;
        let page_size = meta.page_size as usize;
        check_page_size(page_size)?;
        debug!(
            path = %path.display(),
            page_size,
            next_page = meta.next_page.0,
            root = ?meta.root_page,
            "opened page file"
        );
        Ok(Self {
            file,
            page_size,
            meta,
            file_len,
            sync_on_persist: options.sync_on_persist,
        })
    }

    /// Current header contents.
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    fn page_offset(&self, id: PageId) -> Result<u64> {
        id.0
            .checked_mul(self.page_size as u64)
            .ok_or(TreeError::Corruption("page offset overflow"))
    }

    fn check_allocated(&self, id: PageId) -> Result<()> {
        if id == PageId::HEADER || id >= self.meta.next_page {
            return Err(TreeError::Corruption("page id outside allocated range"));
        }
        Ok(())
    }
}

impl PageStore for FilePager {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn allocate_page(&mut self) -> Result<PageId> {
        let id = self.meta.next_page;
        self.meta.next_page = PageId(
            id.0
                .checked_add(1)
                .ok_or(TreeError::Corruption("page id space exhausted"))?,
        );
        let zeroed = vec![0u8; self.page_size];
        self.write_page(id, &zeroed)?;
        Ok(id)
    }

    fn read_page(&mut self, id: PageId) -> Result<Vec<u8>> {
        self.check_allocated(id)?;
        let offset = self.page_offset(id)?;
        let mut buf = vec![0u8; self.page_size];
        if offset < self.file_len {
            self.file.seek(SeekFrom::Start(offset))?;
            let mut filled = 0;
            while filled < buf.len() {
                let n = self.file.read(&mut buf[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
        }
        Ok(buf)
    }

    fn write_page(&mut self, id: PageId, data: &[u8]) -> Result<()> {
        self.check_allocated(id)?;
        let page = padded_page(self.page_size, data)?;
        let offset = self.page_offset(id)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&page)?;
        let end = offset + page.len() as u64;
        if end > self.file_len {
            self.file_len = end;
        }
        Ok(())
    }

    fn root_page(&self) -> Option<PageId> {
        self.meta.root_page
    }

    fn set_root_page(&mut self, root: Option<PageId>) {
        self.meta.root_page = root;
    }

    fn persist_header(&mut self) -> Result<()> {
        let mut head = vec![0u8; self.page_size];
        self.meta.encode(&mut head)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&head)?;
        if self.file_len < self.page_size as u64 {
            self.file_len = self.page_size as u64;
        }
        if self.sync_on_persist {
            self.file.sync_data()?;
        }
        Ok(())
    }
}
