use std::ops::Range;

use crate::primitives::bytes::{get_u16_be, get_u32_be, get_u64_be, put_u16_be, put_u32_be, put_u64_be};
use crate::types::{PageId, Result, TreeError};

const MAGIC: &[u8; 8] = b"PGTREE\0\0";
const FORMAT_VERSION: u16 = 1;

const META_MAGIC: Range<usize> = 0..8;
const META_VERSION: Range<usize> = 8..10;
const META_RESERVED: Range<usize> = 10..12;
const META_PAGE_SIZE: Range<usize> = 12..16;
const META_NEXT_PAGE: Range<usize> = 16..24;
const META_ROOT_PAGE: Range<usize> = 24..32;
const META_CRC32: Range<usize> = 32..36;

/// Bytes of page 0 occupied by the header.
pub const META_LEN: usize = 36;

/// Store header kept in page 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Meta {
    /// Size of each page in bytes.
    pub page_size: u32,
    /// Next page id handed out by `allocate_page`.
    pub next_page: PageId,
    /// Page holding the tree root, if the tree has been flushed.
    pub root_page: Option<PageId>,
}

impl Meta {
    /// Header for a freshly created store.
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            next_page: PageId(1),
            root_page: None,
        }
    }

    /// Serializes the header into `dst`, which must span at least [`META_LEN`] bytes.
    pub fn encode(&self, dst: &mut [u8]) -> Result<()> {
        if dst.len() < META_LEN {
            return Err(TreeError::Corruption("header buffer too small"));
        }
        dst[..META_LEN].fill(0);
        dst[META_MAGIC].copy_from_slice(MAGIC);
        put_u16_be(&mut dst[META_VERSION], FORMAT_VERSION);
        put_u32_be(&mut dst[META_PAGE_SIZE], self.page_size);
        put_u64_be(&mut dst[META_NEXT_PAGE], self.next_page.0);
        put_u64_be(&mut dst[META_ROOT_PAGE], self.root_page.map_or(0, |p| p.0));
        let crc = crc32fast::hash(&dst[..META_CRC32.start]);
        put_u32_be(&mut dst[META_CRC32], crc);
        Ok(())
    }

    /// Parses and validates a header image.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < META_LEN {
            return Err(TreeError::Corruption("header page truncated"));
        }
        if &src[META_MAGIC] != MAGIC {
            return Err(TreeError::Corruption("invalid header magic"));
        }
        let version = get_u16_be(&src[META_VERSION]).ok_or(TreeError::Corruption("header truncated"))?;
        if version != FORMAT_VERSION {
            return Err(TreeError::Corruption("unsupported header format version"));
        }
        if src[META_RESERVED].iter().any(|&b| b != 0) {
            return Err(TreeError::Corruption("header reserved bytes not zero"));
        }
        let stored_crc = get_u32_be(&src[META_CRC32]).ok_or(TreeError::Corruption("header truncated"))?;
        if stored_crc != crc32fast::hash(&src[..META_CRC32.start]) {
            return Err(TreeError::Corruption("header checksum mismatch"));
        }
        let page_size = get_u32_be(&src[META_PAGE_SIZE]).ok_or(TreeError::Corruption("header truncated"))?;
        let next_page = get_u64_be(&src[META_NEXT_PAGE]).ok_or(TreeError::Corruption("header truncated"))?;
        let root = get_u64_be(&src[META_ROOT_PAGE]).ok_or(TreeError::Corruption("header truncated"))?;
        if next_page == 0 {
            return Err(TreeError::Corruption("header next page overlaps header"));
        }
        if root >= next_page {
            return Err(TreeError::Corruption("header root page was never allocated"));
        }
        Ok(Self {
            page_size,
            next_page: PageId(next_page),
            root_page: (root != 0).then_some(PageId(root)),
        })
    }
}
