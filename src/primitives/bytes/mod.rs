#![forbid(unsafe_code)]
//! Fixed-width big-endian integer encoding shared by the node codec and the
//! store header.

use core::convert::TryInto;

const U16_LEN: usize = core::mem::size_of::<u16>();
const U32_LEN: usize = core::mem::size_of::<u32>();
const U64_LEN: usize = core::mem::size_of::<u64>();

/// Writes `v` big-endian into the first two bytes of `dst`.
pub fn put_u16_be(dst: &mut [u8], v: u16) {
    assert!(dst.len() >= U16_LEN, "destination too small");
    dst[..U16_LEN].copy_from_slice(&v.to_be_bytes());
}

/// Writes `v` big-endian into the first four bytes of `dst`.
pub fn put_u32_be(dst: &mut [u8], v: u32) {
    assert!(dst.len() >= U32_LEN, "destination too small");
    dst[..U32_LEN].copy_from_slice(&v.to_be_bytes());
}

/// Writes `v` big-endian into the first eight bytes of `dst`.
pub fn put_u64_be(dst: &mut [u8], v: u64) {
    assert!(dst.len() >= U64_LEN, "destination too small");
    dst[..U64_LEN].copy_from_slice(&v.to_be_bytes());
}

/// Reads a big-endian u16 from the head of `src`, or `None` if it is short.
pub fn get_u16_be(src: &[u8]) -> Option<u16> {
    let bytes: [u8; U16_LEN] = src.get(..U16_LEN)?.try_into().ok()?;
    Some(u16::from_be_bytes(bytes))
}

/// Reads a big-endian u32 from the head of `src`, or `None` if it is short.
pub fn get_u32_be(src: &[u8]) -> Option<u32> {
    let bytes: [u8; U32_LEN] = src.get(..U32_LEN)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Reads a big-endian u64 from the head of `src`, or `None` if it is short.
pub fn get_u64_be(src: &[u8]) -> Option<u64> {
    let bytes: [u8; U64_LEN] = src.get(..U64_LEN)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Encodes a u64 as the 8-byte big-endian key used by the CLI and tests.
pub fn u64_key(v: u64) -> [u8; U64_LEN] {
    v.to_be_bytes()
}
