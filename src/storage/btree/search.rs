//! Binary search over ordered record lists.

use std::cmp::Ordering;

use super::node::EntryList;

/// Compares the first `len` bytes of `probe` and `record`.
///
/// Order is unsigned lexicographic: each byte counts as `0..=255`, so `0x80`
/// sorts after `0x7f`.
#[inline]
pub fn compare_prefix(probe: &[u8], record: &[u8], len: usize) -> Ordering {
    probe[..len].cmp(&record[..len])
}

/// Match-or-insertion-point search.
///
/// Returns `i` where either `list[i]` equals `probe` over `len` bytes (any
/// member of a duplicate run) or `list[i - 1] < probe <= list[i]`, with
/// `list.len()` meaning after every record. Callers that need a whole
/// duplicate run scan outward from the result.
pub fn find_index(list: &EntryList, probe: &[u8], len: usize) -> usize {
    debug_assert!(len <= probe.len() && len <= list.key_len());
    if list.is_empty() {
        return 0;
    }
    let mut start = 0;
    let mut end = list.len() - 1;
    loop {
        if start == end {
            return match compare_prefix(probe, list.get(start), len) {
                Ordering::Greater => start + 1,
                Ordering::Less | Ordering::Equal => start,
            };
        }
        let mid = (start + end) / 2;
        match compare_prefix(probe, list.get(mid), len) {
            Ordering::Equal => return mid,
            Ordering::Less => end = mid,
            Ordering::Greater => start = mid + 1,
        }
    }
}

/// First index whose record is not below `probe` over `len` bytes.
pub fn first_not_below(list: &EntryList, probe: &[u8], len: usize) -> usize {
    let mut idx = find_index(list, probe, len);
    while idx > 0 && compare_prefix(probe, list.get(idx - 1), len) == Ordering::Equal {
        idx -= 1;
    }
    idx
}

/// First index whose record is above `probe` over `len` bytes.
pub fn first_above(list: &EntryList, probe: &[u8], len: usize) -> usize {
    let mut idx = find_index(list, probe, len);
    while idx < list.len() && compare_prefix(probe, list.get(idx), len) == Ordering::Equal {
        idx += 1;
    }
    idx
}
