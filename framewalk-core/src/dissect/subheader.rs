//! Sub-header bitmap map.
//!
//! Compound headers (IPv4 options, IPv6 extension headers, TCP options)
//! record their optional sub-structures here: a 64-bit presence bitmap plus
//! parallel offset and length arrays indexed by sub-header id. Offsets are
//! relative to the start of the owning header.

use std::fmt;

use crate::error::DissectError;

/// Maximum number of distinct sub-header ids per header.
pub const MAX_SUB_HEADERS: usize = 64;

/// Fixed-width map of sub-headers found inside one header.
#[derive(Clone)]
pub struct SubHeaderMap {
    present: u64,
    offsets: [u16; MAX_SUB_HEADERS],
    lengths: [u16; MAX_SUB_HEADERS],
}

impl SubHeaderMap {
    pub const fn new() -> Self {
        Self {
            present: 0,
            offsets: [0; MAX_SUB_HEADERS],
            lengths: [0; MAX_SUB_HEADERS],
        }
    }

    /// Record sub-header `id` at `offset` with `length` bytes.
    ///
    /// Returns `Ok(false)` if the id was already set; the first value is
    /// kept. Ids at or past [`MAX_SUB_HEADERS`] are rejected.
    pub fn insert(&mut self, id: usize, offset: usize, length: usize) -> Result<bool, DissectError> {
        if id >= MAX_SUB_HEADERS {
            return Err(DissectError::SubHeaderLimit {
                id,
                capacity: MAX_SUB_HEADERS,
            });
        }
        let (Ok(off), Ok(len)) = (u16::try_from(offset), u16::try_from(length)) else {
            return Err(DissectError::SubHeaderRange { id, offset, length });
        };
        let bit = 1u64 << id;
        if self.present & bit != 0 {
            return Ok(false);
        }
        self.present |= bit;
        self.offsets[id] = off;
        self.lengths[id] = len;
        Ok(true)
    }

    #[inline]
    pub fn contains(&self, id: usize) -> bool {
        id < MAX_SUB_HEADERS && self.present & (1u64 << id) != 0
    }

    /// Offset and length of sub-header `id`, if present.
    pub fn get(&self, id: usize) -> Option<(usize, usize)> {
        self.contains(id)
            .then(|| (self.offsets[id] as usize, self.lengths[id] as usize))
    }

    /// Raw presence bitmap.
    #[inline]
    pub fn bitmap(&self) -> u64 {
        self.present
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.present.count_ones() as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.present == 0
    }

    /// Present sub-headers as `(id, offset, length)`, ascending by id.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        let mut remaining = self.present;
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            let id = remaining.trailing_zeros() as usize;
            remaining &= remaining - 1;
            Some((id, self.offsets[id] as usize, self.lengths[id] as usize))
        })
    }

    /// Forget every entry; the arrays are left as-is.
    pub fn clear(&mut self) {
        self.present = 0;
    }
}

impl Default for SubHeaderMap {
    fn default() -> Self {
        Self::new()
    }
}

// Stale slots left behind by `clear` do not take part in equality.
impl PartialEq for SubHeaderMap {
    fn eq(&self, other: &Self) -> bool {
        self.present == other.present && self.iter().eq(other.iter())
    }
}

impl Eq for SubHeaderMap {}

impl fmt::Debug for SubHeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(id, off, len)| (id, (off, len))))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut map = SubHeaderMap::new();
        assert!(map.insert(3, 20, 4).unwrap());
        assert!(map.insert(0, 24, 1).unwrap());

        assert_eq!(map.get(3), Some((20, 4)));
        assert_eq!(map.get(0), Some((24, 1)));
        assert_eq!(map.get(1), None);
        assert_eq!(map.len(), 2);
        assert_eq!(map.bitmap(), 0b1001);
    }

    #[test]
    fn test_first_value_wins() {
        let mut map = SubHeaderMap::new();
        assert!(map.insert(5, 10, 2).unwrap());
        assert!(!map.insert(5, 30, 8).unwrap());
        assert_eq!(map.get(5), Some((10, 2)));
    }

    #[test]
    fn test_cap_enforced() {
        let mut map = SubHeaderMap::new();
        assert!(map.insert(63, 0, 1).unwrap());
        assert_eq!(
            map.insert(64, 0, 1),
            Err(DissectError::SubHeaderLimit { id: 64, capacity: 64 })
        );
        assert!(!map.contains(64));
        assert_eq!(map.get(200), None);
    }

    #[test]
    fn test_offset_range_enforced() {
        let mut map = SubHeaderMap::new();
        assert!(matches!(
            map.insert(1, 70_000, 1),
            Err(DissectError::SubHeaderRange { id: 1, .. })
        ));
        assert!(map.is_empty());
    }

    #[test]
    fn test_iter_ascending() {
        let mut map = SubHeaderMap::new();
        map.insert(40, 8, 2).unwrap();
        map.insert(2, 0, 4).unwrap();
        map.insert(17, 4, 4).unwrap();
        let ids: Vec<usize> = map.iter().map(|(id, _, _)| id).collect();
        assert_eq!(ids, vec![2, 17, 40]);
    }

    #[test]
    fn test_clear() {
        let mut map = SubHeaderMap::new();
        map.insert(1, 0, 1).unwrap();
        map.clear();
        assert!(map.is_empty());
        assert!(map.insert(1, 5, 5).unwrap());
        assert_eq!(map.get(1), Some((5, 5)));
    }
}
