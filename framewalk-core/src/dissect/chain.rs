//! Header records and the header chain scratch buffer.

use std::ops::Range;

use super::subheader::SubHeaderMap;
use crate::error::DissectError;
use crate::protocol::ProtocolId;

/// Default cap on the number of headers in one chain.
pub const DEFAULT_MAX_HEADERS: usize = 64;

/// One decoded header: a view into the packet buffer, owning no bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderRecord {
    pub id: ProtocolId,
    pub offset: usize,
    pub length: usize,
    sub_headers: Option<u16>,
}

impl HeaderRecord {
    pub const fn new(id: ProtocolId, offset: usize, length: usize) -> Self {
        Self {
            id,
            offset,
            length,
            sub_headers: None,
        }
    }

    /// Offset one past the last byte of this header.
    #[inline]
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }

    /// Header bytes within `buf`, or an empty slice if `buf` is not the
    /// buffer this record was decoded from.
    pub fn bytes<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        buf.get(self.range()).unwrap_or(&[])
    }

    #[inline]
    pub fn is_payload(&self) -> bool {
        self.id.is_payload()
    }

    pub fn has_sub_headers(&self) -> bool {
        self.sub_headers.is_some()
    }
}

/// Ordered headers of one packet.
///
/// Owned by the caller and reused across packets: `reset` clears the
/// records but keeps the allocations, including the sub-header maps.
#[derive(Debug, Clone)]
pub struct HeaderChain {
    records: Vec<HeaderRecord>,
    maps: Vec<SubHeaderMap>,
    maps_used: usize,
    max_headers: usize,
    truncation: Option<DissectError>,
}

impl HeaderChain {
    pub fn new(max_headers: usize) -> Self {
        Self {
            records: Vec::with_capacity(max_headers.min(DEFAULT_MAX_HEADERS)),
            maps: Vec::new(),
            maps_used: 0,
            max_headers,
            truncation: None,
        }
    }

    pub fn reset(&mut self) {
        self.records.clear();
        self.maps_used = 0;
        self.truncation = None;
    }

    pub fn max_headers(&self) -> usize {
        self.max_headers
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.max_headers
    }

    pub fn records(&self) -> &[HeaderRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HeaderRecord> {
        self.records.iter()
    }

    pub fn get(&self, index: usize) -> Option<&HeaderRecord> {
        self.records.get(index)
    }

    pub fn last(&self) -> Option<&HeaderRecord> {
        self.records.last()
    }

    pub fn contains(&self, id: ProtocolId) -> bool {
        self.records.iter().any(|r| r.id == id)
    }

    /// First record with the given id.
    pub fn find(&self, id: ProtocolId) -> Option<&HeaderRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn position(&self, id: ProtocolId) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }

    /// The record following the first occurrence of `id`.
    pub fn next_after(&self, id: ProtocolId) -> Option<&HeaderRecord> {
        self.position(id).and_then(|i| self.records.get(i + 1))
    }

    /// Trailing opaque payload record, if dissection produced one.
    pub fn payload(&self) -> Option<&HeaderRecord> {
        self.records.last().filter(|r| r.is_payload())
    }

    /// Sub-header map decoded for `record`.
    pub fn sub_headers(&self, record: &HeaderRecord) -> Option<&SubHeaderMap> {
        record
            .sub_headers
            .and_then(|index| self.maps[..self.maps_used].get(index as usize))
    }

    /// Why dissection stopped early, if it did.
    pub fn truncation(&self) -> Option<&DissectError> {
        self.truncation.as_ref()
    }

    pub(crate) fn push(&mut self, record: HeaderRecord) -> bool {
        if self.is_full() {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Attach an empty sub-header map to the last record.
    pub(crate) fn attach_sub_headers(&mut self) -> Option<&mut SubHeaderMap> {
        let record = self.records.last_mut()?;
        let index = u16::try_from(self.maps_used).ok()?;
        if self.maps_used == self.maps.len() {
            self.maps.push(SubHeaderMap::new());
        }
        record.sub_headers = Some(index);
        self.maps_used += 1;
        let map = &mut self.maps[index as usize];
        map.clear();
        Some(map)
    }

    pub(crate) fn set_truncation(&mut self, reason: DissectError) {
        self.truncation = Some(reason);
    }
}

impl Default for HeaderChain {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEADERS)
    }
}

impl PartialEq for HeaderChain {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
            && self.truncation == other.truncation
            && self.maps[..self.maps_used] == other.maps[..other.maps_used]
    }
}

impl Eq for HeaderChain {}

impl<'a> IntoIterator for &'a HeaderChain {
    type Item = &'a HeaderRecord;
    type IntoIter = std::slice::Iter<'a, HeaderRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
