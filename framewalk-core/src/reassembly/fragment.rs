//! One packet's contribution to a sequence.

use bytes::Bytes;

use crate::protocol::ProtocolId;

/// A byte range of a logical unit carried by one captured packet.
///
/// The payload is a shared view; admitting a fragment never copies packet
/// bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub payload: Bytes,
    /// Offset of the first payload byte within the logical unit.
    pub seq_offset: u64,
    pub frame_number: u64,
    pub timestamp_us: i64,
    /// Marks the fragment that ends the unit (e.g. IPv4 MF=0).
    pub last: bool,
    /// Protocol that follows the sequenced header, known from the fragment
    /// that carries the start of the unit.
    pub entry: Option<ProtocolId>,
}

impl Fragment {
    pub fn new(seq_offset: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            seq_offset,
            frame_number: 0,
            timestamp_us: 0,
            last: false,
            entry: None,
        }
    }

    pub fn with_frame(mut self, frame_number: u64, timestamp_us: i64) -> Self {
        self.frame_number = frame_number;
        self.timestamp_us = timestamp_us;
        self
    }

    pub fn with_last(mut self, last: bool) -> Self {
        self.last = last;
        self
    }

    pub fn with_entry(mut self, entry: ProtocolId) -> Self {
        self.entry = Some(entry);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Offset one past the last payload byte.
    #[inline]
    pub fn end(&self) -> u64 {
        self.seq_offset + self.payload.len() as u64
    }

    pub fn overlaps(&self, other: &Fragment) -> bool {
        self.seq_offset < other.end() && other.seq_offset < self.end()
    }

    /// The part of this fragment at or after `offset`, as a view.
    pub(crate) fn tail_from(&self, offset: u64) -> Option<Fragment> {
        if offset >= self.end() {
            return None;
        }
        let skip = offset.saturating_sub(self.seq_offset) as usize;
        Some(Fragment {
            payload: self.payload.slice(skip..),
            seq_offset: self.seq_offset.max(offset),
            ..self.clone()
        })
    }
}
