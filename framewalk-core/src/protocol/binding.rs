//! Next-protocol bindings.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use super::ProtocolId;
use crate::dissect::HeaderChain;

/// Binding predicate: `(buffer, next_offset, chain_so_far) -> matches`.
///
/// `next_offset` is the first byte after the current header; the current
/// header itself is `chain.last()`.
pub type Predicate = Arc<dyn Fn(&[u8], usize, &HeaderChain) -> bool + Send + Sync>;

/// A rule that `target` may follow the protocol owning this binding.
#[derive(Clone)]
pub struct Binding {
    target: ProtocolId,
    predicate: Predicate,
    requires: SmallVec<[ProtocolId; 2]>,
}

impl Binding {
    pub fn new<F>(target: ProtocolId, predicate: F) -> Self
    where
        F: Fn(&[u8], usize, &HeaderChain) -> bool + Send + Sync + 'static,
    {
        Self {
            target,
            predicate: Arc::new(predicate),
            requires: SmallVec::new(),
        }
    }

    /// Unconditional binding (still subject to prerequisites).
    pub fn always(target: ProtocolId) -> Self {
        Self::new(target, |_, _, _| true)
    }

    /// Match when the byte at `field_offset` within the current header
    /// equals `value`.
    pub fn on_u8(target: ProtocolId, field_offset: usize, value: u8) -> Self {
        Self::new(target, move |buf, _, chain| {
            current_field(buf, chain, field_offset, 1) == Some(&[value][..])
        })
    }

    /// Match when the big-endian u16 at `field_offset` within the current
    /// header equals `value`.
    pub fn on_u16(target: ProtocolId, field_offset: usize, value: u16) -> Self {
        Self::new(target, move |buf, _, chain| {
            read_u16(buf, chain, field_offset) == Some(value)
        })
    }

    /// Match when any of the big-endian u16 fields at `field_offsets`
    /// equals `value` (e.g. either port of a transport header).
    pub fn on_any_u16(target: ProtocolId, field_offsets: &[usize], value: u16) -> Self {
        let offsets: SmallVec<[usize; 2]> = field_offsets.iter().copied().collect();
        Self::new(target, move |buf, _, chain| {
            offsets
                .iter()
                .any(|&off| read_u16(buf, chain, off) == Some(value))
        })
    }

    /// Require `ids` to appear earlier in the chain.
    pub fn requires(mut self, ids: &[ProtocolId]) -> Self {
        self.requires.extend_from_slice(ids);
        self
    }

    pub fn target(&self) -> ProtocolId {
        self.target
    }

    pub fn prerequisites(&self) -> &[ProtocolId] {
        &self.requires
    }

    /// Prerequisites first, then the predicate.
    pub fn matches(&self, buf: &[u8], next_offset: usize, chain: &HeaderChain) -> bool {
        self.requires.iter().all(|&id| chain.contains(id)) && (self.predicate)(buf, next_offset, chain)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("target", &self.target)
            .field("requires", &self.requires)
            .finish_non_exhaustive()
    }
}

/// Bytes `[field_offset, field_offset + width)` of the current header.
fn current_field<'a>(
    buf: &'a [u8],
    chain: &HeaderChain,
    field_offset: usize,
    width: usize,
) -> Option<&'a [u8]> {
    let record = chain.last()?;
    if field_offset + width > record.length {
        return None;
    }
    let start = record.offset + field_offset;
    buf.get(start..start + width)
}

fn read_u16(buf: &[u8], chain: &HeaderChain, field_offset: usize) -> Option<u16> {
    current_field(buf, chain, field_offset, 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}
