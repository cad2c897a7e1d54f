//! Flow keys.
//!
//! A flow key groups packets of one conversation. It is composed from the
//! key fields each descriptor declares: single values (e.g. the IP protocol
//! number) and source/destination pairs (addresses, ports). Reversible
//! pairs make the key direction-aware: the two directions of a conversation
//! are distinct keys that [`FlowKey::match_with`] reports as `Reverse`, and
//! both hash to the same value.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::dissect::{HeaderChain, HeaderRecord};
use crate::protocol::{ProtocolId, ProtocolRegistry};

/// Bytes of one key value. Fits an IPv6 address inline.
pub type KeyBytes = SmallVec<[u8; 16]>;

/// Role of a key field within its pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Single,
    Source,
    Destination,
}

/// A byte range of a header that contributes to the flow key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyField {
    /// Offset within the header.
    pub offset: usize,
    pub length: usize,
    /// Pair index; fields are composed in ascending pair order.
    pub pair: u8,
    pub role: KeyRole,
    /// Whether a source/destination pair may match swapped.
    pub reversible: bool,
}

impl KeyField {
    pub const fn single(pair: u8, offset: usize, length: usize) -> Self {
        Self {
            offset,
            length,
            pair,
            role: KeyRole::Single,
            reversible: false,
        }
    }

    pub const fn source(pair: u8, offset: usize, length: usize) -> Self {
        Self {
            offset,
            length,
            pair,
            role: KeyRole::Source,
            reversible: true,
        }
    }

    pub const fn destination(pair: u8, offset: usize, length: usize) -> Self {
        Self {
            offset,
            length,
            pair,
            role: KeyRole::Destination,
            reversible: true,
        }
    }

    /// Make a source/destination field direction-sensitive.
    pub const fn one_way(mut self) -> Self {
        self.reversible = false;
        self
    }
}

/// One composed key value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValue {
    Single(KeyBytes),
    Pair {
        src: KeyBytes,
        dst: KeyBytes,
        reversible: bool,
    },
}

impl KeyValue {
    fn reversed(&self) -> KeyValue {
        match self {
            KeyValue::Pair {
                src,
                dst,
                reversible: true,
            } => KeyValue::Pair {
                src: dst.clone(),
                dst: src.clone(),
                reversible: true,
            },
            other => other.clone(),
        }
    }
}

/// Outcome of comparing two flow keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMatch {
    NoMatch,
    Forward,
    Reverse,
}

/// Direction-aware grouping key.
///
/// `Eq` is exact (forward) equality; `Hash` is symmetric over reversible
/// pairs, so a map keyed by `FlowKey` puts both directions in the same
/// bucket while still telling them apart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowKey {
    protocols: SmallVec<[ProtocolId; 4]>,
    values: SmallVec<[KeyValue; 4]>,
}

impl FlowKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_protocol(mut self, id: ProtocolId) -> Self {
        self.protocols.push(id);
        self
    }

    pub fn with_single(mut self, value: &[u8]) -> Self {
        self.values.push(KeyValue::Single(KeyBytes::from_slice(value)));
        self
    }

    pub fn with_pair(mut self, src: &[u8], dst: &[u8], reversible: bool) -> Self {
        self.values.push(KeyValue::Pair {
            src: KeyBytes::from_slice(src),
            dst: KeyBytes::from_slice(dst),
            reversible,
        });
        self
    }

    pub fn protocols(&self) -> &[ProtocolId] {
        &self.protocols
    }

    pub fn values(&self) -> &[KeyValue] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty() && self.values.is_empty()
    }

    /// True if the key has at least one pair and every pair is reversible.
    pub fn is_reversible(&self) -> bool {
        let mut pairs = self
            .values
            .iter()
            .filter_map(|v| match v {
                KeyValue::Pair { reversible, .. } => Some(*reversible),
                KeyValue::Single(_) => None,
            })
            .peekable();
        pairs.peek().is_some() && pairs.all(|r| r)
    }

    /// The same key seen from the other endpoint.
    pub fn reversed(&self) -> FlowKey {
        FlowKey {
            protocols: self.protocols.clone(),
            values: self.values.iter().map(KeyValue::reversed).collect(),
        }
    }

    pub fn equal_forward(&self, other: &FlowKey) -> bool {
        self == other
    }

    /// Equal once reversible pairs are swapped. Keys without a reversible
    /// pair never match in reverse.
    pub fn equal_reverse(&self, other: &FlowKey) -> bool {
        self.is_reversible()
            && self.protocols == other.protocols
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| a.reversed() == *b)
    }

    /// Forward wins when both orientations match (symmetric endpoints).
    pub fn match_with(&self, other: &FlowKey) -> KeyMatch {
        if self.equal_forward(other) {
            KeyMatch::Forward
        } else if self.equal_reverse(other) {
            KeyMatch::Reverse
        } else {
            KeyMatch::NoMatch
        }
    }
}

/// Compare two flow keys; see [`FlowKey::match_with`].
pub fn match_keys(a: &FlowKey, b: &FlowKey) -> KeyMatch {
    a.match_with(b)
}

impl Hash for FlowKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.protocols.hash(state);
        state.write_usize(self.values.len());
        for value in &self.values {
            match value {
                KeyValue::Single(bytes) => {
                    state.write_u8(0);
                    bytes.hash(state);
                }
                KeyValue::Pair {
                    src,
                    dst,
                    reversible: true,
                } => {
                    state.write_u8(1);
                    let (lo, hi) = if src <= dst { (src, dst) } else { (dst, src) };
                    lo.hash(state);
                    hi.hash(state);
                }
                KeyValue::Pair { src, dst, .. } => {
                    state.write_u8(2);
                    src.hash(state);
                    dst.hash(state);
                }
            }
        }
    }
}

/// Builds flow keys from dissected header chains.
#[derive(Debug, Clone)]
pub struct FlowKeyExtractor {
    registry: Arc<ProtocolRegistry>,
}

impl FlowKeyExtractor {
    pub fn new(registry: Arc<ProtocolRegistry>) -> Self {
        Self { registry }
    }

    /// Key over every header in `chain`.
    pub fn extract(&self, buf: &[u8], chain: &HeaderChain) -> FlowKey {
        self.extract_records(buf, chain.records())
    }

    /// Key over a subset of a chain's records (e.g. up to the transport).
    pub fn extract_records(&self, buf: &[u8], records: &[HeaderRecord]) -> FlowKey {
        let mut key = FlowKey::new();
        self.extract_into(&mut key, buf, records);
        key
    }

    /// Append the key fields of `records` to `key`.
    ///
    /// Headers without key fields contribute nothing, not even their id.
    /// Fields reaching past their header read as empty.
    pub fn extract_into(&self, key: &mut FlowKey, buf: &[u8], records: &[HeaderRecord]) {
        for record in records {
            let Ok(descriptor) = self.registry.lookup(record.id) else {
                continue;
            };
            let fields = descriptor.key_fields();
            if fields.is_empty() {
                continue;
            }
            key.protocols.push(record.id);

            let header = record.bytes(buf);
            let read = |field: &KeyField| -> KeyBytes {
                header
                    .get(field.offset..field.offset + field.length)
                    .map(KeyBytes::from_slice)
                    .unwrap_or_default()
            };

            // Fields are sorted by pair index; a pair is a run sharing it.
            let mut i = 0;
            while i < fields.len() {
                let pair = fields[i].pair;
                let end = fields[i..]
                    .iter()
                    .position(|f| f.pair != pair)
                    .map_or(fields.len(), |n| i + n);
                let group = &fields[i..end];

                let src = group.iter().find(|f| f.role == KeyRole::Source);
                let dst = group.iter().find(|f| f.role == KeyRole::Destination);
                match (src, dst) {
                    (Some(s), Some(d)) => key.values.push(KeyValue::Pair {
                        src: read(s),
                        dst: read(d),
                        reversible: s.reversible && d.reversible,
                    }),
                    _ => {
                        for field in group {
                            key.values.push(KeyValue::Single(read(field)));
                        }
                    }
                }
                i = end;
            }
        }
    }
}
