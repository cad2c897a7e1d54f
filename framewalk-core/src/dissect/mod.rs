//! Header dissection.
//!
//! The [`Dissector`] walks a buffer from a root protocol id, asking the
//! registry for each header's length and for the bindings that pick the
//! next header. Results go into a caller-owned [`HeaderChain`] so a capture
//! loop can reuse one chain for every packet.
//!
//! Dissection never fails. An unknown id or a malformed length stops the
//! walk; the remaining bytes become one opaque payload record and the cause
//! is kept as the chain's truncation reason.

mod chain;
mod subheader;

pub use chain::{HeaderChain, HeaderRecord, DEFAULT_MAX_HEADERS};
pub use subheader::{SubHeaderMap, MAX_SUB_HEADERS};

use std::sync::Arc;

use tracing::trace;

use crate::error::DissectError;
use crate::protocol::{ProtocolId, ProtocolRegistry};

/// Configuration for a [`Dissector`].
#[derive(Debug, Clone)]
pub struct DissectConfig {
    /// Maximum number of records in one chain, payload record included.
    pub max_headers: usize,
}

impl Default for DissectConfig {
    fn default() -> Self {
        Self {
            max_headers: DEFAULT_MAX_HEADERS,
        }
    }
}

/// Stateless header-chain builder.
///
/// Reentrant: any number of threads may dissect with the same instance as
/// long as each uses its own chain.
#[derive(Debug, Clone)]
pub struct Dissector {
    registry: Arc<ProtocolRegistry>,
    config: DissectConfig,
}

impl Dissector {
    pub fn new(registry: Arc<ProtocolRegistry>) -> Self {
        Self::with_config(registry, DissectConfig::default())
    }

    pub fn with_config(registry: Arc<ProtocolRegistry>, config: DissectConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<ProtocolRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &DissectConfig {
        &self.config
    }

    /// An empty chain sized for this dissector.
    pub fn new_chain(&self) -> HeaderChain {
        HeaderChain::new(self.config.max_headers)
    }

    /// Dissect `buf` starting with protocol `root`.
    ///
    /// `chain` is reset first. Returns the number of records produced.
    pub fn dissect(&self, buf: &[u8], root: ProtocolId, chain: &mut HeaderChain) -> usize {
        chain.reset();
        let mut id = root;
        let mut offset = 0;

        while offset < buf.len() && !chain.is_full() {
            if id.is_payload() {
                chain.push(HeaderRecord::new(ProtocolId::PAYLOAD, offset, buf.len() - offset));
                break;
            }

            let descriptor = match self.registry.lookup(id) {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    truncate(chain, buf, offset, err);
                    break;
                }
            };

            let remaining = buf.len() - offset;
            let length = match descriptor.resolve_length(buf, offset) {
                Some(n) if n > 0 && n <= remaining => n,
                other => {
                    let err = DissectError::MalformedHeader {
                        protocol: descriptor.name(),
                        offset,
                        length: other,
                        remaining,
                    };
                    truncate(chain, buf, offset, err);
                    break;
                }
            };

            chain.push(HeaderRecord::new(id, offset, length));
            if let Some(decode) = descriptor.sub_headers() {
                if let Some(map) = chain.attach_sub_headers() {
                    decode(&buf[offset..offset + length], map);
                }
            }

            let next_offset = offset + length;
            id = descriptor
                .active_bindings()
                .iter()
                .find(|b| b.matches(buf, next_offset, chain))
                .map_or(ProtocolId::PAYLOAD, |b| b.target());
            trace!(from = descriptor.name(), next = %id, offset = next_offset, "resolved next header");
            offset = next_offset;
        }

        chain.len()
    }
}

/// Stop the walk at `offset`: keep `reason` and record what is left as payload.
fn truncate(chain: &mut HeaderChain, buf: &[u8], offset: usize, reason: DissectError) {
    trace!(%reason, offset, "header chain truncated");
    chain.push(HeaderRecord::new(ProtocolId::PAYLOAD, offset, buf.len() - offset));
    chain.set_truncation(reason);
}
