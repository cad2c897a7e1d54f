//! Protocol registry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use super::{Binding, ProtocolDescriptor, ProtocolId};
use crate::error::DissectError;

/// Name of the descriptor pre-registered under [`ProtocolId::PAYLOAD`].
pub const PAYLOAD_NAME: &str = "payload";

/// Table of protocol descriptors addressed by dense ids.
///
/// Append-only: descriptors are never removed. Build it once, then share it
/// behind an `Arc` with the dissector, flow key extractor, and analyzer.
#[derive(Debug, Clone)]
pub struct ProtocolRegistry {
    descriptors: Vec<ProtocolDescriptor>,
    by_name: HashMap<&'static str, ProtocolId>,
}

impl ProtocolRegistry {
    /// Create a registry holding only the opaque payload descriptor.
    pub fn new() -> Self {
        let payload = ProtocolDescriptor::dynamic(PAYLOAD_NAME, |buf, offset| {
            buf.len().checked_sub(offset)
        })
        .with_display_name("Payload");

        let mut by_name = HashMap::new();
        by_name.insert(PAYLOAD_NAME, ProtocolId::PAYLOAD);
        Self {
            descriptors: vec![payload],
            by_name,
        }
    }

    /// Register a descriptor and return its id.
    ///
    /// Fails with [`DissectError::RegistryFull`] once all 65536 ids are
    /// taken. If a descriptor with the same name is already present its id is
    /// returned and `descriptor` is discarded, so lazy registration on
    /// first use is idempotent.
    pub fn register(&mut self, descriptor: ProtocolDescriptor) -> Result<ProtocolId, DissectError> {
        if let Some(&id) = self.by_name.get(descriptor.name()) {
            trace!(name = descriptor.name(), %id, "protocol already registered");
            return Ok(id);
        }
        let index = u16::try_from(self.descriptors.len()).map_err(|_| DissectError::RegistryFull {
            name: descriptor.name(),
            registered: self.descriptors.len(),
        })?;
        let id = ProtocolId::new(index);
        self.by_name.insert(descriptor.name(), id);
        self.descriptors.push(descriptor);
        Ok(id)
    }

    /// Append a native binding to `from`.
    ///
    /// Every id the binding mentions must already be registered.
    pub fn bind(&mut self, from: ProtocolId, binding: Binding) -> Result<(), DissectError> {
        self.check_binding(&binding)?;
        self.lookup_mut(from)?.push_binding(binding);
        Ok(())
    }

    /// Append an override binding to `from`.
    ///
    /// From then on only override bindings are consulted for `from`.
    pub fn bind_override(&mut self, from: ProtocolId, binding: Binding) -> Result<(), DissectError> {
        self.check_binding(&binding)?;
        self.lookup_mut(from)?.push_override_binding(binding);
        Ok(())
    }

    /// Replace the length rule of `id`.
    pub fn override_length<F>(&mut self, id: ProtocolId, length: F) -> Result<(), DissectError>
    where
        F: Fn(&[u8], usize) -> Option<usize> + Send + Sync + 'static,
    {
        self.lookup_mut(id)?.set_length_override(Arc::new(length));
        Ok(())
    }

    pub fn lookup(&self, id: ProtocolId) -> Result<&ProtocolDescriptor, DissectError> {
        self.descriptors
            .get(id.as_index())
            .ok_or(DissectError::UnknownProtocol(id))
    }

    /// Bindings the dissector tries after a header of type `id`.
    pub fn bindings_for(&self, id: ProtocolId) -> Result<&[Binding], DissectError> {
        self.lookup(id).map(|d| d.active_bindings())
    }

    pub fn id_of(&self, name: &str) -> Option<ProtocolId> {
        self.by_name.get(name).copied()
    }

    /// Name of `id`, or `"unknown"`.
    pub fn name_of(&self, id: ProtocolId) -> &'static str {
        self.lookup(id).map(|d| d.name()).unwrap_or("unknown")
    }

    /// Number of registered descriptors, including the payload sentinel.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProtocolId, &ProtocolDescriptor)> + '_ {
        self.descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (ProtocolId::new(i as u16), d))
    }

    fn lookup_mut(&mut self, id: ProtocolId) -> Result<&mut ProtocolDescriptor, DissectError> {
        self.descriptors
            .get_mut(id.as_index())
            .ok_or(DissectError::UnknownProtocol(id))
    }

    fn check_binding(&self, binding: &Binding) -> Result<(), DissectError> {
        self.lookup(binding.target())?;
        for &id in binding.prerequisites() {
            self.lookup(id)?;
        }
        Ok(())
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
