//! Linux cooked capture (SLL).
//!
//! Used by captures on the "any" interface (LINKTYPE_LINUX_SLL = 113).

use super::{ethernet, ProtocolDescriptor, ProtocolRegistry};

pub const NAME: &str = "linux_sll";

/// Linux SLL header length in bytes.
pub const HEADER_LEN: usize = 16;

/// Offset of the protocol (EtherType) field.
pub const PROTOCOL_OFFSET: usize = 14;

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::fixed(NAME, HEADER_LEN).with_display_name("Linux SLL")
}

pub(super) fn bind(registry: &mut ProtocolRegistry) {
    ethernet::bind_ethertype(registry, NAME, PROTOCOL_OFFSET);
}
