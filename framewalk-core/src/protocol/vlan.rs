//! IEEE 802.1Q / 802.1ad VLAN tags.
//!
//! The tag carries its own inner EtherType, so tags stack naturally
//! (QinQ) through the same bindings Ethernet uses.

use super::{ethernet, ProtocolDescriptor, ProtocolRegistry};

pub const NAME: &str = "vlan";

/// TCI (2 bytes) followed by the inner EtherType (2 bytes).
pub const HEADER_LEN: usize = 4;

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::fixed(NAME, HEADER_LEN).with_display_name("802.1Q VLAN")
}

pub(super) fn bind(registry: &mut ProtocolRegistry) {
    ethernet::bind_ethertype(registry, NAME, 2);
}

/// VLAN id from the TCI of a tag.
pub fn vlan_id(tag: &[u8]) -> Option<u16> {
    let tci = u16::from_be_bytes([*tag.first()?, *tag.get(1)?]);
    Some(tci & 0x0fff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::default_registry;
    use crate::Dissector;
    use std::sync::Arc;

    #[test]
    fn test_stacked_tags() {
        let registry = Arc::new(default_registry());
        let eth = registry.id_of(ethernet::NAME).unwrap();
        let vlan = registry.id_of(NAME).unwrap();
        let dissector = Dissector::new(registry);
        let mut chain = dissector.new_chain();

        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&[0x88, 0xa8]); // outer S-tag
        frame.extend_from_slice(&[0x00, 0x64, 0x81, 0x00]); // VID 100, inner C-tag
        frame.extend_from_slice(&[0x00, 0xc8, 0x88, 0xcc]); // VID 200, LLDP
        frame.extend_from_slice(&[0u8; 4]);
        dissector.dissect(&frame, eth, &mut chain);

        let ids: Vec<_> = chain.iter().map(|r| r.id).collect();
        assert_eq!(ids[..3], [eth, vlan, vlan]);
        let inner = chain.get(2).unwrap();
        assert_eq!(vlan_id(inner.bytes(&frame)), Some(200));
    }
}
