//! Ethernet II.

use etherparse::Ethernet2HeaderSlice;

use super::{link, Binding, ProtocolDescriptor, ProtocolRegistry};

pub const NAME: &str = "ethernet";

/// Offset of the EtherType field.
pub const ETHERTYPE_OFFSET: usize = 12;

/// Well-known EtherType values (IEEE 802).
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const VLAN: u16 = 0x8100;
    pub const IPV6: u16 = 0x86DD;
    pub const QINQ: u16 = 0x88A8;
    pub const VLAN_DOUBLE: u16 = 0x9100;
}

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::dynamic(NAME, |buf, offset| {
        let eth = Ethernet2HeaderSlice::from_slice(buf.get(offset..)?).ok()?;
        Some(eth.slice().len())
    })
    .with_display_name("Ethernet")
}

pub(super) fn bind(registry: &mut ProtocolRegistry) {
    bind_ethertype(registry, NAME, ETHERTYPE_OFFSET);
}

/// Bindings shared by every header ending in an EtherType field.
pub(super) fn bind_ethertype(registry: &mut ProtocolRegistry, from: &str, offset: usize) {
    let targets = [
        (ethertype::IPV4, super::ipv4::NAME),
        (ethertype::IPV6, super::ipv6::NAME),
        (ethertype::ARP, super::arp::NAME),
        (ethertype::VLAN, super::vlan::NAME),
        (ethertype::QINQ, super::vlan::NAME),
        (ethertype::VLAN_DOUBLE, super::vlan::NAME),
    ];
    for (value, to) in targets {
        link(registry, from, to, |id| Binding::on_u16(id, offset, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::default_registry;
    use crate::Dissector;
    use std::sync::Arc;

    #[test]
    fn test_short_frame_is_malformed() {
        let desc = descriptor();
        assert_eq!(desc.resolve_length(&[0u8; 14], 0), Some(14));
        assert_eq!(desc.resolve_length(&[0u8; 13], 0), None);
    }

    #[test]
    fn test_arp_ethertype() {
        let registry = Arc::new(default_registry());
        let eth = registry.id_of(NAME).unwrap();
        let arp = registry.id_of(super::super::arp::NAME).unwrap();
        let dissector = Dissector::new(registry);
        let mut chain = dissector.new_chain();

        let mut frame = vec![0xffu8; 12];
        frame.extend_from_slice(&[0x08, 0x06]);
        // Ethernet/IPv4 request, addresses zeroed
        frame.extend_from_slice(&[0x00, 0x01, 0x08, 0x00, 0x06, 0x04, 0x00, 0x01]);
        frame.extend_from_slice(&[0u8; 20]);
        dissector.dissect(&frame, eth, &mut chain);
        assert_eq!(chain.get(1).map(|r| r.id), Some(arp));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_unknown_ethertype_is_payload() {
        let registry = Arc::new(default_registry());
        let eth = registry.id_of(NAME).unwrap();
        let dissector = Dissector::new(registry);
        let mut chain = dissector.new_chain();

        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&[0x88, 0xcc]); // LLDP
        frame.extend_from_slice(&[1, 2, 3]);
        dissector.dissect(&frame, eth, &mut chain);
        assert!(chain.payload().is_some());
        assert_eq!(chain.payload().map(|r| r.length), Some(3));
    }
}
