//! IPv4.

use etherparse::Ipv4HeaderSlice;

use super::{ip_protocol, link, Binding, ProtocolDescriptor, ProtocolRegistry};
use crate::dissect::SubHeaderMap;
use crate::flow::KeyField;

pub const NAME: &str = "ipv4";

/// Header length without options.
pub const MIN_HEADER_LEN: usize = 20;

const PROTOCOL_OFFSET: usize = 9;
const FLAGS_OFFSET: usize = 6;

/// IPv4 option numbers (low five bits of the option type), used as
/// sub-header ids.
pub mod option {
    pub const END: u8 = 0;
    pub const NOP: u8 = 1;
    pub const SECURITY: u8 = 2;
    pub const LOOSE_SOURCE_ROUTE: u8 = 3;
    pub const TIMESTAMP: u8 = 4;
    pub const RECORD_ROUTE: u8 = 7;
    pub const STRICT_SOURCE_ROUTE: u8 = 9;
    pub const ROUTER_ALERT: u8 = 20;
}

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::dynamic(NAME, |buf, offset| {
        let ipv4 = Ipv4HeaderSlice::from_slice(buf.get(offset..)?).ok()?;
        Some(ipv4.slice().len())
    })
    .with_display_name("IPv4")
    .key_field(KeyField::source(0, 12, 4))
    .key_field(KeyField::destination(0, 16, 4))
    .key_field(KeyField::single(1, PROTOCOL_OFFSET, 1))
    .sub_header_decoder(decode_options)
}

/// Transport bindings apply to unfragmented datagrams and first fragments;
/// later fragments carry no transport header.
pub(super) fn bind(registry: &mut ProtocolRegistry) {
    let targets = [
        (ip_protocol::TCP, super::tcp::NAME),
        (ip_protocol::UDP, super::udp::NAME),
        (ip_protocol::ICMP, super::icmp::NAME),
        (ip_protocol::IPIP, NAME),
        (ip_protocol::IPV6, super::ipv6::NAME),
    ];
    for (value, to) in targets {
        link(registry, NAME, to, |id| {
            Binding::new(id, move |buf, _, chain| {
                let Some(header) = chain.last().map(|r| r.bytes(buf)) else {
                    return false;
                };
                header.len() >= MIN_HEADER_LEN
                    && header[PROTOCOL_OFFSET] == value
                    && fragment_offset_units(header) == 0
            })
        });
    }
}

fn fragment_offset_units(header: &[u8]) -> u16 {
    u16::from_be_bytes([header[FLAGS_OFFSET], header[FLAGS_OFFSET + 1]]) & 0x1fff
}

/// Record each option by number. Options past the header, or with a bogus
/// length, end the walk.
fn decode_options(header: &[u8], map: &mut SubHeaderMap) {
    let mut i = MIN_HEADER_LEN;
    while i < header.len() {
        let number = header[i] & 0x1f;
        let len = match number {
            option::END => break,
            option::NOP => 1,
            _ => match header.get(i + 1) {
                Some(&n) if n >= 2 && i + n as usize <= header.len() => n as usize,
                _ => break,
            },
        };
        let _ = map.insert(number as usize, i, len);
        i += len;
    }
}

/// Fields the reassembly pipeline needs from an IPv4 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Info {
    pub header_len: usize,
    pub total_len: usize,
    pub identification: u16,
    pub more_fragments: bool,
    /// Fragment offset in bytes.
    pub fragment_offset: u64,
    pub protocol: u8,
}

impl Ipv4Info {
    pub fn parse(header: &[u8]) -> Option<Self> {
        let ipv4 = Ipv4HeaderSlice::from_slice(header).ok()?;
        Some(Self {
            header_len: ipv4.slice().len(),
            total_len: ipv4.total_len() as usize,
            identification: ipv4.identification(),
            more_fragments: ipv4.more_fragments(),
            fragment_offset: ipv4.fragments_offset().value() as u64 * 8,
            protocol: ipv4.protocol().0,
        })
    }

    pub fn is_fragment(&self) -> bool {
        self.more_fragments || self.fragment_offset > 0
    }

    pub fn payload_len(&self) -> usize {
        self.total_len.saturating_sub(self.header_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::test_utils::{Ipv4Builder, TcpBuilder};
    use crate::protocol::{default_registry, tcp};
    use crate::Dissector;
    use std::sync::Arc;

    #[test]
    fn test_info() {
        let packet = Ipv4Builder::new()
            .identification(0x1234)
            .fragment(1480, true)
            .udp()
            .payload(vec![0u8; 8])
            .build();
        let info = Ipv4Info::parse(&packet).unwrap();
        assert_eq!(info.header_len, 20);
        assert_eq!(info.total_len, 28);
        assert_eq!(info.identification, 0x1234);
        assert!(info.more_fragments);
        assert_eq!(info.fragment_offset, 1480);
        assert_eq!(info.protocol, ip_protocol::UDP);
        assert!(info.is_fragment());
        assert_eq!(info.payload_len(), 8);
    }

    #[test]
    fn test_bad_ihl_is_malformed() {
        let mut packet = Ipv4Builder::new().build();
        packet[0] = 0x43; // IHL 3
        assert_eq!(descriptor().resolve_length(&packet, 0), None);
    }

    #[test]
    fn test_options_as_sub_headers() {
        // NOP, NOP, Router Alert (4 bytes) -> 8 bytes of options with EOL padding
        let packet = Ipv4Builder::new()
            .options(vec![0x01, 0x01, 0x94, 0x04, 0x00, 0x00, 0x00, 0x00])
            .build();
        let registry = Arc::new(default_registry());
        let ip = registry.id_of(NAME).unwrap();
        let dissector = Dissector::new(registry);
        let mut chain = dissector.new_chain();

        dissector.dissect(&packet, ip, &mut chain);
        let record = chain.records()[0];
        assert_eq!(record.length, 28);
        let options = chain.sub_headers(&record).unwrap();
        assert_eq!(options.get(option::NOP as usize), Some((20, 1)));
        assert_eq!(options.get(option::ROUTER_ALERT as usize), Some((22, 4)));
        assert_eq!(options.len(), 2);
    }

    #[test]
    fn test_later_fragment_has_no_transport() {
        let registry = Arc::new(default_registry());
        let ip = registry.id_of(NAME).unwrap();
        let tcp_id = registry.id_of(tcp::NAME).unwrap();
        let dissector = Dissector::new(registry);
        let mut chain = dissector.new_chain();

        let segment = TcpBuilder::new().psh_ack().payload(vec![0x41; 12]).build();
        let first = Ipv4Builder::new().tcp().fragment(0, true).payload(segment.clone()).build();
        dissector.dissect(&first, ip, &mut chain);
        assert_eq!(chain.get(1).map(|r| r.id), Some(tcp_id));

        let later = Ipv4Builder::new().tcp().fragment(16, false).payload(segment).build();
        dissector.dissect(&later, ip, &mut chain);
        assert!(!chain.contains(tcp_id));
        assert_eq!(chain.payload().map(|r| r.offset), Some(20));
    }
}
