//! IPv6.
//!
//! Extension headers are folded into the IPv6 record: its length covers the
//! fixed header plus every extension header, each recorded in the
//! sub-header map. Bindings look at the final next-header value.

use etherparse::Ipv6HeaderSlice;

use super::{ip_protocol, link, Binding, ProtocolDescriptor, ProtocolRegistry};
use crate::dissect::SubHeaderMap;
use crate::flow::KeyField;

pub const NAME: &str = "ipv6";

/// Fixed header length.
pub const HEADER_LEN: usize = 40;

/// Extension header next-header values.
pub mod next_header {
    pub const HOP_BY_HOP: u8 = 0;
    pub const ROUTING: u8 = 43;
    pub const FRAGMENT: u8 = 44;
    pub const AUTH: u8 = 51;
    pub const DESTINATION: u8 = 60;
}

/// Sub-header ids for extension headers.
pub mod extension {
    pub const HOP_BY_HOP: usize = 0;
    pub const ROUTING: usize = 1;
    pub const FRAGMENT: usize = 2;
    pub const DESTINATION: usize = 3;
    pub const AUTH: usize = 4;
}

/// Upper bound on extension headers walked per packet.
const MAX_EXTENSIONS: usize = 8;

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::dynamic(NAME, |buf, offset| {
        let header = buf.get(offset..)?;
        Ipv6HeaderSlice::from_slice(header).ok()?;
        Some(walk(header).header_len)
    })
    .with_display_name("IPv6")
    .key_field(KeyField::source(0, 8, 16))
    .key_field(KeyField::destination(0, 24, 16))
    .sub_header_decoder(decode_extensions)
}

pub(super) fn bind(registry: &mut ProtocolRegistry) {
    let targets = [
        (ip_protocol::TCP, super::tcp::NAME),
        (ip_protocol::UDP, super::udp::NAME),
        (ip_protocol::ICMPV6, super::icmp::V6_NAME),
        (ip_protocol::IPIP, super::ipv4::NAME),
        (ip_protocol::IPV6, NAME),
    ];
    for (value, to) in targets {
        link(registry, NAME, to, |id| {
            Binding::new(id, move |buf, _, chain| {
                let Some(header) = chain.last().map(|r| r.bytes(buf)) else {
                    return false;
                };
                let walked = walk(header);
                !walked.later_fragment && walked.next_header == Some(value)
            })
        });
    }
}

#[derive(Debug, Clone, Copy)]
struct Walk {
    header_len: usize,
    /// None when the chain of extension headers was cut short.
    next_header: Option<u8>,
    later_fragment: bool,
}

/// Follow the extension-header chain starting after the fixed header.
fn walk(header: &[u8]) -> Walk {
    let mut result = Walk {
        header_len: HEADER_LEN,
        next_header: header.get(6).copied(),
        later_fragment: false,
    };
    for _ in 0..MAX_EXTENSIONS {
        let Some(nh) = result.next_header else { break };
        let Some(len) = extension_len(nh, header.get(result.header_len..).unwrap_or(&[])) else {
            break;
        };
        if result.header_len + len > header.len() {
            result.next_header = None;
            break;
        }
        let ext = &header[result.header_len..result.header_len + len];
        if nh == next_header::FRAGMENT {
            result.later_fragment = u16::from_be_bytes([ext[2], ext[3]]) >> 3 != 0;
        }
        result.next_header = Some(ext[0]);
        result.header_len += len;
    }
    result
}

/// Length of the extension header `nh` at the start of `data`, or `None`
/// if `nh` is not an extension header (or its length is unreadable).
fn extension_len(nh: u8, data: &[u8]) -> Option<usize> {
    match nh {
        next_header::HOP_BY_HOP | next_header::ROUTING | next_header::DESTINATION => {
            Some((*data.get(1)? as usize + 1) * 8)
        }
        next_header::FRAGMENT => Some(8),
        next_header::AUTH => Some((*data.get(1)? as usize + 2) * 4),
        _ => None,
    }
}

fn extension_id(nh: u8) -> Option<usize> {
    match nh {
        next_header::HOP_BY_HOP => Some(extension::HOP_BY_HOP),
        next_header::ROUTING => Some(extension::ROUTING),
        next_header::FRAGMENT => Some(extension::FRAGMENT),
        next_header::DESTINATION => Some(extension::DESTINATION),
        next_header::AUTH => Some(extension::AUTH),
        _ => None,
    }
}

fn decode_extensions(header: &[u8], map: &mut SubHeaderMap) {
    let mut offset = HEADER_LEN;
    let mut nh = header.get(6).copied();
    while let Some(current) = nh {
        let (Some(id), Some(len)) = (
            extension_id(current),
            extension_len(current, header.get(offset..).unwrap_or(&[])),
        ) else {
            break;
        };
        if offset + len > header.len() {
            break;
        }
        let _ = map.insert(id, offset, len);
        nh = Some(header[offset]);
        offset += len;
    }
}
