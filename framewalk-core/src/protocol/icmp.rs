//! ICMP and ICMPv6.
//!
//! Only the common 8-byte header (type, code, checksum, rest-of-header) is
//! a header record; message bodies are payload.

use super::ProtocolDescriptor;

pub const NAME: &str = "icmp";
pub const V6_NAME: &str = "icmpv6";

pub const HEADER_LEN: usize = 8;

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::fixed(NAME, HEADER_LEN).with_display_name("ICMP")
}

pub fn v6_descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::fixed(V6_NAME, HEADER_LEN).with_display_name("ICMPv6")
}
