//! UDP.

use super::ProtocolDescriptor;
use crate::flow::KeyField;

pub const NAME: &str = "udp";

pub const HEADER_LEN: usize = 8;

pub fn descriptor() -> ProtocolDescriptor {
    ProtocolDescriptor::fixed(NAME, HEADER_LEN)
        .with_display_name("UDP")
        .key_field(KeyField::source(0, 0, 2))
        .key_field(KeyField::destination(0, 2, 2))
}
